//! Voter roll reconstruction from vote/unvote history.

use crate::EngineError;
use std::collections::{BTreeMap, BTreeSet};
use tbw_store::VoterStore;
use tbw_types::{Address, NetworkId, PublicKey, Timestamp, UnvoteEvent, VoteEvent};

/// One active voter: the derived address payouts go to and the public key
/// the vote history identifies them by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollEntry {
    pub address: Address,
    pub public_key: PublicKey,
}

/// Builds the set of addresses counted as actively voting for the delegate.
pub struct VoterRollBuilder<'a, S: VoterStore> {
    store: &'a S,
    network: NetworkId,
    default_share_rate: u8,
}

impl<'a, S: VoterStore> VoterRollBuilder<'a, S> {
    pub fn new(store: &'a S, network: NetworkId, default_share_rate: u8) -> Self {
        Self {
            store,
            network,
            default_share_rate,
        }
    }

    /// Build the roll of voters active as of a block's timestamp.
    ///
    /// Events after `as_of` have not happened yet from that block's point
    /// of view and are ignored, so a later unvote never retroactively
    /// excludes a voter from a block forged while they were voting. Among
    /// the remaining events a voter is active iff they have a vote with no
    /// unvote at or after its timestamp — a tie goes to the unvote and
    /// excludes the voter. Newly seen voters are registered in the store at
    /// the default share rate; that registration is the only side effect.
    /// Malformed events surface as a data-integrity fault.
    pub fn build(
        &self,
        votes: &[VoteEvent],
        unvotes: &[UnvoteEvent],
        as_of: Timestamp,
    ) -> Result<Vec<RollEntry>, EngineError> {
        // Latest unvote per key within the window; earlier unvotes are
        // superseded.
        let mut unvote_index: BTreeMap<&PublicKey, Timestamp> = BTreeMap::new();
        for unvote in unvotes.iter().filter(|u| u.timestamp <= as_of) {
            let entry = unvote_index
                .entry(&unvote.voter_public_key)
                .or_insert(unvote.timestamp);
            if unvote.timestamp > *entry {
                *entry = unvote.timestamp;
            }
        }

        let mut roll = Vec::new();
        let mut seen: BTreeSet<&PublicKey> = BTreeSet::new();
        for vote in votes.iter().filter(|v| v.timestamp <= as_of) {
            if seen.contains(&vote.voter_public_key) {
                continue;
            }
            if let Some(unvote_ts) = unvote_index.get(&vote.voter_public_key) {
                if *unvote_ts >= vote.timestamp {
                    continue;
                }
            }
            seen.insert(&vote.voter_public_key);

            let address = Address::from_public_key(&vote.voter_public_key, self.network)?;
            let newly_registered = self.store.register_voter(
                &address,
                &vote.voter_public_key,
                self.default_share_rate,
            )?;
            if newly_registered {
                tracing::info!(voter = %address, rate = self.default_share_rate, "registered new voter");
            }
            roll.push(RollEntry {
                address,
                public_key: vote.voter_public_key.clone(),
            });
        }

        tracing::debug!(voters = roll.len(), "voter roll built");
        Ok(roll)
    }
}
