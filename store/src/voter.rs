//! Voter registry and unpaid-balance storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use tbw_types::{Address, Amount, PublicKey};

/// A registered voter and their payout bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub address: Address,
    pub public_key: PublicKey,
    /// Share rate in percent. Registered at the configured standard rate;
    /// individually updatable for custom-rate voters.
    pub share_rate: u8,
    /// Accumulated reward owed but not yet staged.
    pub unpaid: Amount,
    /// Lifetime amount moved into staged payments.
    pub total_paid: Amount,
}

/// Trait for the voter registry.
pub trait VoterStore {
    /// Register a newly-seen voter with the given default share rate.
    /// Returns `false` (and changes nothing) when the address is already
    /// registered — re-registration must not reset a custom rate or an
    /// unpaid balance.
    fn register_voter(
        &self,
        address: &Address,
        public_key: &PublicKey,
        share_rate: u8,
    ) -> Result<bool, StoreError>;

    fn voter(&self, address: &Address) -> Result<Option<VoterRecord>, StoreError>;

    /// Share rate for a registered voter.
    fn share_rate(&self, address: &Address) -> Result<u8, StoreError>;

    /// Set a custom share rate for one voter.
    fn set_share_rate(&self, address: &Address, rate: u8) -> Result<(), StoreError>;

    /// Rewrite every voter currently at `old_rate` to `new_rate`. Returns
    /// the number of voters updated.
    fn migrate_share_rate(&self, old_rate: u8, new_rate: u8) -> Result<u64, StoreError>;

    fn all_voters(&self) -> Result<Vec<VoterRecord>, StoreError>;

    /// All voters with a positive unpaid balance.
    fn voters_with_unpaid(&self) -> Result<Vec<VoterRecord>, StoreError>;

    /// Add a block reward share to a voter's unpaid balance.
    fn credit_unpaid(&self, address: &Address, amount: Amount) -> Result<(), StoreError>;
}
