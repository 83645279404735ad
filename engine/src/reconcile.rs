//! Incremental voter-balance reconciliation via checkpoints.

use crate::roll::RollEntry;
use crate::EngineError;
use std::collections::BTreeMap;
use tbw_ledger::LedgerSource;
use tbw_store::CheckpointStore;
use tbw_types::{Address, Amount, ForgedBlock, Timestamp};

/// Computes each active voter's balance at a block's timestamp.
///
/// Strictly incremental: a voter's full transfer history is replayed once,
/// at first sight; every later block re-queries only the window since the
/// stored checkpoint. This is what keeps reconciliation affordable across a
/// long-lived delegate's history.
pub struct BalanceReconciler<'a, L: LedgerSource, S: CheckpointStore> {
    ledger: &'a L,
    store: &'a S,
}

impl<'a, L: LedgerSource, S: CheckpointStore> BalanceReconciler<'a, L, S> {
    pub fn new(ledger: &'a L, store: &'a S) -> Self {
        Self { ledger, store }
    }

    /// Balance of every roll entry at `block.timestamp`, keyed by derived
    /// address.
    ///
    /// For each voter: start from the stored checkpoint (or zero at the
    /// epoch for a first-seen voter), then apply transfer activity and
    /// forged-block income over the half-open window
    /// `(checkpoint_ts, block_ts]`. After the whole map is computed, one
    /// checkpoint row per voter is written at `block.timestamp` — the
    /// atomic state update future blocks build on.
    pub fn reconcile(
        &self,
        block: &ForgedBlock,
        roll: &[RollEntry],
    ) -> Result<BTreeMap<Address, Amount>, EngineError> {
        let mut balances = BTreeMap::new();

        for entry in roll {
            let (base, since) = match self.store.checkpoint(&entry.address)? {
                Some(cp) => {
                    if cp.checkpoint_timestamp > block.timestamp {
                        // Blocks must be processed in chronological order;
                        // a newer checkpoint means that order was broken.
                        return Err(EngineError::DataIntegrity(format!(
                            "checkpoint for {} at {} is newer than block at {}",
                            entry.address, cp.checkpoint_timestamp, block.timestamp
                        )));
                    }
                    (cp.balance, cp.checkpoint_timestamp)
                }
                None => (Amount::ZERO, Timestamp::EPOCH),
            };

            let delta = self
                .ledger
                .balance_delta(&entry.address, block.timestamp, since)?;
            let forged = self
                .ledger
                .block_rewards(&entry.address, block.timestamp, since)?;

            let balance = i128::from(base.raw()) + i128::from(delta.credit.raw())
                + i128::from(forged.raw())
                - i128::from(delta.debit.raw());
            let balance = u64::try_from(balance).map_err(|_| {
                EngineError::DataIntegrity(format!(
                    "negative reconciled balance for {}: base {base} credit {} forged {forged} debit {}",
                    entry.address, delta.credit, delta.debit
                ))
            })?;

            balances.insert(entry.address.clone(), Amount::new(balance));
        }

        self.store.put_checkpoints(&balances, block.timestamp)?;
        tracing::debug!(
            voters = balances.len(),
            at = %block.timestamp,
            "voter balances reconciled"
        );
        Ok(balances)
    }
}
