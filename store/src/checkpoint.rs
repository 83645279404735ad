//! Balance checkpoint storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tbw_types::{Address, Amount, Timestamp};

/// Last-computed balance snapshot for one voter.
///
/// Owned and mutated only by the balance reconciler. Checkpoint timestamps
/// are monotonic: a write at an earlier timestamp than the stored one is a
/// [`StoreError::CheckpointRegression`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCheckpoint {
    pub address: Address,
    pub balance: Amount,
    pub checkpoint_timestamp: Timestamp,
}

/// Trait for balance checkpoints.
pub trait CheckpointStore {
    fn checkpoint(&self, address: &Address) -> Result<Option<BalanceCheckpoint>, StoreError>;

    /// Write one checkpoint row per voter at the given block timestamp.
    /// This is the atomic state update future blocks build on; rejects any
    /// write that would move a voter's checkpoint backwards.
    fn put_checkpoints(
        &self,
        balances: &BTreeMap<Address, Amount>,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Sum of all checkpointed balances — the delegate's raw approval,
    /// before any eligibility adjustment. Diagnostic only.
    fn total_checkpoint_balance(&self) -> Result<Amount, StoreError>;
}
