//! Forged block observed from the ledger.

use crate::{Amount, Timestamp};
use serde::{Deserialize, Serialize};

/// A block the delegate forged, as reported by the ledger.
///
/// Immutable once observed; `processed` is flipped exactly once, by the
/// reward allocator after a successful allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgedBlock {
    pub height: u64,
    pub timestamp: Timestamp,
    pub block_reward: Amount,
    pub fee_reward: Amount,
    pub processed: bool,
}

impl ForgedBlock {
    pub fn new(height: u64, timestamp: Timestamp, block_reward: Amount, fee_reward: Amount) -> Self {
        Self {
            height,
            timestamp,
            block_reward,
            fee_reward,
            processed: false,
        }
    }

    /// The full reward pool carried by this block.
    pub fn total_reward(&self) -> Amount {
        self.block_reward + self.fee_reward
    }
}
