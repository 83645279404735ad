//! Forged-block storage trait.

use crate::StoreError;
use tbw_types::ForgedBlock;

/// Trait for tracking the delegate's forged blocks and their processing
/// state.
///
/// Blocks are keyed by height. `mark_block_processed` is exactly-once: a second
/// attempt on the same height is a [`StoreError::Duplicate`], which is how
/// the allocator's "processed is set exactly once" invariant is enforced at
/// the storage seam.
pub trait BlockStore {
    /// Store newly observed blocks. Re-storing an already-known height is a
    /// no-op (block data is immutable once observed).
    fn put_blocks(&self, blocks: &[ForgedBlock]) -> Result<(), StoreError>;

    /// The highest stored block, processed or not.
    fn last_block(&self) -> Result<Option<ForgedBlock>, StoreError>;

    /// All unprocessed blocks, oldest first. Chronological order matters:
    /// balance checkpoints depend on it.
    fn unprocessed_blocks(&self) -> Result<Vec<ForgedBlock>, StoreError>;

    /// Mark one block processed, exactly once.
    fn mark_block_processed(&self, height: u64) -> Result<(), StoreError>;

    /// Mark every stored block at or below `height` processed. First-run
    /// initialization only; returns the number of blocks marked.
    fn mark_processed_up_to(&self, height: u64) -> Result<u64, StoreError>;

    /// Number of processed blocks (drives the payout-interval check).
    fn processed_count(&self) -> Result<u64, StoreError>;
}
