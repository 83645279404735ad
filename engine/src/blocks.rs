//! Forged-block intake: fetch, persist, and order the delegate's blocks.

use crate::EngineError;
use tbw_ledger::LedgerSource;
use tbw_store::BlockStore;
use tbw_types::{ForgedBlock, Timestamp};

/// Pulls new forged blocks from the ledger into the store and hands back
/// the unprocessed backlog in chronological order.
pub struct BlockIntake<'a, L: LedgerSource, S: BlockStore> {
    ledger: &'a L,
    store: &'a S,
}

impl<'a, L: LedgerSource, S: BlockStore> BlockIntake<'a, L, S> {
    pub fn new(ledger: &'a L, store: &'a S) -> Self {
        Self { ledger, store }
    }

    /// First-run initialization: import the full forged-block history and
    /// mark everything at or below `start_height` processed so historical
    /// blocks are never retro-paid. Returns the number of blocks marked.
    pub fn initialize(&self, start_height: u64) -> Result<u64, EngineError> {
        let history = self.ledger.new_blocks(Timestamp::EPOCH)?;
        self.store.put_blocks(&history)?;
        let marked = self.store.mark_processed_up_to(start_height)?;
        tracing::info!(
            imported = history.len(),
            marked,
            start_height,
            "forged-block history imported"
        );
        Ok(marked)
    }

    /// Fetch blocks forged since the last one we know about, persist them,
    /// and return the unprocessed backlog oldest first.
    pub fn sync(&self) -> Result<Vec<ForgedBlock>, EngineError> {
        let since = self
            .store
            .last_block()?
            .map(|b| b.timestamp)
            .unwrap_or(Timestamp::EPOCH);
        let new_blocks = self.ledger.new_blocks(since)?;
        if !new_blocks.is_empty() {
            tracing::info!(count = new_blocks.len(), since = %since, "new forged blocks observed");
            self.store.put_blocks(&new_blocks)?;
        }
        Ok(self.store.unprocessed_blocks()?)
    }

    /// Number of processed blocks, which drives the payout-interval check.
    pub fn processed_count(&self) -> Result<u64, EngineError> {
        Ok(self.store.processed_count()?)
    }
}
