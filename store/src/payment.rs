//! Staged-payment storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use tbw_types::{Address, Amount, TxId};

/// Lifecycle of a staged payment row.
///
/// `Staged → Processing → Processed` is the only forward path. `Processed`
/// is terminal and set only after the ledger explicitly accepted the
/// carrying transaction; a rejected or unbroadcast row drops back to
/// `Staged`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Staged,
    Processing,
    Processed,
}

/// A reward amount queued for settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedPayment {
    pub id: u64,
    pub recipient: Address,
    pub amount: Amount,
    pub message: String,
    pub status: PaymentStatus,
}

/// A payment row to be inserted by a staging run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub recipient: Address,
    pub amount: Amount,
    pub message: String,
}

/// One staging run's complete effect on the store.
///
/// Applied atomically: the payment rows land with status `Staged` in the
/// same transaction that settles each recipient's unpaid ledger (unpaid
/// reset to zero, staged amount added to total paid). Voters settled with a
/// zero amount get the bookkeeping update but no row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingBatch {
    pub rows: Vec<NewPayment>,
    /// `(voter address, staged amount)` — amount may be zero.
    pub voter_settlements: Vec<(Address, Amount)>,
    /// `(delegate account address, staged amount)` — reserve included; the
    /// gap between the reserve's unpaid balance and its staged amount is
    /// the fee/donation spend, and its ledger still resets to zero.
    pub delegate_settlements: Vec<(Address, Amount)>,
}

/// Trait for staged payments and broadcast transaction records.
pub trait PaymentStore {
    /// Apply a staging batch atomically. Returns the new row ids in the
    /// order of `batch.rows`.
    fn stage(&self, batch: &StagingBatch) -> Result<Vec<u64>, StoreError>;

    /// Rows with status `Staged`, oldest first, up to `limit`.
    fn staged_rows(&self, limit: usize) -> Result<Vec<StagedPayment>, StoreError>;

    /// Number of rows not yet processed.
    fn staged_count(&self) -> Result<u64, StoreError>;

    fn payment_row(&self, id: u64) -> Result<Option<StagedPayment>, StoreError>;

    /// Move rows into `Processing` while a settlement run owns them.
    fn mark_processing(&self, ids: &[u64]) -> Result<(), StoreError>;

    /// Return unconfirmed rows to `Staged` for retry. No-op for rows
    /// already `Processed`.
    fn release_processing(&self, ids: &[u64]) -> Result<(), StoreError>;

    /// Terminal transition after explicit ledger acceptance. Idempotent:
    /// re-marking a processed row is a no-op.
    fn mark_processed(&self, ids: &[u64]) -> Result<(), StoreError>;

    /// Delete rows outright. Stage-abort only; never used on rows that have
    /// reached a settlement run.
    fn delete_rows(&self, ids: &[u64]) -> Result<(), StoreError>;

    /// Record which rows a broadcast transaction carries.
    fn record_transaction(&self, txid: &TxId, row_ids: &[u64]) -> Result<(), StoreError>;

    /// Discard the record of a rejected transaction (the rows themselves
    /// are untouched).
    fn delete_transaction(&self, txid: &TxId) -> Result<(), StoreError>;

    /// Row ids carried by a recorded transaction.
    fn transaction_rows(&self, txid: &TxId) -> Result<Vec<u64>, StoreError>;
}
