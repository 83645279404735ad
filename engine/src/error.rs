//! Engine error taxonomy.

use tbw_ledger::LedgerError;
use tbw_store::StoreError;
use tbw_types::{Amount, SignedAmount, TbwError};
use thiserror::Error;

/// Faults the payout engine can raise, split by how the cycle driver must
/// react to them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed vote/unvote history or ledger data. Not locally
    /// recoverable; surfaced to the operator.
    #[error("data integrity fault: {0}")]
    DataIntegrity(String),

    /// The reserve cannot cover the staging run's transaction fees.
    /// Recoverable: the cycle driver skips this staging run and retries on
    /// the next interval. Never process-terminating.
    #[error("insufficient reserve: fees require {needed}, reserve holds {available}")]
    InsufficientReserve {
        needed: Amount,
        available: SignedAmount,
    },

    /// A configuration value unusable at runtime.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Transport faults from the ledger collaborators. Recoverable: the
    /// cycle aborts, backs off, and retries.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<TbwError> for EngineError {
    fn from(e: TbwError) -> Self {
        match e {
            TbwError::DataIntegrity(msg) => EngineError::DataIntegrity(msg),
            TbwError::Config(msg) => EngineError::Config(msg),
        }
    }
}

impl EngineError {
    /// Whether the cycle driver should retry after backoff rather than
    /// surface the fault.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientReserve { .. } | EngineError::Ledger(_)
        )
    }
}
