use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger or relay unreachable. Recoverable: the current cycle aborts
    /// with backoff and retries.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response that could not be interpreted.
    #[error("malformed ledger response: {0}")]
    Protocol(String),
}
