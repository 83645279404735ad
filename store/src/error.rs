use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("checkpoint regression for {address}: stored {stored}, attempted {attempted}")]
    CheckpointRegression {
        address: String,
        stored: u64,
        attempted: u64,
    },

    #[error("database is corrupted: {0}")]
    Corruption(String),
}
