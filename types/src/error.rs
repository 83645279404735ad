//! Workspace-level error type.

use thiserror::Error;

/// Faults that can arise from the fundamental types themselves.
#[derive(Debug, Error)]
pub enum TbwError {
    /// Vote/unvote history or ledger data that cannot be interpreted.
    /// Not locally recoverable — surfaced to the operator, never swallowed.
    #[error("data integrity fault: {0}")]
    DataIntegrity(String),

    /// A configuration value that cannot be used as loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}
