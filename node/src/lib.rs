//! Per-delegate payout workers.
//!
//! Each configured delegate gets one [`worker::DelegateWorker`] that owns
//! its store and ledger collaborators outright; delegates share nothing.
//! The crate also carries the daemon's configuration file format
//! ([`config::DelegateRegistry`]) and logging initialisation.

pub mod config;
pub mod error;
pub mod logging;
pub mod worker;

pub use config::DelegateRegistry;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use worker::{CycleSummary, DelegateWorker};
