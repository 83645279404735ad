//! Abstract storage traits for the TBW payout engine.
//!
//! Every storage backend (the in-memory reference backend, or a persistent
//! engine supplied by the operator) implements these traits. The rest of the
//! workspace depends only on the traits. Backends must guarantee the
//! status-transition and atomicity rules documented on each trait; the
//! backend's own transaction discipline protects staged-row transitions from
//! concurrent readers.

pub mod block;
pub mod checkpoint;
pub mod error;
pub mod payment;
pub mod reward;
pub mod voter;

pub use block::BlockStore;
pub use checkpoint::{BalanceCheckpoint, CheckpointStore};
pub use error::StoreError;
pub use payment::{NewPayment, PaymentStatus, PaymentStore, StagedPayment, StagingBatch};
pub use reward::{DelegateBalances, RewardStore};
pub use voter::{VoterRecord, VoterStore};

/// Everything a delegate worker needs from its exclusively-owned store.
pub trait DelegateStore:
    BlockStore + VoterStore + CheckpointStore + RewardStore + PaymentStore
{
}

impl<T> DelegateStore for T where
    T: BlockStore + VoterStore + CheckpointStore + RewardStore + PaymentStore
{
}
