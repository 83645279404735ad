//! True-block-weight payout engine.
//!
//! For every block the delegate forges: reconstruct who was actively voting
//! ([`roll`]), compute each voter's balance at the block timestamp
//! ([`reconcile`]), apply the eligibility/weighting policy ([`eligibility`]),
//! and allocate the block's reward ([`allocate`]). On the payout interval,
//! accumulated unpaid balances become staged payment rows ([`stage`]) which
//! the settlement engine converts into signed transactions, broadcasts, and
//! reconciles against the ledger's acceptance response ([`settle`]).
//!
//! All components take their store and ledger collaborators by reference;
//! no engine type owns a connection or spawns a task.

pub mod allocate;
pub mod blocks;
pub mod eligibility;
pub mod error;
pub mod fees;
pub mod reconcile;
pub mod roll;
pub mod settle;
pub mod stage;
pub mod tx;

#[cfg(test)]
pub(crate) mod testing;

pub use allocate::{AllocationSummary, RewardAllocator};
pub use blocks::BlockIntake;
pub use eligibility::EligibilityPipeline;
pub use error::EngineError;
pub use fees::FeeSchedule;
pub use reconcile::BalanceReconciler;
pub use roll::{RollEntry, VoterRollBuilder};
pub use settle::{SettlementEngine, SettlementReport};
pub use stage::{PaymentStager, StageTrigger, StagingOutcome};
pub use tx::TransactionSigner;
