//! Fundamental types for the TBW payout engine.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: addresses, amounts, timestamps, forged blocks, vote events,
//! delegate configuration, and the top-level error taxonomy.

pub mod address;
pub mod amount;
pub mod block;
pub mod config;
pub mod error;
pub mod event;
pub mod network;
pub mod time;
pub mod transaction;

pub use address::{Address, PublicKey};
pub use amount::{Amount, SignedAmount};
pub use block::ForgedBlock;
pub use config::{DelegateConfig, DonationSettings, ExchangeRoute, FeeAccount, FeeSettings};
pub use error::TbwError;
pub use event::{UnvoteEvent, VoteEvent};
pub use network::NetworkId;
pub use time::Timestamp;
pub use transaction::{Recipient, SettlementTransaction, TxId};
