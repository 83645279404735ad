//! Timestamp type used throughout the workspace.
//!
//! Timestamps are the ledger's own epoch seconds — whatever clock the chain
//! stamps its blocks and transactions with. The payout engine never compares
//! them against wall-clock time, only against each other.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A ledger timestamp in seconds since the chain epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The chain epoch (time zero). A balance checkpoint at the epoch means
    /// the voter's full transfer history must be replayed.
    pub const EPOCH: Self = Self(0);

    pub const fn new(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn is_epoch(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
