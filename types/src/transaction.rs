//! Settlement transaction wire types.

use crate::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a broadcast transaction (hex digest of the signed payload).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(String);

impl TxId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recipient leg of a settlement transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: Address,
    pub amount: Amount,
}

/// A built, signed settlement transaction ready for broadcast.
///
/// Ephemeral: either confirmed by the ledger (its staged rows become
/// processed) or discarded whole (its rows stay staged for retry). Never
/// persisted past reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTransaction {
    pub id: TxId,
    pub nonce: u64,
    pub recipients: Vec<Recipient>,
    pub fee: Amount,
    pub memo: String,
    pub signature: String,
}

impl SettlementTransaction {
    /// Total value carried to recipients, excluding the fee.
    pub fn total_amount(&self) -> Amount {
        self.recipients.iter().map(|r| r.amount).sum()
    }
}
