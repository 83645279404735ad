//! Vote and unvote events from the ledger's transaction history.

use crate::{PublicKey, Timestamp};
use serde::{Deserialize, Serialize};

/// A vote cast for the delegate. Read-only to this system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
    pub voter_public_key: PublicKey,
    pub timestamp: Timestamp,
}

/// A vote withdrawn from the delegate. Read-only to this system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnvoteEvent {
    pub voter_public_key: PublicKey,
    pub timestamp: Timestamp,
}
