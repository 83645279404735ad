//! Ledger query and broadcast interfaces.

use crate::LedgerError;
use tbw_types::{
    Address, Amount, ForgedBlock, SettlementTransaction, Timestamp, TxId, UnvoteEvent, VoteEvent,
};

/// Net transfer activity for an account over a query window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    /// Sum of outbound transfers (including their fees).
    pub debit: Amount,
    /// Sum of inbound transfers.
    pub credit: Amount,
}

/// Read access to the ledger.
///
/// All window queries are over the half-open interval `(since, up_to]` in
/// ledger timestamps.
pub trait LedgerSource {
    /// Vote and unvote history for the delegate since the given timestamp.
    fn votes(&self, since: Timestamp)
        -> Result<(Vec<VoteEvent>, Vec<UnvoteEvent>), LedgerError>;

    /// Transfer activity for one account over the window.
    fn balance_delta(
        &self,
        address: &Address,
        up_to: Timestamp,
        since: Timestamp,
    ) -> Result<BalanceDelta, LedgerError>;

    /// Block rewards the account earned forging its own blocks over the
    /// window (voters can be delegates themselves).
    fn block_rewards(
        &self,
        address: &Address,
        up_to: Timestamp,
        since: Timestamp,
    ) -> Result<Amount, LedgerError>;

    /// Blocks the delegate forged since the given timestamp.
    fn new_blocks(&self, since: Timestamp) -> Result<Vec<ForgedBlock>, LedgerError>;

    /// Current transaction nonce of an account.
    fn nonce(&self, account: &Address) -> Result<u64, LedgerError>;
}

/// Write access to the ledger.
pub trait LedgerBroadcast {
    /// Submit signed transactions in one call; returns the ids the ledger
    /// accepted. A transport error means "none accepted" to the caller —
    /// staged rows stay staged and the run retries.
    fn submit(&self, transactions: &[SettlementTransaction]) -> Result<Vec<TxId>, LedgerError>;
}
