//! Scripted collaborators shared by the engine's unit tests.

use std::cell::RefCell;
use std::collections::BTreeMap;

use tbw_ledger::{BalanceDelta, LedgerBroadcast, LedgerError, LedgerSource};
use tbw_types::{
    Address, Amount, ExchangeRoute, ForgedBlock, SettlementTransaction, Timestamp, TxId,
    UnvoteEvent, VoteEvent,
};

/// Scripted ledger: serves canned deltas/rewards/blocks, records queried
/// windows and submitted transactions, and accepts exactly the ids placed
/// in `accept`.
#[derive(Default)]
pub(crate) struct FakeLedger {
    pub deltas: RefCell<BTreeMap<Address, BalanceDelta>>,
    pub rewards: RefCell<BTreeMap<Address, Amount>>,
    pub queried_windows: RefCell<Vec<(Address, Timestamp, Timestamp)>>,
    pub blocks: RefCell<Vec<ForgedBlock>>,
    pub nonce: RefCell<u64>,
    /// When `None`, every submitted id is accepted; otherwise only these.
    pub accept: RefCell<Option<Vec<TxId>>>,
    pub submitted: RefCell<Vec<SettlementTransaction>>,
    pub fail_submit: RefCell<bool>,
}

impl LedgerSource for FakeLedger {
    fn votes(
        &self,
        _since: Timestamp,
    ) -> Result<(Vec<VoteEvent>, Vec<UnvoteEvent>), LedgerError> {
        Ok((vec![], vec![]))
    }

    fn balance_delta(
        &self,
        address: &Address,
        up_to: Timestamp,
        since: Timestamp,
    ) -> Result<BalanceDelta, LedgerError> {
        self.queried_windows
            .borrow_mut()
            .push((address.clone(), up_to, since));
        Ok(self
            .deltas
            .borrow()
            .get(address)
            .copied()
            .unwrap_or_default())
    }

    fn block_rewards(
        &self,
        address: &Address,
        _up_to: Timestamp,
        _since: Timestamp,
    ) -> Result<Amount, LedgerError> {
        Ok(self
            .rewards
            .borrow()
            .get(address)
            .copied()
            .unwrap_or(Amount::ZERO))
    }

    fn new_blocks(&self, since: Timestamp) -> Result<Vec<ForgedBlock>, LedgerError> {
        Ok(self
            .blocks
            .borrow()
            .iter()
            .filter(|b| b.timestamp > since)
            .cloned()
            .collect())
    }

    fn nonce(&self, _account: &Address) -> Result<u64, LedgerError> {
        Ok(*self.nonce.borrow())
    }
}

impl LedgerBroadcast for FakeLedger {
    fn submit(&self, transactions: &[SettlementTransaction]) -> Result<Vec<TxId>, LedgerError> {
        if *self.fail_submit.borrow() {
            return Err(LedgerError::Transport("relay unreachable".into()));
        }
        self.submitted
            .borrow_mut()
            .extend(transactions.iter().cloned());
        Ok(match &*self.accept.borrow() {
            Some(ids) => ids.clone(),
            None => transactions.iter().map(|t| t.id.clone()).collect(),
        })
    }
}

/// Exchange provider that redirects every quoted payout to one fixed
/// deposit address, or refuses (returning the refund address) when `fail`.
#[derive(Default)]
pub(crate) struct FakeExchange {
    pub deposit: Option<Address>,
    pub fail: bool,
    pub quoted: RefCell<Vec<(Address, Amount)>>,
}

impl tbw_ledger::ExchangeProvider for FakeExchange {
    fn quote(&self, _route: &ExchangeRoute, amount: Amount, refund: &Address) -> Address {
        self.quoted.borrow_mut().push((refund.clone(), amount));
        match (&self.deposit, self.fail) {
            (Some(deposit), false) => deposit.clone(),
            _ => refund.clone(),
        }
    }
}
