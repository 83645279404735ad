//! Delegate fee-account storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use tbw_types::{Address, Amount, SignedAmount};

/// Unpaid balances of the delegate's own accounts.
///
/// The reserve is a first-class field, not an entry in the list: it is the
/// account that receives the fee pool, pays settlement fees, and absorbs
/// custom-rate remainders — which is also why its ledger is signed and may
/// run negative between blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateBalances {
    pub reserve_address: Address,
    pub reserve_unpaid: SignedAmount,
    /// Additional fee accounts in configured order.
    pub accounts: Vec<(Address, Amount)>,
}

/// Trait for the delegate's own reward accounts.
pub trait RewardStore {
    /// Register the reserve and extra fee accounts. Idempotent; existing
    /// balances are preserved.
    fn init_delegate_accounts(
        &self,
        reserve: &Address,
        extra: &[Address],
    ) -> Result<(), StoreError>;

    /// Apply a signed delta to the reserve's unpaid ledger.
    fn credit_reserve(&self, delta: SignedAmount) -> Result<(), StoreError>;

    /// Add to an extra fee account's unpaid balance.
    fn credit_fee_account(&self, address: &Address, amount: Amount) -> Result<(), StoreError>;

    fn delegate_balances(&self) -> Result<DelegateBalances, StoreError>;
}
