//! Eligibility and weighting policy.
//!
//! A sequential transform over the reconciled balance map. Each stage takes
//! and returns a complete map: an address absent from the output is fully
//! excluded from allocation; an address present with a zero balance is
//! excluded from payment but still counted in bookkeeping.

use crate::EngineError;
use std::collections::BTreeMap;
use tbw_store::VoterStore;
use tbw_types::{Address, Amount, DelegateConfig};

/// Applies whitelist/blacklist/cap/minimum/anti-dilution policy, in that
/// order, producing the reward-weighting balances.
pub struct EligibilityPipeline<'a, S: VoterStore> {
    store: &'a S,
    config: &'a DelegateConfig,
}

impl<'a, S: VoterStore> EligibilityPipeline<'a, S> {
    pub fn new(store: &'a S, config: &'a DelegateConfig) -> Self {
        Self { store, config }
    }

    pub fn apply(
        &self,
        balances: BTreeMap<Address, Amount>,
    ) -> Result<BTreeMap<Address, Amount>, EngineError> {
        let raw_count = balances.len();

        // The whitelist, when enabled, takes precedence: the blacklist is
        // consulted only when the whitelist is disabled.
        let balances = if self.config.whitelist_enabled {
            apply_whitelist(balances, &self.config.whitelist)
        } else if self.config.blacklist_enabled {
            apply_blacklist(balances, &self.config.blacklist)
        } else {
            balances
        };

        let balances = match self.config.cap_atomic() {
            Some(cap) => apply_cap(balances, cap),
            None => balances,
        };
        let balances = match self.config.min_atomic() {
            Some(min) => apply_min(balances, min),
            None => balances,
        };
        let balances = self.apply_anti_dilution(balances)?;

        tracing::debug!(
            raw = raw_count,
            eligible = balances.len(),
            "eligibility pipeline applied"
        );
        Ok(balances)
    }

    /// Credit each voter's unpaid balance back into their weighting balance
    /// so pending rewards don't dilute their vote weight. Weighting only —
    /// never the voter's on-chain balance or the paid-amount bookkeeping.
    fn apply_anti_dilution(
        &self,
        balances: BTreeMap<Address, Amount>,
    ) -> Result<BTreeMap<Address, Amount>, EngineError> {
        balances
            .into_iter()
            .map(|(address, balance)| {
                let voter = self.store.voter(&address)?.ok_or_else(|| {
                    EngineError::DataIntegrity(format!("unregistered voter in roll: {address}"))
                })?;
                Ok((address, balance + voter.unpaid))
            })
            .collect()
    }
}

/// Keep only whitelisted addresses.
pub fn apply_whitelist(
    balances: BTreeMap<Address, Amount>,
    whitelist: &std::collections::BTreeSet<Address>,
) -> BTreeMap<Address, Amount> {
    balances
        .into_iter()
        .filter(|(address, _)| whitelist.contains(address))
        .collect()
}

/// Drop blacklisted addresses.
pub fn apply_blacklist(
    balances: BTreeMap<Address, Amount>,
    blacklist: &std::collections::BTreeSet<Address>,
) -> BTreeMap<Address, Amount> {
    balances
        .into_iter()
        .filter(|(address, _)| !blacklist.contains(address))
        .collect()
}

/// Clamp every balance to the cap.
pub fn apply_cap(balances: BTreeMap<Address, Amount>, cap: Amount) -> BTreeMap<Address, Amount> {
    balances
        .into_iter()
        .map(|(address, balance)| (address, balance.min(cap)))
        .collect()
}

/// Zero balances at or below the minimum; the address stays in the map so
/// bookkeeping still sees the voter.
pub fn apply_min(balances: BTreeMap<Address, Amount>, min: Amount) -> BTreeMap<Address, Amount> {
    balances
        .into_iter()
        .map(|(address, balance)| {
            let weighted = if balance > min { balance } else { Amount::ZERO };
            (address, weighted)
        })
        .collect()
}
