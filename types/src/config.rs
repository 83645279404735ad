//! Delegate configuration.
//!
//! One fixed struct with every recognized field enumerated and defaulted at
//! load time, passed by reference into each worker at construction. There is
//! no global registry singleton and no dynamically-shaped settings object —
//! a typo in a config file fails deserialization instead of silently
//! reaching allocation logic.

use crate::{Address, Amount, NetworkId, TbwError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A delegate-owned fee account and the percentage of each block reward it
/// receives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAccount {
    pub address: Address,
    pub rate: u8,
}

/// Donation split applied to the reserve at staging time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationSettings {
    pub address: Address,
    pub percent: u8,
}

/// Per-recipient currency-exchange redirection (single-payment mode only).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRoute {
    /// Staged-payment recipient whose payout is routed through the exchange.
    pub recipient: Address,
    pub from_currency: String,
    pub to_currency: String,
    /// Destination address on the target chain.
    pub deposit_to: Address,
    /// Quote endpoint of the exchange provider.
    pub provider_url: String,
}

/// Transaction-fee schedule and batching limits for the broadcast provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSettings {
    /// Fee for a single-recipient transfer, atomic units.
    #[serde(default = "default_fee_single")]
    pub single: u64,
    /// Base fee for a multi-recipient transaction, atomic units.
    #[serde(default = "default_fee_multi_base")]
    pub multi_base: u64,
    /// Additional fee per recipient leg in a multi-recipient transaction.
    #[serde(default = "default_fee_multi_per_payment")]
    pub multi_per_payment: u64,
    /// Provider limit on recipient legs per multi-recipient transaction.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Provider limit on transactions submitted per broadcast request.
    #[serde(default = "default_request_limit")]
    pub request_limit: usize,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            single: default_fee_single(),
            multi_base: default_fee_multi_base(),
            multi_per_payment: default_fee_multi_per_payment(),
            batch_limit: default_batch_limit(),
            request_limit: default_request_limit(),
        }
    }
}

/// Configuration for one delegate's payout worker.
///
/// Loadable from TOML (every field defaulted where a default is sensible)
/// or built programmatically for tests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegateConfig {
    /// Delegate username, used for log scoping and store identity.
    pub name: String,

    #[serde(default)]
    pub network: NetworkId,

    /// Atomic units per whole token.
    #[serde(default = "default_atomic")]
    pub atomic: u64,

    /// Base URL of the relay node's HTTP API.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Blocks at or below this height are marked processed on first run and
    /// never retro-paid.
    #[serde(default)]
    pub start_height: u64,

    /// Vendor message attached to voter payout rows.
    #[serde(default = "default_message")]
    pub message: String,

    /// Standard voter share rate, percent of the block reward.
    #[serde(default = "default_voter_share")]
    pub voter_share: u8,

    /// Weighting cap in whole tokens; 0 disables the cap.
    #[serde(default)]
    pub voter_cap: u64,

    /// Minimum weighting balance in whole tokens; 0 disables the minimum.
    #[serde(default)]
    pub voter_min: u64,

    /// When enabled the whitelist takes precedence and the blacklist is
    /// never consulted.
    #[serde(default)]
    pub whitelist_enabled: bool,
    #[serde(default)]
    pub whitelist: BTreeSet<Address>,

    #[serde(default)]
    pub blacklist_enabled: bool,
    #[serde(default)]
    pub blacklist: BTreeSet<Address>,

    /// Payout interval in processed blocks.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Use multi-recipient settlement transactions.
    #[serde(default)]
    pub batched: bool,

    /// The reserve account: receives its rate of the block reward plus the
    /// whole transaction-fee pool, pays all settlement fees, and absorbs
    /// custom-rate remainders. Explicit field, not position 0 of a list.
    pub reserve: FeeAccount,

    /// Additional delegate fee accounts, paid their full unpaid balance.
    #[serde(default)]
    pub fee_accounts: Vec<FeeAccount>,

    /// Hex-encoded 32-byte ed25519 signing seed for settlement transactions.
    pub signing_seed: String,

    #[serde(default)]
    pub donation: Option<DonationSettings>,

    #[serde(default)]
    pub exchange_routes: Vec<ExchangeRoute>,

    #[serde(default)]
    pub fees: FeeSettings,

    /// Seconds between processing cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds to back off after an unhandled cycle error.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    /// Force a staging run on the next cycle regardless of the interval.
    #[serde(default)]
    pub manual_pay: bool,
}

impl DelegateConfig {
    /// Weighting cap in atomic units, `None` when disabled.
    pub fn cap_atomic(&self) -> Option<Amount> {
        (self.voter_cap > 0).then(|| Amount::new(self.voter_cap * self.atomic))
    }

    /// Minimum weighting balance in atomic units, `None` when disabled.
    pub fn min_atomic(&self) -> Option<Amount> {
        (self.voter_min > 0).then(|| Amount::new(self.voter_min * self.atomic))
    }

    /// All delegate fee accounts, reserve first.
    pub fn all_fee_addresses(&self) -> Vec<Address> {
        let mut out = vec![self.reserve.address.clone()];
        out.extend(self.fee_accounts.iter().map(|a| a.address.clone()));
        out
    }

    /// Exchange route configured for a recipient, if any.
    pub fn exchange_route_for(&self, recipient: &Address) -> Option<&ExchangeRoute> {
        self.exchange_routes.iter().find(|r| &r.recipient == recipient)
    }

    /// Reject configurations that cannot be allocated against.
    pub fn validate(&self) -> Result<(), TbwError> {
        if self.atomic == 0 {
            return Err(TbwError::Config("atomic unit scale must be positive".into()));
        }
        if self.interval == 0 {
            return Err(TbwError::Config("payout interval must be at least 1".into()));
        }
        if self.voter_share > 100 {
            return Err(TbwError::Config(format!(
                "voter_share {}% exceeds 100%",
                self.voter_share
            )));
        }
        let delegate_rate: u32 = u32::from(self.reserve.rate)
            + self.fee_accounts.iter().map(|a| u32::from(a.rate)).sum::<u32>();
        if delegate_rate + u32::from(self.voter_share) > 100 {
            return Err(TbwError::Config(format!(
                "delegate rates {}% plus voter_share {}% exceed 100%",
                delegate_rate, self.voter_share
            )));
        }
        if let Some(d) = &self.donation {
            if d.percent > 100 {
                return Err(TbwError::Config(format!(
                    "donate percent {}% exceeds 100%",
                    d.percent
                )));
            }
        }
        match hex::decode(&self.signing_seed) {
            Ok(bytes) if bytes.len() == 32 => {}
            _ => {
                return Err(TbwError::Config(
                    "signing_seed must be 32 hex-encoded bytes".into(),
                ))
            }
        }
        if self.fees.batch_limit == 0 || self.fees.request_limit == 0 {
            return Err(TbwError::Config("batch and request limits must be positive".into()));
        }
        Ok(())
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_atomic() -> u64 {
    100_000_000
}

fn default_relay_url() -> String {
    "http://127.0.0.1:4003/api".to_string()
}

fn default_message() -> String {
    "Reward".to_string()
}

fn default_voter_share() -> u8 {
    90
}

fn default_interval() -> u64 {
    211
}

fn default_fee_single() -> u64 {
    10_000_000
}

fn default_fee_multi_base() -> u64 {
    10_000_000
}

fn default_fee_multi_per_payment() -> u64 {
    500_000
}

fn default_batch_limit() -> usize {
    64
}

fn default_request_limit() -> usize {
    40
}

fn default_poll_interval() -> u64 {
    1200
}

fn default_error_backoff() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> DelegateConfig {
        DelegateConfig {
            name: "testdelegate".into(),
            network: NetworkId::Dev,
            atomic: default_atomic(),
            relay_url: default_relay_url(),
            start_height: 0,
            message: default_message(),
            voter_share: 90,
            voter_cap: 0,
            voter_min: 0,
            whitelist_enabled: false,
            whitelist: BTreeSet::new(),
            blacklist_enabled: false,
            blacklist: BTreeSet::new(),
            interval: default_interval(),
            batched: false,
            reserve: FeeAccount {
                address: Address::new("Dreserve"),
                rate: 10,
            },
            fee_accounts: vec![],
            signing_seed: "11".repeat(32),
            donation: None,
            exchange_routes: vec![],
            fees: FeeSettings::default(),
            poll_interval_secs: default_poll_interval(),
            error_backoff_secs: default_error_backoff(),
            manual_pay: false,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        base_config().validate().unwrap();
    }

    #[test]
    fn test_rates_over_100_rejected() {
        let mut cfg = base_config();
        cfg.voter_share = 95;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_seed_rejected() {
        let mut cfg = base_config();
        cfg.signing_seed = "zz".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_cap_and_min_scale_to_atomic() {
        let mut cfg = base_config();
        assert_eq!(cfg.cap_atomic(), None);
        cfg.voter_cap = 2;
        cfg.voter_min = 1;
        assert_eq!(cfg.cap_atomic(), Some(Amount::new(200_000_000)));
        assert_eq!(cfg.min_atomic(), Some(Amount::new(100_000_000)));
    }
}
