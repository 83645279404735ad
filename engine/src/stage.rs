//! Payment staging.
//!
//! Moves accumulated unpaid balances into staged payment rows in one atomic
//! store call. The reserve is settled first and carries the whole fee
//! liability; every other recipient is staged at their full unpaid balance.

use crate::{EngineError, FeeSchedule};
use tbw_store::{NewPayment, PaymentStore, RewardStore, StagingBatch, VoterStore};
use tbw_types::{Amount, DelegateConfig};

/// Why a staging run fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageTrigger {
    /// The processed-block count hit the configured payout interval.
    Interval,
    /// Operator-requested one-off run.
    Manual,
}

/// What one staging run produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingOutcome {
    pub trigger: StageTrigger,
    pub row_ids: Vec<u64>,
    pub voter_rows: usize,
    pub voter_total: Amount,
    pub reserve_payment: Amount,
    pub donation: Amount,
    pub fees: Amount,
}

/// Stages one payout run against the store.
pub struct PaymentStager<'a, S>
where
    S: VoterStore + RewardStore + PaymentStore,
{
    store: &'a S,
    config: &'a DelegateConfig,
    fees: FeeSchedule,
}

impl<'a, S> PaymentStager<'a, S>
where
    S: VoterStore + RewardStore + PaymentStore,
{
    pub fn new(store: &'a S, config: &'a DelegateConfig) -> Self {
        Self {
            store,
            config,
            fees: FeeSchedule::new(&config.fees),
        }
    }

    /// Whether a staging run is due after the processed-block count moved
    /// from `before` to `after` this cycle. Fires whenever the count
    /// crosses an interval boundary, so a backlog that jumps past a
    /// multiple without landing on it still pays out.
    pub fn trigger_for(&self, before: u64, after: u64) -> Option<StageTrigger> {
        if self.config.manual_pay {
            return Some(StageTrigger::Manual);
        }
        (after / self.config.interval > before / self.config.interval)
            .then_some(StageTrigger::Interval)
    }

    /// Run one staging pass.
    ///
    /// Returns `Ok(None)` when no voter holds an unpaid balance (nothing to
    /// pay, so nothing is staged and no fee is spent). Fails with
    /// [`EngineError::InsufficientReserve`] when the reserve cannot cover
    /// the run's fee liability; the caller skips the run and retries at the
    /// next interval.
    pub fn stage(&self, trigger: StageTrigger) -> Result<Option<StagingOutcome>, EngineError> {
        let voters = self.store.all_voters()?;
        let voter_total: Amount = voters.iter().map(|v| v.unpaid).sum();
        if voter_total.is_zero() {
            tracing::info!(delegate = %self.config.name, "no unpaid voter balances, staging skipped");
            return Ok(None);
        }

        let balances = self.store.delegate_balances()?;
        let voter_rows = voters.iter().filter(|v| !v.unpaid.is_zero()).count();
        let delegate_tx = 1 + balances.accounts.len();
        let fees = self
            .fees
            .settlement_fees(voter_rows + delegate_tx, self.config.batched);

        let remaining = balances.reserve_unpaid - fees.as_signed();
        if !remaining.is_positive() {
            return Err(EngineError::InsufficientReserve {
                needed: fees,
                available: balances.reserve_unpaid,
            });
        }
        // remaining > 0 implies the reserve itself fits in an Amount.
        let reserve = balances
            .reserve_unpaid
            .to_amount()
            .ok_or_else(|| EngineError::DataIntegrity("negative reserve after fee check".into()))?;

        let mut rows = Vec::with_capacity(voter_rows + delegate_tx + 1);
        let mut donation = Amount::ZERO;
        let reserve_payment = match &self.config.donation {
            Some(d) => {
                // The donation takes its percent of the whole reserve and
                // rides as its own transfer, so the reserve payment also
                // covers one extra single-transfer fee.
                donation = reserve.percent_floor(d.percent);
                if !donation.is_zero() {
                    rows.push(NewPayment {
                        recipient: d.address.clone(),
                        amount: donation,
                        message: "Donation".to_string(),
                    });
                }
                tracing::info!(
                    delegate = %self.config.name,
                    donation = %donation,
                    recipient = %d.address,
                    "donation staged"
                );
                (reserve - donation).saturating_sub(self.fees.single())
            }
            None => reserve - fees,
        };

        if !reserve_payment.is_zero() {
            rows.push(NewPayment {
                recipient: balances.reserve_address.clone(),
                amount: reserve_payment,
                message: "Reward".to_string(),
            });
        }
        let mut delegate_settlements = vec![(balances.reserve_address.clone(), reserve_payment)];
        for (address, amount) in &balances.accounts {
            if !amount.is_zero() {
                rows.push(NewPayment {
                    recipient: address.clone(),
                    amount: *amount,
                    message: "Reward".to_string(),
                });
            }
            delegate_settlements.push((address.clone(), *amount));
        }

        let mut voter_settlements = Vec::with_capacity(voters.len());
        for voter in &voters {
            if !voter.unpaid.is_zero() {
                rows.push(NewPayment {
                    recipient: voter.address.clone(),
                    amount: voter.unpaid,
                    message: self.config.message.clone(),
                });
            }
            voter_settlements.push((voter.address.clone(), voter.unpaid));
        }

        let batch = StagingBatch {
            rows,
            voter_settlements,
            delegate_settlements,
        };
        let row_ids = self.store.stage(&batch)?;

        let outcome = StagingOutcome {
            trigger,
            row_ids,
            voter_rows,
            voter_total,
            reserve_payment,
            donation,
            fees,
        };
        tracing::info!(
            delegate = %self.config.name,
            trigger = ?outcome.trigger,
            rows = outcome.row_ids.len(),
            voter_total = %outcome.voter_total,
            reserve_payment = %outcome.reserve_payment,
            fees = %outcome.fees,
            "payments staged"
        );
        Ok(Some(outcome))
    }
}
