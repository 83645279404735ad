//! Block reward allocation.
//!
//! Splits one forged block's reward between the delegate's fee accounts and
//! the voters, proportionally to weighting balance, honoring per-voter
//! custom share rates. Every amount that leaves this module is an
//! integer-floored atomic value; the floor-truncation shortfall is reported
//! as a diagnostic, never redistributed.

use crate::EngineError;
use std::collections::BTreeMap;
use tbw_store::{BlockStore, CheckpointStore, RewardStore, VoterStore};
use tbw_types::{Address, Amount, DelegateConfig, ForgedBlock, SignedAmount};

/// Diagnostic totals for one allocated block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationSummary {
    pub height: u64,
    pub voters_processed: usize,
    pub voter_rewards: Amount,
    /// Delegate-side total including (possibly negative) custom-rate
    /// remainders routed to the reserve.
    pub delegate_rewards: SignedAmount,
    pub total_reward: Amount,
    /// `total_reward − voter_rewards − delegate_rewards`. Bounded by one
    /// atomic unit per recipient; purely diagnostic.
    pub truncation_loss: SignedAmount,
    /// Raw approval: sum of checkpointed balances before eligibility.
    pub approval_raw: Amount,
    /// Approval after the eligibility pipeline (dilution-adjusted).
    pub approval_weighted: Amount,
}

/// Allocates one block's reward into unpaid balances.
pub struct RewardAllocator<'a, S>
where
    S: VoterStore + RewardStore + BlockStore + CheckpointStore,
{
    store: &'a S,
    config: &'a DelegateConfig,
}

impl<'a, S> RewardAllocator<'a, S>
where
    S: VoterStore + RewardStore + BlockStore + CheckpointStore,
{
    pub fn new(store: &'a S, config: &'a DelegateConfig) -> Self {
        Self { store, config }
    }

    /// Allocate `block`'s reward against the post-pipeline weighting map.
    ///
    /// Increments every voter and delegate unpaid balance and marks the
    /// block processed — exactly once; a second allocation of the same
    /// height fails at the storage seam.
    pub fn allocate(
        &self,
        block: &ForgedBlock,
        weights: &BTreeMap<Address, Amount>,
    ) -> Result<AllocationSummary, EngineError> {
        let total_weight: Amount = weights.values().copied().sum();
        let mut voter_rewards = Amount::ZERO;
        let mut delegate_rewards = SignedAmount::ZERO;
        let mut voters_processed = 0;

        // Delegate side. The reserve takes its rate of the block reward
        // plus the whole transaction-fee pool.
        let reserve_reward = block.block_reward.percent_floor(self.config.reserve.rate)
            + block.fee_reward;
        self.store.credit_reserve(reserve_reward.as_signed())?;
        delegate_rewards += reserve_reward.as_signed();
        tracing::debug!(
            account = %self.config.reserve.address,
            reward = %reserve_reward,
            "reserve allocation"
        );

        for account in &self.config.fee_accounts {
            let reward = block.block_reward.percent_floor(account.rate);
            self.store.credit_fee_account(&account.address, reward)?;
            delegate_rewards += reward.as_signed();
            tracing::debug!(account = %account.address, reward = %reward, "fee account allocation");
        }

        // Voter side. With zero total weight nothing is owed to voters and
        // the loop below never credits anyone.
        for (address, weight) in weights {
            voters_processed += 1;
            if weight.is_zero() || total_weight.is_zero() {
                continue;
            }

            let share_weight = weight.raw() as f64 / total_weight.raw() as f64;
            let db_share = self.store.share_rate(address)?;
            let reward = voter_reward(block.block_reward, share_weight, db_share);

            if db_share != self.config.voter_share {
                // Custom rate: the gap against the standard rate is routed
                // to the reserve. A rate above standard makes the remainder
                // negative — a debit the reserve must absorb.
                let standard =
                    voter_reward(block.block_reward, share_weight, self.config.voter_share);
                let remainder = standard.as_signed() - reward.as_signed();
                self.store.credit_reserve(remainder)?;
                delegate_rewards += remainder;
                tracing::debug!(
                    voter = %address,
                    rate = db_share,
                    remainder = %remainder,
                    "custom share remainder routed to reserve"
                );
            }

            if !reward.is_zero() {
                self.store.credit_unpaid(address, reward)?;
            }
            voter_rewards += reward;
        }

        self.store.mark_block_processed(block.height)?;

        let total_reward = block.total_reward();
        let summary = AllocationSummary {
            height: block.height,
            voters_processed,
            voter_rewards,
            delegate_rewards,
            total_reward,
            truncation_loss: total_reward.as_signed() - voter_rewards.as_signed()
                - delegate_rewards,
            approval_raw: self.store.total_checkpoint_balance()?,
            approval_weighted: total_weight,
        };
        tracing::info!(
            height = summary.height,
            voters = summary.voters_processed,
            voter_rewards = %summary.voter_rewards,
            delegate_rewards = %summary.delegate_rewards,
            truncation_loss = %summary.truncation_loss,
            "block allocated"
        );
        Ok(summary)
    }
}

/// `floor(share_weight × rate/100 × block_reward)` — the one place a float
/// ratio turns into money, floored immediately.
fn voter_reward(block_reward: Amount, share_weight: f64, rate: u8) -> Amount {
    block_reward.ratio_floor(share_weight * f64::from(rate) / 100.0)
}
