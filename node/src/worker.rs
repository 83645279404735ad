//! The per-delegate processing loop.
//!
//! One worker per configured delegate, each exclusively owning its store.
//! Within a worker everything is strictly sequential: sync forged blocks,
//! process the backlog block by block (roll, reconcile, eligibility,
//! allocate), then stage on the payout interval and settle whatever is
//! staged. Cycles repeat on a fixed poll interval; an unhandled cycle
//! error logs, backs off, and retries, and never terminates the worker.

use std::time::Duration;

use tbw_engine::{
    BalanceReconciler, BlockIntake, EligibilityPipeline, EngineError, PaymentStager,
    RewardAllocator, SettlementEngine, TransactionSigner, VoterRollBuilder,
};
use tbw_ledger::{ExchangeProvider, LedgerBroadcast, LedgerSource};
use tbw_store::DelegateStore;
use tbw_types::{DelegateConfig, Timestamp};

use crate::NodeError;

/// What one processing cycle accomplished.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Blocks imported and marked on first-run initialization.
    pub initialized: u64,
    pub blocks_allocated: usize,
    pub rows_staged: usize,
    pub rows_settled: usize,
    pub rows_remaining: u64,
}

/// A delegate's payout worker: owns the store, the ledger collaborators,
/// and the signing key for one delegate.
pub struct DelegateWorker<S, L, X>
where
    S: DelegateStore,
    L: LedgerSource + LedgerBroadcast,
    X: ExchangeProvider,
{
    config: DelegateConfig,
    store: S,
    ledger: L,
    exchange: X,
    signer: TransactionSigner,
}

impl<S, L, X> DelegateWorker<S, L, X>
where
    S: DelegateStore,
    L: LedgerSource + LedgerBroadcast,
    X: ExchangeProvider,
{
    pub fn new(config: DelegateConfig, store: S, ledger: L, exchange: X) -> Result<Self, NodeError> {
        config.validate().map_err(EngineError::from)?;
        let signer = TransactionSigner::from_config(&config)?;
        Ok(Self {
            config,
            store,
            ledger,
            exchange,
            signer,
        })
    }

    /// Run cycles until the process is shut down.
    pub async fn run(self) {
        loop {
            // Cycles do blocking HTTP, so move them off the async reactor.
            match tokio::task::block_in_place(|| self.cycle()) {
                Ok(summary) => {
                    tracing::info!(
                        delegate = %self.config.name,
                        blocks = summary.blocks_allocated,
                        staged = summary.rows_staged,
                        settled = summary.rows_settled,
                        remaining = summary.rows_remaining,
                        "cycle complete"
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                }
                Err(e) => {
                    tracing::error!(
                        delegate = %self.config.name,
                        error = %e,
                        backoff_secs = self.config.error_backoff_secs,
                        "cycle failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.error_backoff_secs)).await;
                }
            }
        }
    }

    /// One full processing cycle.
    pub fn cycle(&self) -> Result<CycleSummary, NodeError> {
        let mut summary = CycleSummary::default();

        self.store.init_delegate_accounts(
            &self.config.reserve.address,
            &self
                .config
                .fee_accounts
                .iter()
                .map(|a| a.address.clone())
                .collect::<Vec<_>>(),
        )?;

        let intake = BlockIntake::new(&self.ledger, &self.store);
        if self.store.last_block()?.is_none() {
            // First run: import history so blocks at or below start_height
            // are never retro-paid.
            summary.initialized = intake.initialize(self.config.start_height)?;
        }
        let backlog = intake.sync()?;
        let processed_before = self.store.processed_count()?;

        if !backlog.is_empty() {
            let (votes, unvotes) = self.ledger.votes(Timestamp::EPOCH)?;
            let roll_builder = VoterRollBuilder::new(
                &self.store,
                self.config.network,
                self.config.voter_share,
            );
            let reconciler = BalanceReconciler::new(&self.ledger, &self.store);
            let pipeline = EligibilityPipeline::new(&self.store, &self.config);
            let allocator = RewardAllocator::new(&self.store, &self.config);

            for block in &backlog {
                let roll = roll_builder.build(&votes, &unvotes, block.timestamp)?;
                let balances = reconciler.reconcile(block, &roll)?;
                let weights = pipeline.apply(balances)?;
                allocator.allocate(block, &weights)?;
                summary.blocks_allocated += 1;
            }
        }

        let stager = PaymentStager::new(&self.store, &self.config);
        let processed_after = self.store.processed_count()?;
        if let Some(trigger) = stager.trigger_for(processed_before, processed_after) {
            match stager.stage(trigger) {
                Ok(Some(outcome)) => summary.rows_staged = outcome.row_ids.len(),
                Ok(None) => {}
                Err(e @ EngineError::InsufficientReserve { .. }) => {
                    // Recoverable: skip this staging run, retry next interval.
                    tracing::warn!(delegate = %self.config.name, error = %e, "staging skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let report = SettlementEngine::new(
            &self.store,
            &self.ledger,
            &self.exchange,
            &self.config,
            &self.signer,
        )
        .settle()?;
        summary.rows_settled = report.rows_settled;
        summary.rows_remaining = report.rows_remaining;

        Ok(summary)
    }

    pub fn config(&self) -> &DelegateConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tbw_ledger::{BalanceDelta, LedgerError};
    use tbw_store::{PaymentStore, VoterStore};
    use tbw_store_memory::MemoryStore;
    use tbw_types::{
        Address, Amount, ExchangeRoute, FeeAccount, FeeSettings, ForgedBlock, NetworkId,
        PublicKey, SettlementTransaction, TxId, UnvoteEvent, VoteEvent,
    };

    /// Minimal scripted ledger: one voter, a fixed balance credit, and a
    /// configurable set of forged blocks. Accepts every submission.
    #[derive(Default)]
    struct ScriptedLedger {
        votes: Vec<VoteEvent>,
        unvotes: Vec<UnvoteEvent>,
        credits: Vec<(Address, Amount)>,
        blocks: RefCell<Vec<ForgedBlock>>,
        submitted: RefCell<Vec<SettlementTransaction>>,
        fail_votes: bool,
    }

    impl LedgerSource for ScriptedLedger {
        fn votes(
            &self,
            _since: Timestamp,
        ) -> Result<(Vec<VoteEvent>, Vec<UnvoteEvent>), LedgerError> {
            if self.fail_votes {
                return Err(LedgerError::Transport("relay unreachable".into()));
            }
            Ok((self.votes.clone(), self.unvotes.clone()))
        }

        fn balance_delta(
            &self,
            address: &Address,
            _up_to: Timestamp,
            since: Timestamp,
        ) -> Result<BalanceDelta, LedgerError> {
            // Credits land at the epoch, so they only show up on a full
            // replay; incremental windows see no activity.
            if !since.is_epoch() {
                return Ok(BalanceDelta::default());
            }
            Ok(BalanceDelta {
                debit: Amount::ZERO,
                credit: self
                    .credits
                    .iter()
                    .filter(|(a, _)| a == address)
                    .map(|(_, amount)| *amount)
                    .sum(),
            })
        }

        fn block_rewards(
            &self,
            _address: &Address,
            _up_to: Timestamp,
            _since: Timestamp,
        ) -> Result<Amount, LedgerError> {
            Ok(Amount::ZERO)
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
            Ok(0)
        }
    }

    impl LedgerBroadcast for ScriptedLedger {
        fn submit(
            &self,
            transactions: &[SettlementTransaction],
        ) -> Result<Vec<TxId>, LedgerError> {
            self.submitted
                .borrow_mut()
                .extend(transactions.iter().cloned());
            Ok(transactions.iter().map(|t| t.id.clone()).collect())
        }
    }

    struct NoExchange;

    impl ExchangeProvider for NoExchange {
        fn quote(&self, _route: &ExchangeRoute, _amount: Amount, refund: &Address) -> Address {
            refund.clone()
        }
    }

    fn config() -> DelegateConfig {
        DelegateConfig {
            name: "genesis_1".into(),
            network: NetworkId::Dev,
            atomic: 100_000_000,
            relay_url: "http://127.0.0.1:4003/api".into(),
            start_height: 0,
            message: "Reward".into(),
            voter_share: 90,
            voter_cap: 0,
            voter_min: 0,
            whitelist_enabled: false,
            whitelist: Default::default(),
            blacklist_enabled: false,
            blacklist: Default::default(),
            interval: 1,
            batched: false,
            reserve: FeeAccount {
                address: Address::new(format!("D{:0>40}", 200)),
                rate: 10,
            },
            fee_accounts: vec![],
            signing_seed: "11".repeat(32),
            donation: None,
            exchange_routes: vec![],
            fees: FeeSettings {
                single: 10,
                multi_base: 20,
                multi_per_payment: 2,
                batch_limit: 4,
                request_limit: 8,
            },
            poll_interval_secs: 1200,
            error_backoff_secs: 300,
            manual_pay: false,
        }
    }

    fn voter_key() -> PublicKey {
        PublicKey::new("aa".repeat(32))
    }

    fn voter_address() -> Address {
        Address::from_public_key(&voter_key(), NetworkId::Dev).unwrap()
    }

    fn ledger_with_one_voter() -> ScriptedLedger {
        ScriptedLedger {
            votes: vec![VoteEvent {
                voter_public_key: voter_key(),
                timestamp: Timestamp::new(5),
            }],
            credits: vec![(voter_address(), Amount::new(100))],
            blocks: RefCell::new(vec![ForgedBlock::new(
                1,
                Timestamp::new(10),
                Amount::new(1000),
                Amount::new(10),
            )]),
            ..ScriptedLedger::default()
        }
    }

    #[test]
    fn test_cycle_processes_stages_and_settles() {
        let worker =
            DelegateWorker::new(config(), MemoryStore::new(), ledger_with_one_voter(), NoExchange)
                .unwrap();
        let summary = worker.cycle().unwrap();

        assert_eq!(summary.blocks_allocated, 1);
        // Reserve row + one voter row.
        assert_eq!(summary.rows_staged, 2);
        assert_eq!(summary.rows_settled, 2);
        assert_eq!(summary.rows_remaining, 0);

        // voter: 90% of 1000; reserve: 10% of 1000 + 10 fee pool, minus
        // 2 × 10 settlement fees.
        let voter = worker.store().voter(&voter_address()).unwrap().unwrap();
        assert_eq!(voter.total_paid, Amount::new(900));
        let submitted = worker.ledger.submitted.borrow();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].recipients[0].amount, Amount::new(90));
        assert_eq!(submitted[1].recipients[0].amount, Amount::new(900));
    }

    #[test]
    fn test_unvote_after_block_still_pays_that_block() {
        // The unvote postdates the forged block; the voter was actively
        // voting when it was forged and keeps its share.
        let mut ledger = ledger_with_one_voter();
        ledger.unvotes = vec![UnvoteEvent {
            voter_public_key: voter_key(),
            timestamp: Timestamp::new(20),
        }];
        let worker = DelegateWorker::new(config(), MemoryStore::new(), ledger, NoExchange).unwrap();
        let summary = worker.cycle().unwrap();

        assert_eq!(summary.blocks_allocated, 1);
        let voter = worker.store().voter(&voter_address()).unwrap().unwrap();
        assert_eq!(voter.total_paid, Amount::new(900));
    }

    #[test]
    fn test_backlog_crossing_interval_still_pays() {
        // Three blocks land in one cycle with interval 2: the processed
        // count jumps 0 → 3 past the boundary without touching a multiple.
        let mut cfg = config();
        cfg.interval = 2;
        let ledger = ledger_with_one_voter();
        ledger.blocks.borrow_mut().extend([
            ForgedBlock::new(2, Timestamp::new(11), Amount::new(1000), Amount::new(10)),
            ForgedBlock::new(3, Timestamp::new(12), Amount::new(1000), Amount::new(10)),
        ]);
        let worker = DelegateWorker::new(cfg, MemoryStore::new(), ledger, NoExchange).unwrap();
        let summary = worker.cycle().unwrap();

        assert_eq!(summary.blocks_allocated, 3);
        assert_eq!(summary.rows_staged, 2);
        let voter = worker.store().voter(&voter_address()).unwrap().unwrap();
        assert_eq!(voter.total_paid, Amount::new(2700));
    }

    #[test]
    fn test_ledger_failure_aborts_cycle_with_error() {
        let mut ledger = ledger_with_one_voter();
        ledger.fail_votes = true;
        let worker = DelegateWorker::new(config(), MemoryStore::new(), ledger, NoExchange).unwrap();
        assert!(matches!(worker.cycle(), Err(NodeError::Ledger(_))));
    }

    #[test]
    fn test_cycle_is_idempotent_without_new_blocks() {
        let worker =
            DelegateWorker::new(config(), MemoryStore::new(), ledger_with_one_voter(), NoExchange)
                .unwrap();
        worker.cycle().unwrap();
        let summary = worker.cycle().unwrap();

        assert_eq!(summary.blocks_allocated, 0);
        assert_eq!(summary.rows_staged, 0);
        assert_eq!(summary.rows_settled, 0);
        assert_eq!(worker.ledger.submitted.borrow().len(), 2);
    }

    #[test]
    fn test_start_height_suppresses_retro_payment() {
        let mut cfg = config();
        cfg.start_height = 1;
        let worker =
            DelegateWorker::new(cfg, MemoryStore::new(), ledger_with_one_voter(), NoExchange)
                .unwrap();
        let summary = worker.cycle().unwrap();

        assert_eq!(summary.initialized, 1);
        assert_eq!(summary.blocks_allocated, 0);
        // Initialization marks are counted before the cycle's interval
        // window, so they never trigger a payout on their own.
        assert_eq!(summary.rows_staged, 0);
    }

    #[test]
    fn test_insufficient_reserve_skips_staging_not_cycle() {
        // Reserve rate 0 and no fee pool: staging fees can never be
        // covered, but the cycle still succeeds.
        let mut cfg = config();
        cfg.reserve.rate = 0;
        let ledger = ledger_with_one_voter();
        ledger.blocks.borrow_mut()[0] = ForgedBlock::new(
            1,
            Timestamp::new(10),
            Amount::new(1000),
            Amount::ZERO,
        );
        let worker = DelegateWorker::new(cfg, MemoryStore::new(), ledger, NoExchange).unwrap();
        let summary = worker.cycle().unwrap();

        assert_eq!(summary.blocks_allocated, 1);
        assert_eq!(summary.rows_staged, 0);
        assert_eq!(worker.store().staged_count().unwrap(), 0);
        // The voter's reward stays unpaid for the next interval.
        let voter = worker.store().voter(&voter_address()).unwrap().unwrap();
        assert_eq!(voter.unpaid, Amount::new(900));
    }
}
