//! Settlement of staged payments.
//!
//! One run drains as many staged rows as the provider limits allow:
//! build signed transactions, broadcast them in one call, then reconcile
//! each against the accepted ids. A row reaches `Processed` only after the
//! ledger explicitly accepted the transaction that carries it; everything
//! else drops back to `Staged` and retries whole next cycle.

use crate::{EngineError, FeeSchedule, TransactionSigner};
use tbw_ledger::{ExchangeProvider, LedgerBroadcast, LedgerSource};
use tbw_store::{PaymentStore, StagedPayment};
use tbw_types::{Amount, DelegateConfig, Recipient, SettlementTransaction};

/// What one settlement run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettlementReport {
    pub transactions_built: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub rows_settled: usize,
    pub amount_settled: Amount,
    /// Rows still awaiting settlement after this run.
    pub rows_remaining: u64,
}

/// Drives one broadcast-and-reconcile run over the staged payment table.
pub struct SettlementEngine<'a, S, L, X>
where
    S: PaymentStore,
    L: LedgerSource + LedgerBroadcast,
    X: ExchangeProvider,
{
    store: &'a S,
    ledger: &'a L,
    exchange: &'a X,
    config: &'a DelegateConfig,
    signer: &'a TransactionSigner,
    fees: FeeSchedule,
}

impl<'a, S, L, X> SettlementEngine<'a, S, L, X>
where
    S: PaymentStore,
    L: LedgerSource + LedgerBroadcast,
    X: ExchangeProvider,
{
    pub fn new(
        store: &'a S,
        ledger: &'a L,
        exchange: &'a X,
        config: &'a DelegateConfig,
        signer: &'a TransactionSigner,
    ) -> Self {
        Self {
            store,
            ledger,
            exchange,
            config,
            signer,
            fees: FeeSchedule::new(&config.fees),
        }
    }

    /// Run one settlement pass. Returns without broadcasting when nothing
    /// is staged.
    pub fn settle(&self) -> Result<SettlementReport, EngineError> {
        let limit = if self.config.batched {
            self.fees.batch_limit() * self.fees.request_limit()
        } else {
            self.fees.request_limit()
        };
        let rows = self.store.staged_rows(limit)?;
        if rows.is_empty() {
            return Ok(SettlementReport {
                rows_remaining: self.store.staged_count()?,
                ..SettlementReport::default()
            });
        }

        // One nonce fetch per run; every built transaction takes the next
        // sequential value.
        let mut nonce = self.ledger.nonce(self.signer.address())?;
        let mut built: Vec<(SettlementTransaction, Vec<u64>)> = Vec::new();

        if self.config.batched {
            for chunk in rows.chunks(self.fees.batch_limit()) {
                nonce += 1;
                built.push((self.build_batch(nonce, chunk), ids_of(chunk)));
            }
        } else {
            for row in &rows {
                nonce += 1;
                built.push((self.build_single(nonce, row), vec![row.id]));
            }
        }

        let all_ids = ids_of(&rows);
        self.store.mark_processing(&all_ids)?;
        for (tx, ids) in &built {
            self.store.record_transaction(&tx.id, ids)?;
        }

        let transactions: Vec<SettlementTransaction> =
            built.iter().map(|(tx, _)| tx.clone()).collect();
        let accepted_ids = match self.ledger.submit(&transactions) {
            Ok(ids) => ids,
            Err(e) => {
                // Transport fault: nothing was accepted. Unwind the run so
                // every row retries next cycle.
                for (tx, _) in &built {
                    self.store.delete_transaction(&tx.id)?;
                }
                self.store.release_processing(&all_ids)?;
                return Err(e.into());
            }
        };

        let mut report = SettlementReport {
            transactions_built: built.len(),
            ..SettlementReport::default()
        };
        for (tx, ids) in &built {
            if accepted_ids.contains(&tx.id) {
                self.store.mark_processed(ids)?;
                report.accepted += 1;
                report.rows_settled += ids.len();
                report.amount_settled += tx.total_amount();
                tracing::info!(
                    delegate = %self.config.name,
                    txid = %tx.id,
                    rows = ids.len(),
                    amount = %tx.total_amount(),
                    "settlement accepted"
                );
            } else {
                self.store.delete_transaction(&tx.id)?;
                self.store.release_processing(ids)?;
                report.rejected += 1;
                tracing::warn!(
                    delegate = %self.config.name,
                    txid = %tx.id,
                    rows = ids.len(),
                    "settlement rejected, rows re-staged"
                );
            }
        }
        report.rows_remaining = self.store.staged_count()?;
        Ok(report)
    }

    fn build_batch(&self, nonce: u64, rows: &[StagedPayment]) -> SettlementTransaction {
        let recipients: Vec<Recipient> = rows
            .iter()
            .map(|r| Recipient {
                address: r.recipient.clone(),
                amount: r.amount,
            })
            .collect();
        // A leftover chunk of one is an ordinary transfer, fee included.
        let fee = if recipients.len() == 1 {
            self.fees.single()
        } else {
            self.fees.batch(recipients.len())
        };
        self.signer.build(nonce, recipients, fee, &self.config.message)
    }

    fn build_single(&self, nonce: u64, row: &StagedPayment) -> SettlementTransaction {
        // Exchange redirection applies to single transfers only. The quote
        // is infallible: on any provider failure the payment proceeds to
        // the original recipient.
        let address = match self.config.exchange_route_for(&row.recipient) {
            Some(route) => self.exchange.quote(route, row.amount, &row.recipient),
            None => row.recipient.clone(),
        };
        self.signer.build(
            nonce,
            vec![Recipient {
                address,
                amount: row.amount,
            }],
            self.fees.single(),
            &row.message,
        )
    }
}

fn ids_of(rows: &[StagedPayment]) -> Vec<u64> {
    rows.iter().map(|r| r.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeExchange, FakeLedger};
    use tbw_store::{NewPayment, PaymentStatus, StagingBatch, StoreError};
    use tbw_store_memory::MemoryStore;
    use tbw_types::{Address, ExchangeRoute, FeeAccount, FeeSettings, NetworkId};

    fn addr(n: u8) -> Address {
        Address::new(format!("D{n:0>40}"))
    }

    fn config() -> DelegateConfig {
        DelegateConfig {
            name: "testdelegate".into(),
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
            interval: 10,
            batched: false,
            reserve: FeeAccount {
                address: addr(200),
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

    fn stage_rows(store: &MemoryStore, amounts: &[(u8, u64)]) -> Vec<u64> {
        let batch = StagingBatch {
            rows: amounts
                .iter()
                .map(|(n, amount)| NewPayment {
                    recipient: addr(*n),
                    amount: Amount::new(*amount),
                    message: "Reward".to_string(),
                })
                .collect(),
            voter_settlements: vec![],
            delegate_settlements: vec![],
        };
        store.stage(&batch).unwrap()
    }

    fn signer() -> TransactionSigner {
        TransactionSigner::from_config(&config()).unwrap()
    }

    #[test]
    fn test_single_mode_settles_accepted_rows() {
        let store = MemoryStore::new();
        let ids = stage_rows(&store, &[(1, 100), (2, 50)]);
        let ledger = FakeLedger::default();
        *ledger.nonce.borrow_mut() = 5;
        let exchange = FakeExchange::default();
        let cfg = config();
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        let report = engine.settle().unwrap();
        assert_eq!(report.transactions_built, 2);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected, 0);
        assert_eq!(report.rows_settled, 2);
        assert_eq!(report.amount_settled, Amount::new(150));
        assert_eq!(report.rows_remaining, 0);

        let submitted = ledger.submitted.borrow();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].nonce, 6);
        assert_eq!(submitted[1].nonce, 7);
        drop(submitted);

        for id in ids {
            assert_eq!(
                store.payment_row(id).unwrap().unwrap().status,
                PaymentStatus::Processed
            );
        }
    }

    #[test]
    fn test_rejected_transaction_restages_its_rows() {
        let store = MemoryStore::new();
        let ids = stage_rows(&store, &[(1, 100), (2, 50)]);
        let ledger = FakeLedger::default();
        let exchange = FakeExchange::default();
        let cfg = config();
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        // Accept only the first transaction the run will build.
        let first_id = s
            .build(
                1,
                vec![Recipient {
                    address: addr(1),
                    amount: Amount::new(100),
                }],
                Amount::new(10),
                "Reward",
            )
            .id;
        *ledger.accept.borrow_mut() = Some(vec![first_id.clone()]);

        let report = engine.settle().unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.rows_remaining, 1);

        assert_eq!(
            store.payment_row(ids[0]).unwrap().unwrap().status,
            PaymentStatus::Processed
        );
        assert_eq!(
            store.payment_row(ids[1]).unwrap().unwrap().status,
            PaymentStatus::Staged
        );
        // The rejected transaction's record is gone, the accepted one kept.
        assert_eq!(store.transaction_rows(&first_id).unwrap(), vec![ids[0]]);
        let second_id = ledger.submitted.borrow()[1].id.clone();
        assert!(matches!(
            store.transaction_rows(&second_id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_transport_failure_releases_everything() {
        let store = MemoryStore::new();
        let ids = stage_rows(&store, &[(1, 100)]);
        let ledger = FakeLedger::default();
        *ledger.fail_submit.borrow_mut() = true;
        let exchange = FakeExchange::default();
        let cfg = config();
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        let err = engine.settle().unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(
            store.payment_row(ids[0]).unwrap().unwrap().status,
            PaymentStatus::Staged
        );
    }

    #[test]
    fn test_batched_chunking_and_fees() {
        let store = MemoryStore::new();
        stage_rows(&store, &[(1, 10), (2, 10), (3, 10), (4, 10), (5, 10), (6, 10)]);
        let ledger = FakeLedger::default();
        let exchange = FakeExchange::default();
        let mut cfg = config();
        cfg.batched = true;
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        let report = engine.settle().unwrap();
        assert_eq!(report.transactions_built, 2);

        let submitted = ledger.submitted.borrow();
        assert_eq!(submitted[0].recipients.len(), 4);
        assert_eq!(submitted[0].fee, Amount::new(28));
        assert_eq!(submitted[1].recipients.len(), 2);
        assert_eq!(submitted[1].fee, Amount::new(24));
    }

    #[test]
    fn test_batched_leftover_of_one_is_a_single_transfer() {
        let store = MemoryStore::new();
        stage_rows(&store, &[(1, 10), (2, 10), (3, 10), (4, 10), (5, 10)]);
        let ledger = FakeLedger::default();
        let exchange = FakeExchange::default();
        let mut cfg = config();
        cfg.batched = true;
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        engine.settle().unwrap();
        let submitted = ledger.submitted.borrow();
        assert_eq!(submitted[1].recipients.len(), 1);
        assert_eq!(submitted[1].fee, Amount::new(10));
    }

    #[test]
    fn test_request_limit_leaves_leftovers_staged() {
        let store = MemoryStore::new();
        stage_rows(&store, &[(1, 10), (2, 10), (3, 10)]);
        let ledger = FakeLedger::default();
        let exchange = FakeExchange::default();
        let mut cfg = config();
        cfg.fees.request_limit = 2;
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        let report = engine.settle().unwrap();
        assert_eq!(report.transactions_built, 2);
        assert_eq!(report.rows_remaining, 1);

        // The leftover settles on the next run.
        let report = engine.settle().unwrap();
        assert_eq!(report.rows_settled, 1);
        assert_eq!(report.rows_remaining, 0);
    }

    #[test]
    fn test_settle_with_nothing_staged_is_a_no_op() {
        let store = MemoryStore::new();
        let ledger = FakeLedger::default();
        let exchange = FakeExchange::default();
        let cfg = config();
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        let report = engine.settle().unwrap();
        assert_eq!(report, SettlementReport::default());
        assert!(ledger.submitted.borrow().is_empty());
    }

    #[test]
    fn test_exchange_redirection_in_single_mode() {
        let store = MemoryStore::new();
        stage_rows(&store, &[(1, 100)]);
        let ledger = FakeLedger::default();
        let exchange = FakeExchange {
            deposit: Some(addr(99)),
            ..FakeExchange::default()
        };
        let mut cfg = config();
        cfg.exchange_routes.push(ExchangeRoute {
            recipient: addr(1),
            from_currency: "ark".into(),
            to_currency: "btc".into(),
            deposit_to: addr(98),
            provider_url: "http://provider.test/quote".into(),
        });
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        engine.settle().unwrap();
        let submitted = ledger.submitted.borrow();
        assert_eq!(submitted[0].recipients[0].address, addr(99));
        assert_eq!(exchange.quoted.borrow().len(), 1);
    }

    #[test]
    fn test_exchange_failure_pays_original_recipient() {
        let store = MemoryStore::new();
        stage_rows(&store, &[(1, 100)]);
        let ledger = FakeLedger::default();
        let exchange = FakeExchange {
            deposit: Some(addr(99)),
            fail: true,
            ..FakeExchange::default()
        };
        let mut cfg = config();
        cfg.exchange_routes.push(ExchangeRoute {
            recipient: addr(1),
            from_currency: "ark".into(),
            to_currency: "btc".into(),
            deposit_to: addr(98),
            provider_url: "http://provider.test/quote".into(),
        });
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        engine.settle().unwrap();
        assert_eq!(
            ledger.submitted.borrow()[0].recipients[0].address,
            addr(1)
        );
    }

    #[test]
    fn test_settled_rows_are_not_resettled() {
        let store = MemoryStore::new();
        stage_rows(&store, &[(1, 100)]);
        let ledger = FakeLedger::default();
        let exchange = FakeExchange::default();
        let cfg = config();
        let s = signer();
        let engine = SettlementEngine::new(&store, &ledger, &exchange, &cfg, &s);

        engine.settle().unwrap();
        let report = engine.settle().unwrap();
        assert_eq!(report.transactions_built, 0);
        assert_eq!(ledger.submitted.borrow().len(), 1);
    }
}
