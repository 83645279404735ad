//! In-memory backend for the TBW storage traits.
//!
//! The reference implementation of the storage contract: every trait method
//! holds the single interior lock for its whole duration, so each call is
//! atomic exactly the way a backend transaction would be. A store opened
//! with [`MemoryStore::open`] additionally snapshots its whole state to a
//! JSON file after every mutation (written to a temp file and renamed, so
//! the snapshot is never half-written), which is how the daemon keeps
//! delegate state across restarts and lets the share-rate subcommands
//! operate on real data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tbw_store::{
    BalanceCheckpoint, BlockStore, CheckpointStore, DelegateBalances, NewPayment, PaymentStatus,
    PaymentStore, RewardStore, StagedPayment, StagingBatch, StoreError, VoterRecord, VoterStore,
};
use tbw_types::{Address, Amount, ForgedBlock, PublicKey, SignedAmount, Timestamp, TxId};

#[derive(Default, Serialize, Deserialize)]
struct Inner {
    blocks: BTreeMap<u64, ForgedBlock>,
    voters: BTreeMap<Address, VoterRecord>,
    checkpoints: BTreeMap<Address, BalanceCheckpoint>,
    reserve: Option<(Address, SignedAmount)>,
    fee_accounts: Vec<(Address, Amount)>,
    payments: BTreeMap<u64, StagedPayment>,
    next_row_id: u64,
    transactions: BTreeMap<TxId, Vec<u64>>,
}

/// Exclusively-owned in-memory delegate store, optionally backed by a
/// JSON snapshot file.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// A purely in-memory store; state is gone when it is dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a snapshot-backed store. An existing snapshot is loaded; a
    /// missing file starts empty and is created on the first mutation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::Backend(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| StoreError::Corruption(format!("snapshot {}: {e}", path.display())))?
        } else {
            Inner::default()
        };
        Ok(Self {
            inner: Mutex::new(inner),
            path: Some(path),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panicked writer; the store owns no
        // invariant that survives that, so propagate the panic.
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Write the snapshot, if this store has one. Called with the lock held
    /// so the file always reflects a single consistent state.
    fn flush(&self, inner: &Inner) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string(inner)
            .map_err(|e| StoreError::Backend(format!("encode snapshot: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)
            .map_err(|e| StoreError::Backend(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| StoreError::Backend(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }
}

impl BlockStore for MemoryStore {
    fn put_blocks(&self, blocks: &[ForgedBlock]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for block in blocks {
            inner.blocks.entry(block.height).or_insert_with(|| block.clone());
        }
        self.flush(&inner)?;
        Ok(())
    }

    fn last_block(&self) -> Result<Option<ForgedBlock>, StoreError> {
        Ok(self.lock().blocks.values().next_back().cloned())
    }

    fn unprocessed_blocks(&self) -> Result<Vec<ForgedBlock>, StoreError> {
        Ok(self
            .lock()
            .blocks
            .values()
            .filter(|b| !b.processed)
            .cloned()
            .collect())
    }

    fn mark_block_processed(&self, height: u64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let block = inner
            .blocks
            .get_mut(&height)
            .ok_or_else(|| StoreError::NotFound(format!("block {height}")))?;
        if block.processed {
            return Err(StoreError::Duplicate(format!(
                "block {height} already processed"
            )));
        }
        block.processed = true;
        self.flush(&inner)?;
        Ok(())
    }

    fn mark_processed_up_to(&self, height: u64) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut marked = 0;
        for block in inner.blocks.values_mut() {
            if block.height <= height && !block.processed {
                block.processed = true;
                marked += 1;
            }
        }
        self.flush(&inner)?;
        Ok(marked)
    }

    fn processed_count(&self) -> Result<u64, StoreError> {
        Ok(self.lock().blocks.values().filter(|b| b.processed).count() as u64)
    }
}

impl VoterStore for MemoryStore {
    fn register_voter(
        &self,
        address: &Address,
        public_key: &PublicKey,
        share_rate: u8,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.voters.contains_key(address) {
            return Ok(false);
        }
        inner.voters.insert(
            address.clone(),
            VoterRecord {
                address: address.clone(),
                public_key: public_key.clone(),
                share_rate,
                unpaid: Amount::ZERO,
                total_paid: Amount::ZERO,
            },
        );
        self.flush(&inner)?;
        Ok(true)
    }

    fn voter(&self, address: &Address) -> Result<Option<VoterRecord>, StoreError> {
        Ok(self.lock().voters.get(address).cloned())
    }

    fn share_rate(&self, address: &Address) -> Result<u8, StoreError> {
        self.lock()
            .voters
            .get(address)
            .map(|v| v.share_rate)
            .ok_or_else(|| StoreError::NotFound(format!("voter {address}")))
    }

    fn set_share_rate(&self, address: &Address, rate: u8) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let voter = inner
            .voters
            .get_mut(address)
            .ok_or_else(|| StoreError::NotFound(format!("voter {address}")))?;
        voter.share_rate = rate;
        self.flush(&inner)?;
        Ok(())
    }

    fn migrate_share_rate(&self, old_rate: u8, new_rate: u8) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut updated = 0;
        for voter in inner.voters.values_mut() {
            if voter.share_rate == old_rate {
                voter.share_rate = new_rate;
                updated += 1;
            }
        }
        self.flush(&inner)?;
        Ok(updated)
    }

    fn all_voters(&self) -> Result<Vec<VoterRecord>, StoreError> {
        Ok(self.lock().voters.values().cloned().collect())
    }

    fn voters_with_unpaid(&self) -> Result<Vec<VoterRecord>, StoreError> {
        Ok(self
            .lock()
            .voters
            .values()
            .filter(|v| !v.unpaid.is_zero())
            .cloned()
            .collect())
    }

    fn credit_unpaid(&self, address: &Address, amount: Amount) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let voter = inner
            .voters
            .get_mut(address)
            .ok_or_else(|| StoreError::NotFound(format!("voter {address}")))?;
        voter.unpaid = voter
            .unpaid
            .checked_add(amount)
            .ok_or_else(|| StoreError::Corruption(format!("unpaid overflow for {address}")))?;
        self.flush(&inner)?;
        Ok(())
    }
}

impl CheckpointStore for MemoryStore {
    fn checkpoint(&self, address: &Address) -> Result<Option<BalanceCheckpoint>, StoreError> {
        Ok(self.lock().checkpoints.get(address).cloned())
    }

    fn put_checkpoints(
        &self,
        balances: &BTreeMap<Address, Amount>,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        // Validate the whole batch first so a regression leaves nothing
        // half-written.
        for address in balances.keys() {
            if let Some(existing) = inner.checkpoints.get(address) {
                if existing.checkpoint_timestamp > at {
                    return Err(StoreError::CheckpointRegression {
                        address: address.to_string(),
                        stored: existing.checkpoint_timestamp.as_secs(),
                        attempted: at.as_secs(),
                    });
                }
            }
        }
        for (address, balance) in balances {
            inner.checkpoints.insert(
                address.clone(),
                BalanceCheckpoint {
                    address: address.clone(),
                    balance: *balance,
                    checkpoint_timestamp: at,
                },
            );
        }
        self.flush(&inner)?;
        Ok(())
    }

    fn total_checkpoint_balance(&self) -> Result<Amount, StoreError> {
        Ok(self.lock().checkpoints.values().map(|c| c.balance).sum())
    }
}

impl RewardStore for MemoryStore {
    fn init_delegate_accounts(
        &self,
        reserve: &Address,
        extra: &[Address],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.reserve.is_none() {
            inner.reserve = Some((reserve.clone(), SignedAmount::ZERO));
        }
        for address in extra {
            if !inner.fee_accounts.iter().any(|(a, _)| a == address) {
                inner.fee_accounts.push((address.clone(), Amount::ZERO));
            }
        }
        self.flush(&inner)?;
        Ok(())
    }

    fn credit_reserve(&self, delta: SignedAmount) -> Result<(), StoreError> {
        let mut inner = self.lock();
        match &mut inner.reserve {
            Some((_, balance)) => *balance += delta,
            None => return Err(StoreError::NotFound("reserve account".to_string())),
        }
        self.flush(&inner)?;
        Ok(())
    }

    fn credit_fee_account(&self, address: &Address, amount: Amount) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .fee_accounts
            .iter_mut()
            .find(|(a, _)| a == address)
            .ok_or_else(|| StoreError::NotFound(format!("fee account {address}")))?;
        entry.1 += amount;
        self.flush(&inner)?;
        Ok(())
    }

    fn delegate_balances(&self) -> Result<DelegateBalances, StoreError> {
        let inner = self.lock();
        let (reserve_address, reserve_unpaid) = inner
            .reserve
            .clone()
            .ok_or_else(|| StoreError::NotFound("reserve account".to_string()))?;
        Ok(DelegateBalances {
            reserve_address,
            reserve_unpaid,
            accounts: inner.fee_accounts.clone(),
        })
    }
}

impl PaymentStore for MemoryStore {
    fn stage(&self, batch: &StagingBatch) -> Result<Vec<u64>, StoreError> {
        let mut inner = self.lock();

        // Settle voter ledgers.
        for (address, amount) in &batch.voter_settlements {
            let voter = inner
                .voters
                .get_mut(address)
                .ok_or_else(|| StoreError::NotFound(format!("voter {address}")))?;
            voter.unpaid = Amount::ZERO;
            voter.total_paid += *amount;
        }

        // Settle delegate ledgers; the reserve resets even though its staged
        // amount is smaller than its unpaid balance (fees and donation make
        // up the difference).
        for (address, _amount) in &batch.delegate_settlements {
            if let Some((reserve_address, balance)) = &mut inner.reserve {
                if reserve_address == address {
                    *balance = SignedAmount::ZERO;
                    continue;
                }
            }
            if let Some(entry) = inner.fee_accounts.iter_mut().find(|(a, _)| a == address) {
                entry.1 = Amount::ZERO;
            }
        }

        // Insert rows.
        let mut ids = Vec::with_capacity(batch.rows.len());
        for NewPayment {
            recipient,
            amount,
            message,
        } in &batch.rows
        {
            let id = inner.next_row_id;
            inner.next_row_id += 1;
            inner.payments.insert(
                id,
                StagedPayment {
                    id,
                    recipient: recipient.clone(),
                    amount: *amount,
                    message: message.clone(),
                    status: PaymentStatus::Staged,
                },
            );
            ids.push(id);
        }
        self.flush(&inner)?;
        Ok(ids)
    }

    fn staged_rows(&self, limit: usize) -> Result<Vec<StagedPayment>, StoreError> {
        Ok(self
            .lock()
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Staged)
            .take(limit)
            .cloned()
            .collect())
    }

    fn staged_count(&self) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .payments
            .values()
            .filter(|p| p.status != PaymentStatus::Processed)
            .count() as u64)
    }

    fn payment_row(&self, id: u64) -> Result<Option<StagedPayment>, StoreError> {
        Ok(self.lock().payments.get(&id).cloned())
    }

    fn mark_processing(&self, ids: &[u64]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for id in ids {
            let row = inner
                .payments
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("payment row {id}")))?;
            if row.status == PaymentStatus::Staged {
                row.status = PaymentStatus::Processing;
            }
        }
        self.flush(&inner)?;
        Ok(())
    }

    fn release_processing(&self, ids: &[u64]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for id in ids {
            if let Some(row) = inner.payments.get_mut(id) {
                if row.status == PaymentStatus::Processing {
                    row.status = PaymentStatus::Staged;
                }
            }
        }
        self.flush(&inner)?;
        Ok(())
    }

    fn mark_processed(&self, ids: &[u64]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for id in ids {
            let row = inner
                .payments
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("payment row {id}")))?;
            row.status = PaymentStatus::Processed;
        }
        self.flush(&inner)?;
        Ok(())
    }

    fn delete_rows(&self, ids: &[u64]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for id in ids {
            inner.payments.remove(id);
        }
        self.flush(&inner)?;
        Ok(())
    }

    fn record_transaction(&self, txid: &TxId, row_ids: &[u64]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.transactions.insert(txid.clone(), row_ids.to_vec());
        self.flush(&inner)?;
        Ok(())
    }

    fn delete_transaction(&self, txid: &TxId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.transactions.remove(txid);
        self.flush(&inner)?;
        Ok(())
    }

    fn transaction_rows(&self, txid: &TxId) -> Result<Vec<u64>, StoreError> {
        self.lock()
            .transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transaction {txid}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new(format!("D{n:0>40}"))
    }

    fn key(n: u8) -> PublicKey {
        PublicKey::new(format!("{n:02x}"))
    }

    #[test]
    fn test_blocks_mark_processed_exactly_once() {
        let store = MemoryStore::new();
        let block = ForgedBlock::new(7, Timestamp::new(100), Amount::new(200), Amount::ZERO);
        store.put_blocks(&[block]).unwrap();
        store.mark_block_processed(7).unwrap();
        assert!(matches!(
            store.mark_block_processed(7),
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.processed_count().unwrap(), 1);
    }

    #[test]
    fn test_put_blocks_is_idempotent() {
        let store = MemoryStore::new();
        let block = ForgedBlock::new(7, Timestamp::new(100), Amount::new(200), Amount::ZERO);
        store.put_blocks(&[block.clone()]).unwrap();
        store.mark_block_processed(7).unwrap();
        // Re-observing the same height must not reset its processed flag.
        store.put_blocks(&[block]).unwrap();
        assert_eq!(store.unprocessed_blocks().unwrap().len(), 0);
    }

    #[test]
    fn test_register_voter_preserves_existing_record() {
        let store = MemoryStore::new();
        assert!(store.register_voter(&addr(1), &key(1), 90).unwrap());
        store.set_share_rate(&addr(1), 100).unwrap();
        store.credit_unpaid(&addr(1), Amount::new(5)).unwrap();
        assert!(!store.register_voter(&addr(1), &key(1), 90).unwrap());
        let voter = store.voter(&addr(1)).unwrap().unwrap();
        assert_eq!(voter.share_rate, 100);
        assert_eq!(voter.unpaid, Amount::new(5));
    }

    #[test]
    fn test_migrate_share_rate_touches_only_old_rate() {
        let store = MemoryStore::new();
        store.register_voter(&addr(1), &key(1), 80).unwrap();
        store.register_voter(&addr(2), &key(2), 80).unwrap();
        store.register_voter(&addr(3), &key(3), 95).unwrap();
        assert_eq!(store.migrate_share_rate(80, 90).unwrap(), 2);
        assert_eq!(store.share_rate(&addr(3)).unwrap(), 95);
    }

    #[test]
    fn test_checkpoint_regression_rejected() {
        let store = MemoryStore::new();
        let mut balances = BTreeMap::new();
        balances.insert(addr(1), Amount::new(100));
        store.put_checkpoints(&balances, Timestamp::new(50)).unwrap();
        let err = store
            .put_checkpoints(&balances, Timestamp::new(40))
            .unwrap_err();
        assert!(matches!(err, StoreError::CheckpointRegression { .. }));
        // Same timestamp is fine (reprocessing the same block window).
        store.put_checkpoints(&balances, Timestamp::new(50)).unwrap();
    }

    #[test]
    fn test_stage_settles_ledgers_and_inserts_rows() {
        let store = MemoryStore::new();
        store.register_voter(&addr(1), &key(1), 90).unwrap();
        store.credit_unpaid(&addr(1), Amount::new(900)).unwrap();
        store.init_delegate_accounts(&addr(9), &[]).unwrap();
        store.credit_reserve(SignedAmount::new(500)).unwrap();

        let batch = StagingBatch {
            rows: vec![
                NewPayment {
                    recipient: addr(9),
                    amount: Amount::new(400),
                    message: "Reward".into(),
                },
                NewPayment {
                    recipient: addr(1),
                    amount: Amount::new(900),
                    message: "Reward".into(),
                },
            ],
            voter_settlements: vec![(addr(1), Amount::new(900))],
            delegate_settlements: vec![(addr(9), Amount::new(400))],
        };
        let ids = store.stage(&batch).unwrap();
        assert_eq!(ids.len(), 2);

        let voter = store.voter(&addr(1)).unwrap().unwrap();
        assert_eq!(voter.unpaid, Amount::ZERO);
        assert_eq!(voter.total_paid, Amount::new(900));
        let balances = store.delegate_balances().unwrap();
        assert_eq!(balances.reserve_unpaid, SignedAmount::ZERO);
        assert_eq!(store.staged_rows(10).unwrap().len(), 2);
    }

    #[test]
    fn test_payment_status_transitions() {
        let store = MemoryStore::new();
        let batch = StagingBatch {
            rows: vec![NewPayment {
                recipient: addr(1),
                amount: Amount::new(10),
                message: "Reward".into(),
            }],
            voter_settlements: vec![],
            delegate_settlements: vec![],
        };
        let ids = store.stage(&batch).unwrap();

        store.mark_processing(&ids).unwrap();
        assert!(store.staged_rows(10).unwrap().is_empty());

        store.release_processing(&ids).unwrap();
        assert_eq!(store.staged_rows(10).unwrap().len(), 1);

        store.mark_processed(&ids).unwrap();
        // Terminal and idempotent.
        store.mark_processed(&ids).unwrap();
        store.release_processing(&ids).unwrap();
        assert_eq!(
            store.payment_row(ids[0]).unwrap().unwrap().status,
            PaymentStatus::Processed
        );
        assert_eq!(store.staged_count().unwrap(), 0);
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testdelegate.json");
        {
            let store = MemoryStore::open(&path).unwrap();
            store.register_voter(&addr(1), &key(1), 90).unwrap();
            store.credit_unpaid(&addr(1), Amount::new(42)).unwrap();
            store.init_delegate_accounts(&addr(9), &[]).unwrap();
            store.credit_reserve(SignedAmount::new(500)).unwrap();
            store
                .put_blocks(&[ForgedBlock::new(
                    3,
                    Timestamp::new(30),
                    Amount::new(1000),
                    Amount::ZERO,
                )])
                .unwrap();
        }

        let store = MemoryStore::open(&path).unwrap();
        let voter = store.voter(&addr(1)).unwrap().unwrap();
        assert_eq!(voter.unpaid, Amount::new(42));
        assert_eq!(
            store.delegate_balances().unwrap().reserve_unpaid,
            SignedAmount::new(500)
        );
        assert_eq!(store.last_block().unwrap().unwrap().height, 3);
    }

    #[test]
    fn test_share_rate_change_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testdelegate.json");
        {
            let store = MemoryStore::open(&path).unwrap();
            store.register_voter(&addr(1), &key(1), 90).unwrap();
        }
        {
            // A second process adjusting the rate sees the registered voter.
            let store = MemoryStore::open(&path).unwrap();
            store.set_share_rate(&addr(1), 100).unwrap();
        }
        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.share_rate(&addr(1)).unwrap(), 100);
    }

    #[test]
    fn test_open_without_existing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("fresh.json")).unwrap();
        assert!(store.all_voters().unwrap().is_empty());
        assert_eq!(store.processed_count().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            MemoryStore::open(&path),
            Err(StoreError::Corruption(_))
        ));
    }

    #[test]
    fn test_transaction_records() {
        let store = MemoryStore::new();
        let txid = TxId::new("ab".repeat(32));
        store.record_transaction(&txid, &[1, 2, 3]).unwrap();
        assert_eq!(store.transaction_rows(&txid).unwrap(), vec![1, 2, 3]);
        store.delete_transaction(&txid).unwrap();
        assert!(store.transaction_rows(&txid).is_err());
    }
}
