use crate::escrow::Escrow;
use crate::transaction::Transaction;
use crate::withdrawal::WithdrawalRequest;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use taskbit_types::{AccountId, Amount, TaskId, TxId, WithdrawalId};
use tokio::sync::RwLock;
use tracing::debug;

/// The writes produced by one committed ledger operation.
///
/// A batch is applied atomically: either every record lands or none does.
/// Id counters ride in the same batch as the records they cover, so an id
/// is durable before it is ever handed out in a reply.
#[derive(Debug, Default)]
pub struct LedgerBatch {
    /// New balance values; zero deletes the slot.
    pub balances: Vec<(AccountId, Amount)>,
    pub escrows: Vec<Escrow>,
    pub withdrawals: Vec<WithdrawalRequest>,
    pub transactions: Vec<Transaction>,
    pub next_tx_id: Option<u64>,
    pub next_withdrawal_id: Option<u64>,
    pub fee_percent: Option<u8>,
}

impl LedgerBatch {
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.escrows.is_empty()
            && self.withdrawals.is_empty()
            && self.transactions.is_empty()
            && self.next_tx_id.is_none()
            && self.next_withdrawal_id.is_none()
            && self.fee_percent.is_none()
    }
}

/// Everything needed to rebuild ledger state after a restart.
///
/// Contains the four primary tables plus the persisted counters; all
/// secondary indexes are reconstructed from these, never stored.
#[derive(Debug, Default)]
pub struct LedgerSnapshot {
    pub balances: Vec<(AccountId, Amount)>,
    pub escrows: Vec<Escrow>,
    pub withdrawals: Vec<WithdrawalRequest>,
    pub transactions: Vec<Transaction>,
    pub next_tx_id: u64,
    pub next_withdrawal_id: u64,
    pub fee_percent: Option<u8>,
}

#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Durably applies one operation's writes, all-or-nothing.
    async fn commit(&self, batch: LedgerBatch) -> Result<()>;

    /// Reads back the full persisted state.
    async fn load(&self) -> Result<LedgerSnapshot>;
}

type BalanceMap = HashMap<AccountId, Amount>;

/// In-memory backend for tests and ephemeral deployments.
pub struct MemoryStorage {
    balances: Arc<RwLock<BalanceMap>>,
    escrows: Arc<RwLock<HashMap<TaskId, Escrow>>>,
    withdrawals: Arc<RwLock<HashMap<WithdrawalId, WithdrawalRequest>>>,
    transactions: Arc<RwLock<HashMap<TxId, Transaction>>>,
    meta: Arc<RwLock<MetaCounters>>,
}

#[derive(Debug, Default, Clone)]
struct MetaCounters {
    next_tx_id: Option<u64>,
    next_withdrawal_id: Option<u64>,
    fee_percent: Option<u8>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
            escrows: Arc::new(RwLock::new(HashMap::new())),
            withdrawals: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            meta: Arc::new(RwLock::new(MetaCounters::default())),
        }
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn commit(&self, batch: LedgerBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut balances = self.balances.write().await;
        let mut escrows = self.escrows.write().await;
        let mut withdrawals = self.withdrawals.write().await;
        let mut transactions = self.transactions.write().await;
        let mut meta = self.meta.write().await;

        for (account, amount) in batch.balances {
            if amount.is_zero() {
                balances.remove(&account);
            } else {
                balances.insert(account, amount);
            }
        }
        for escrow in batch.escrows {
            escrows.insert(escrow.task_id, escrow);
        }
        for request in batch.withdrawals {
            withdrawals.insert(request.id, request);
        }
        let tx_count = batch.transactions.len();
        for tx in batch.transactions {
            transactions.insert(tx.id, tx);
        }
        if let Some(next) = batch.next_tx_id {
            meta.next_tx_id = Some(next);
        }
        if let Some(next) = batch.next_withdrawal_id {
            meta.next_withdrawal_id = Some(next);
        }
        if let Some(percent) = batch.fee_percent {
            meta.fee_percent = Some(percent);
        }

        debug!(
            records = tx_count,
            storage_type = "memory",
            "💾 Batch committed"
        );
        Ok(())
    }

    async fn load(&self) -> Result<LedgerSnapshot> {
        let balances = self.balances.read().await;
        let escrows = self.escrows.read().await;
        let withdrawals = self.withdrawals.read().await;
        let transactions = self.transactions.read().await;
        let meta = self.meta.read().await;

        Ok(LedgerSnapshot {
            balances: balances.iter().map(|(a, v)| (a.clone(), *v)).collect(),
            escrows: escrows.values().cloned().collect(),
            withdrawals: withdrawals.values().cloned().collect(),
            transactions: transactions.values().cloned().collect(),
            next_tx_id: meta.next_tx_id.unwrap_or(1),
            next_withdrawal_id: meta.next_withdrawal_id.unwrap_or(1),
            fee_percent: meta.fee_percent,
        })
    }
}

#[cfg(feature = "rocksdb")]
pub use self::rocks::RocksDbStorage;

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::*;
    use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
    use tracing::info;

    const CF_BALANCES: &str = "balances";
    const CF_ESCROWS: &str = "escrows";
    const CF_WITHDRAWALS: &str = "withdrawals";
    const CF_TRANSACTIONS: &str = "transactions";
    const CF_META: &str = "meta";

    const META_NEXT_TX_ID: &[u8] = b"next_tx_id";
    const META_NEXT_WITHDRAWAL_ID: &[u8] = b"next_withdrawal_id";
    const META_FEE_PERCENT: &[u8] = b"fee_percent";

    /// Durable backend. Balances and counters are stored as little-endian
    /// u64, records as JSON; record keys are big-endian ids so iteration
    /// order matches id order.
    pub struct RocksDbStorage {
        db: Arc<DB>,
    }

    impl RocksDbStorage {
        pub fn open(path: &str) -> Result<Self> {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            opts.create_missing_column_families(true);

            let cfs = [
                CF_BALANCES,
                CF_ESCROWS,
                CF_WITHDRAWALS,
                CF_TRANSACTIONS,
                CF_META,
            ]
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

            let db = DB::open_cf_descriptors(&opts, path, cfs)?;
            info!(path = %path, "🗄️ Ledger database opened");
            Ok(Self { db: Arc::new(db) })
        }

        fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
            self.db
                .cf_handle(name)
                .ok_or_else(|| anyhow::anyhow!("column family not found: {}", name))
        }
    }

    #[async_trait]
    impl LedgerStorage for RocksDbStorage {
        async fn commit(&self, batch: LedgerBatch) -> Result<()> {
            if batch.is_empty() {
                return Ok(());
            }

            let mut writes = WriteBatch::default();

            let cf_balances = self.cf(CF_BALANCES)?;
            for (account, amount) in &batch.balances {
                if amount.is_zero() {
                    writes.delete_cf(cf_balances, account.as_str().as_bytes());
                } else {
                    writes.put_cf(
                        cf_balances,
                        account.as_str().as_bytes(),
                        amount.to_sats().to_le_bytes(),
                    );
                }
            }

            let cf_escrows = self.cf(CF_ESCROWS)?;
            for escrow in &batch.escrows {
                writes.put_cf(
                    cf_escrows,
                    escrow.task_id.as_u64().to_be_bytes(),
                    serde_json::to_vec(escrow)?,
                );
            }

            let cf_withdrawals = self.cf(CF_WITHDRAWALS)?;
            for request in &batch.withdrawals {
                writes.put_cf(
                    cf_withdrawals,
                    request.id.as_u64().to_be_bytes(),
                    serde_json::to_vec(request)?,
                );
            }

            let cf_transactions = self.cf(CF_TRANSACTIONS)?;
            for tx in &batch.transactions {
                writes.put_cf(
                    cf_transactions,
                    tx.id.as_u64().to_be_bytes(),
                    serde_json::to_vec(tx)?,
                );
            }

            let cf_meta = self.cf(CF_META)?;
            if let Some(next) = batch.next_tx_id {
                writes.put_cf(cf_meta, META_NEXT_TX_ID, next.to_le_bytes());
            }
            if let Some(next) = batch.next_withdrawal_id {
                writes.put_cf(cf_meta, META_NEXT_WITHDRAWAL_ID, next.to_le_bytes());
            }
            if let Some(percent) = batch.fee_percent {
                writes.put_cf(cf_meta, META_FEE_PERCENT, [percent]);
            }

            self.db.write(writes)?;
            Ok(())
        }

        async fn load(&self) -> Result<LedgerSnapshot> {
            let mut snapshot = LedgerSnapshot {
                next_tx_id: 1,
                next_withdrawal_id: 1,
                ..Default::default()
            };

            let cf_balances = self.cf(CF_BALANCES)?;
            for item in self.db.iterator_cf(cf_balances, IteratorMode::Start) {
                let (key, value) = item?;
                let account = AccountId::new(String::from_utf8(key.to_vec())?);
                let sats = u64::from_le_bytes(value.as_ref().try_into()?);
                snapshot.balances.push((account, Amount::from_sats(sats)));
            }

            let cf_escrows = self.cf(CF_ESCROWS)?;
            for item in self.db.iterator_cf(cf_escrows, IteratorMode::Start) {
                let (_, value) = item?;
                snapshot.escrows.push(serde_json::from_slice(&value)?);
            }

            let cf_withdrawals = self.cf(CF_WITHDRAWALS)?;
            for item in self.db.iterator_cf(cf_withdrawals, IteratorMode::Start) {
                let (_, value) = item?;
                snapshot.withdrawals.push(serde_json::from_slice(&value)?);
            }

            let cf_transactions = self.cf(CF_TRANSACTIONS)?;
            for item in self.db.iterator_cf(cf_transactions, IteratorMode::Start) {
                let (_, value) = item?;
                snapshot.transactions.push(serde_json::from_slice(&value)?);
            }

            let cf_meta = self.cf(CF_META)?;
            if let Some(bytes) = self.db.get_cf(cf_meta, META_NEXT_TX_ID)? {
                snapshot.next_tx_id = u64::from_le_bytes(bytes.as_slice().try_into()?);
            }
            if let Some(bytes) = self.db.get_cf(cf_meta, META_NEXT_WITHDRAWAL_ID)? {
                snapshot.next_withdrawal_id = u64::from_le_bytes(bytes.as_slice().try_into()?);
            }
            if let Some(bytes) = self.db.get_cf(cf_meta, META_FEE_PERCENT)? {
                if let Some(percent) = bytes.first() {
                    snapshot.fee_percent = Some(*percent);
                }
            }

            info!(
                balances = snapshot.balances.len(),
                escrows = snapshot.escrows.len(),
                withdrawals = snapshot.withdrawals.len(),
                transactions = snapshot.transactions.len(),
                next_tx_id = snapshot.next_tx_id,
                "🗄️ Ledger state loaded"
            );
            Ok(snapshot)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TransactionKind, TransactionStatus};
    use chrono::Utc;

    fn sample_tx(id: u64) -> Transaction {
        Transaction {
            id: TxId::new(id),
            kind: TransactionKind::Deposit,
            from: AccountId::external(),
            to: AccountId::from("alice"),
            amount: Amount::from_sats(5_000),
            fee: Amount::ZERO,
            task_id: None,
            created_at: Utc::now(),
            status: TransactionStatus::Completed,
            external_ref: Some("btc:abc".to_string()),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_memory_commit_and_load() {
        let storage = MemoryStorage::new();

        let batch = LedgerBatch {
            balances: vec![(AccountId::from("alice"), Amount::from_sats(5_000))],
            transactions: vec![sample_tx(1)],
            next_tx_id: Some(2),
            ..Default::default()
        };
        storage.commit(batch).await.unwrap();

        let snapshot = storage.load().await.unwrap();
        assert_eq!(snapshot.balances.len(), 1);
        assert_eq!(snapshot.transactions.len(), 1);
        assert_eq!(snapshot.next_tx_id, 2);
        assert_eq!(snapshot.next_withdrawal_id, 1);
    }

    #[tokio::test]
    async fn test_memory_zero_balance_deletes_slot() {
        let storage = MemoryStorage::new();

        storage
            .commit(LedgerBatch {
                balances: vec![(AccountId::from("alice"), Amount::from_sats(100))],
                ..Default::default()
            })
            .await
            .unwrap();
        storage
            .commit(LedgerBatch {
                balances: vec![(AccountId::from("alice"), Amount::ZERO)],
                ..Default::default()
            })
            .await
            .unwrap();

        let snapshot = storage.load().await.unwrap();
        assert!(snapshot.balances.is_empty());
    }

    #[cfg(feature = "rocksdb")]
    #[tokio::test]
    async fn test_rocksdb_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RocksDbStorage::open(dir.path().to_str().unwrap()).unwrap();

        let batch = LedgerBatch {
            balances: vec![(AccountId::from("alice"), Amount::from_sats(7_500))],
            transactions: vec![sample_tx(1)],
            next_tx_id: Some(2),
            fee_percent: Some(5),
            ..Default::default()
        };
        storage.commit(batch).await.unwrap();

        let snapshot = storage.load().await.unwrap();
        assert_eq!(
            snapshot.balances,
            vec![(AccountId::from("alice"), Amount::from_sats(7_500))]
        );
        assert_eq!(snapshot.transactions.len(), 1);
        assert_eq!(snapshot.transactions[0].external_ref.as_deref(), Some("btc:abc"));
        assert_eq!(snapshot.next_tx_id, 2);
        assert_eq!(snapshot.fee_percent, Some(5));
    }
}
