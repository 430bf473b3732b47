use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use taskbit_types::{AccountId, Amount, TaskId, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TaskPayment,
    Refund,
    Bonus,
    Fee,
    EscrowLock,
    EscrowRelease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

/// Immutable ledger history record.
///
/// Created once; only Withdrawal transactions ever transition afterwards
/// (Pending -> Completed or Failed, driven by the external settlement
/// report). Ids come from a durably persisted counter and are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub kind: TransactionKind,
    pub from: AccountId,
    pub to: AccountId,
    /// Gross amount moved by the operation.
    pub amount: Amount,
    /// Platform fee withheld; zero except on TaskPayment.
    pub fee: Amount,
    pub task_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub status: TransactionStatus,
    /// External settlement reference (e.g. an on-chain tx hash).
    pub external_ref: Option<String>,
    pub note: Option<String>,
}

/// Append-only transaction log with a per-identity secondary index.
///
/// The index is derived state: it is rebuilt from the primary table when
/// the ledger reloads, never persisted.
#[derive(Debug, Default)]
pub struct TransactionLog {
    transactions: BTreeMap<TxId, Transaction>,
    by_account: HashMap<AccountId, Vec<TxId>>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, indexing it for both parties.
    pub fn append(&mut self, tx: Transaction) {
        self.index(&tx.from, tx.id);
        if tx.to != tx.from {
            self.index(&tx.to, tx.id);
        }
        self.transactions.insert(tx.id, tx);
    }

    fn index(&mut self, account: &AccountId, id: TxId) {
        let ids = self.by_account.entry(account.clone()).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub fn get(&self, id: TxId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    /// Transitions a Withdrawal record, returning the updated copy.
    pub(crate) fn transition(
        &mut self,
        id: TxId,
        status: TransactionStatus,
        external_ref: Option<String>,
    ) -> Option<Transaction> {
        let tx = self.transactions.get_mut(&id)?;
        tx.status = status;
        if external_ref.is_some() {
            tx.external_ref = external_ref;
        }
        Some(tx.clone())
    }

    /// Paginated history for one identity.
    ///
    /// Sorted by creation time descending with ties broken by id ascending;
    /// an offset at or past the end yields an empty page.
    pub fn history(&self, account: &AccountId, offset: usize, limit: usize) -> Vec<Transaction> {
        let mut txs: Vec<&Transaction> = self
            .by_account
            .get(account)
            .into_iter()
            .flatten()
            .filter_map(|id| self.transactions.get(id))
            .collect();

        txs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        txs.into_iter().skip(offset).take(limit).cloned().collect()
    }

    pub fn len(&self) -> u64 {
        self.transactions.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Sum of all recorded amounts.
    pub fn total_volume(&self) -> Amount {
        self.transactions
            .values()
            .fold(Amount::ZERO, |sum, tx| sum.saturating_add(tx.amount))
    }

    /// Sum of all recorded fees.
    pub fn total_fees(&self) -> Amount {
        self.transactions
            .values()
            .fold(Amount::ZERO, |sum, tx| sum.saturating_add(tx.fee))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }
}
