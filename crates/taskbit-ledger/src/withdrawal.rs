use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskbit_types::{AccountId, Amount, TxId, WithdrawalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    /// Debited from the requester, waiting for the external payout.
    Pending,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    /// Completed and Failed are terminal; a request transitions once.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// An external-payout request, decoupled from the balance debit.
///
/// The requester's balance is debited when the request is created; the
/// external settlement process later reports success or failure. Failure
/// credits the amount back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub requester: AccountId,
    pub amount: Amount,
    /// Opaque payout address; not validated by the ledger.
    pub destination: String,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub external_ref: Option<String>,
    pub status: WithdrawalStatus,
    /// The Pending Withdrawal transaction that tracks this request.
    pub tx_id: TxId,
}

impl WithdrawalRequest {
    pub fn pending(
        id: WithdrawalId,
        requester: AccountId,
        amount: Amount,
        destination: String,
        tx_id: TxId,
    ) -> Self {
        Self {
            id,
            requester,
            amount,
            destination,
            requested_at: Utc::now(),
            processed_at: None,
            external_ref: None,
            status: WithdrawalStatus::Pending,
            tx_id,
        }
    }
}

/// Pending and processed payout requests, indexed by id and requester.
#[derive(Debug, Default)]
pub struct WithdrawalQueue {
    requests: HashMap<WithdrawalId, WithdrawalRequest>,
    by_requester: HashMap<AccountId, Vec<WithdrawalId>>,
}

impl WithdrawalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a request, keeping the requester index current.
    pub fn insert(&mut self, request: WithdrawalRequest) {
        let ids = self.by_requester.entry(request.requester.clone()).or_default();
        if !ids.contains(&request.id) {
            ids.push(request.id);
        }
        self.requests.insert(request.id, request);
    }

    pub fn get(&self, id: WithdrawalId) -> Option<&WithdrawalRequest> {
        self.requests.get(&id)
    }

    /// All requests by one requester, oldest first.
    pub fn for_requester(&self, requester: &AccountId) -> Vec<WithdrawalRequest> {
        let mut requests: Vec<WithdrawalRequest> = self
            .by_requester
            .get(requester)
            .into_iter()
            .flatten()
            .filter_map(|id| self.requests.get(id))
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.id);
        requests
    }

    pub fn pending_count(&self) -> u64 {
        self.requests
            .values()
            .filter(|r| r.status == WithdrawalStatus::Pending)
            .count() as u64
    }

    /// Sum of amounts debited but not yet settled or returned.
    pub fn pending_total(&self) -> Amount {
        self.requests
            .values()
            .filter(|r| r.status == WithdrawalStatus::Pending)
            .fold(Amount::ZERO, |sum, r| sum.saturating_add(r.amount))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WithdrawalRequest> {
        self.requests.values()
    }
}
