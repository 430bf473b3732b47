use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskbit_types::{AccountId, Amount, TaskId};

/// Funds removed from a payer's spendable balance and held against one task.
///
/// Created in the locked state when the payer's balance is debited. Unlocks
/// exactly once: release sets the beneficiary and credits them net of fee,
/// refund returns the full amount to the payer and leaves the beneficiary
/// unset. An unlocked record is immutable history; a fresh lock for the
/// same task replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    pub task_id: TaskId,
    pub amount: Amount,
    pub payer: AccountId,
    /// Set only when the escrow is released, never on refund.
    pub beneficiary: Option<AccountId>,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Escrow {
    pub fn lock(
        task_id: TaskId,
        amount: Amount,
        payer: AccountId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            task_id,
            amount,
            payer,
            beneficiary: None,
            locked: true,
            created_at: Utc::now(),
            expires_at,
        }
    }

    /// A locked escrow whose expiry has passed. The ledger never acts on
    /// expiry by itself; callers query and drive compensation.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if self.locked && expiry <= now)
    }

    pub(crate) fn mark_released(&mut self, beneficiary: AccountId) {
        self.locked = false;
        self.beneficiary = Some(beneficiary);
    }

    pub(crate) fn mark_refunded(&mut self) {
        self.locked = false;
    }
}

/// One escrow slot per task id.
#[derive(Debug, Default)]
pub struct EscrowTable {
    escrows: HashMap<TaskId, Escrow>,
}

impl EscrowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: TaskId) -> Option<&Escrow> {
        self.escrows.get(&task_id)
    }

    /// Inserts or replaces the slot for the escrow's task.
    pub fn insert(&mut self, escrow: Escrow) {
        self.escrows.insert(escrow.task_id, escrow);
    }

    pub fn locked_count(&self) -> u64 {
        self.escrows.values().filter(|e| e.locked).count() as u64
    }

    /// Sum of all currently locked amounts.
    pub fn locked_total(&self) -> Amount {
        self.escrows
            .values()
            .filter(|e| e.locked)
            .fold(Amount::ZERO, |sum, e| sum.saturating_add(e.amount))
    }

    pub fn expired(&self, now: DateTime<Utc>) -> Vec<Escrow> {
        let mut expired: Vec<Escrow> = self
            .escrows
            .values()
            .filter(|e| e.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|e| e.task_id);
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = &Escrow> {
        self.escrows.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_lock_starts_locked_without_beneficiary() {
        let escrow = Escrow::lock(
            TaskId::new(7),
            Amount::from_sats(50_000),
            AccountId::from("alice"),
            None,
        );
        assert!(escrow.locked);
        assert_eq!(escrow.beneficiary, None);
    }

    #[test]
    fn test_release_sets_beneficiary_refund_does_not() {
        let mut released = Escrow::lock(
            TaskId::new(1),
            Amount::from_sats(100),
            AccountId::from("alice"),
            None,
        );
        released.mark_released(AccountId::from("bob"));
        assert!(!released.locked);
        assert_eq!(released.beneficiary, Some(AccountId::from("bob")));

        let mut refunded = Escrow::lock(
            TaskId::new(2),
            Amount::from_sats(100),
            AccountId::from("alice"),
            None,
        );
        refunded.mark_refunded();
        assert!(!refunded.locked);
        assert_eq!(refunded.beneficiary, None);
    }

    #[test]
    fn test_locked_totals() {
        let mut table = EscrowTable::new();
        table.insert(Escrow::lock(
            TaskId::new(1),
            Amount::from_sats(1_000),
            AccountId::from("a"),
            None,
        ));
        table.insert(Escrow::lock(
            TaskId::new(2),
            Amount::from_sats(2_000),
            AccountId::from("b"),
            None,
        ));

        let mut unlocked = Escrow::lock(
            TaskId::new(3),
            Amount::from_sats(4_000),
            AccountId::from("c"),
            None,
        );
        unlocked.mark_refunded();
        table.insert(unlocked);

        assert_eq!(table.locked_count(), 2);
        assert_eq!(table.locked_total(), Amount::from_sats(3_000));
    }

    #[test]
    fn test_expiry_only_applies_to_locked_records() {
        let now = Utc::now();
        let past = now - Duration::hours(1);

        let mut table = EscrowTable::new();
        table.insert(Escrow {
            task_id: TaskId::new(1),
            amount: Amount::from_sats(100),
            payer: AccountId::from("a"),
            beneficiary: None,
            locked: true,
            created_at: past,
            expires_at: Some(past),
        });
        table.insert(Escrow {
            task_id: TaskId::new(2),
            amount: Amount::from_sats(100),
            payer: AccountId::from("a"),
            beneficiary: None,
            locked: false,
            created_at: past,
            expires_at: Some(past),
        });
        table.insert(Escrow {
            task_id: TaskId::new(3),
            amount: Amount::from_sats(100),
            payer: AccountId::from("a"),
            beneficiary: None,
            locked: true,
            created_at: past,
            expires_at: None,
        });

        let expired = table.expired(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].task_id, TaskId::new(1));
    }
}
