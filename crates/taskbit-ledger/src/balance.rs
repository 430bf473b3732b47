use std::collections::HashMap;
use taskbit_types::{AccountId, Amount, LedgerError, Result};
use tracing::debug;

/// Spendable balances: identity -> amount.
///
/// Pure state with read/write primitives. All business validation lives in
/// the payment service, which calls the mutators only after every
/// precondition of the enclosing operation has passed. Zero balances drop
/// their entry so iteration only visits funded accounts.
#[derive(Debug, Default)]
pub struct BalanceBook {
    balances: HashMap<AccountId, Amount>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absent accounts read as zero, never as an error.
    pub fn get(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(Amount::ZERO)
    }

    pub fn credit(&mut self, account: &AccountId, amount: Amount) {
        if amount.is_zero() {
            return;
        }
        let before = self.get(account);
        let after = before.saturating_add(amount);
        self.balances.insert(account.clone(), after);

        debug!(
            account = %account,
            amount = amount.to_sats(),
            balance_before = before.to_sats(),
            balance_after = after.to_sats(),
            "💰 Balance credited"
        );
    }

    pub fn debit(&mut self, account: &AccountId, amount: Amount) -> Result<()> {
        let before = self.get(account);
        let after = before
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds {
                required: amount,
                available: before,
            })?;

        if after.is_zero() {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), after);
        }

        debug!(
            account = %account,
            amount = amount.to_sats(),
            balance_before = before.to_sats(),
            balance_after = after.to_sats(),
            "💸 Balance debited"
        );
        Ok(())
    }

    /// Direct slot write, used when rebuilding state from storage.
    pub fn set(&mut self, account: AccountId, amount: Amount) {
        if amount.is_zero() {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, amount);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, Amount)> {
        self.balances.iter().map(|(account, amount)| (account, *amount))
    }

    /// Sum of every tracked balance.
    pub fn total(&self) -> Amount {
        self.balances
            .values()
            .fold(Amount::ZERO, |sum, amount| sum.saturating_add(*amount))
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_account_reads_zero() {
        let book = BalanceBook::new();
        assert_eq!(book.get(&AccountId::from("nobody")), Amount::ZERO);
    }

    #[test]
    fn test_credit_and_debit() {
        let mut book = BalanceBook::new();
        let alice = AccountId::from("alice");

        book.credit(&alice, Amount::from_sats(100_000));
        assert_eq!(book.get(&alice), Amount::from_sats(100_000));

        book.debit(&alice, Amount::from_sats(30_000)).unwrap();
        assert_eq!(book.get(&alice), Amount::from_sats(70_000));
    }

    #[test]
    fn test_insufficient_debit_leaves_balance_unchanged() {
        let mut book = BalanceBook::new();
        let alice = AccountId::from("alice");
        book.credit(&alice, Amount::from_sats(50));

        let err = book.debit(&alice, Amount::from_sats(51)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                required: Amount::from_sats(51),
                available: Amount::from_sats(50),
            }
        );
        assert_eq!(book.get(&alice), Amount::from_sats(50));
    }

    #[test]
    fn test_zero_balance_drops_entry() {
        let mut book = BalanceBook::new();
        let alice = AccountId::from("alice");

        book.credit(&alice, Amount::from_sats(10));
        book.debit(&alice, Amount::from_sats(10)).unwrap();

        assert_eq!(book.len(), 0);
        assert_eq!(book.get(&alice), Amount::ZERO);
    }

    #[test]
    fn test_total_sums_all_accounts() {
        let mut book = BalanceBook::new();
        book.credit(&AccountId::from("a"), Amount::from_sats(1_000));
        book.credit(&AccountId::from("b"), Amount::from_sats(2_000));
        assert_eq!(book.total(), Amount::from_sats(3_000));
    }
}
