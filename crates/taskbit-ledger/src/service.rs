use crate::balance::BalanceBook;
use crate::config::{LedgerConfig, MAX_FEE_PERCENT};
use crate::escrow::{Escrow, EscrowTable};
use crate::stats::LedgerStats;
use crate::storage::{LedgerBatch, LedgerStorage};
use crate::transaction::{Transaction, TransactionKind, TransactionLog, TransactionStatus};
use crate::withdrawal::{WithdrawalQueue, WithdrawalRequest, WithdrawalStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use taskbit_types::{AccountId, Amount, LedgerError, Result, TaskId, TxId, WithdrawalId};
use tokio::sync::RwLock;
use tracing::info;

struct LedgerState {
    balances: BalanceBook,
    escrows: EscrowTable,
    withdrawals: WithdrawalQueue,
    log: TransactionLog,
    next_tx_id: u64,
    next_withdrawal_id: u64,
    fee_percent: u8,
}

/// The payment and escrow service.
///
/// The only component with behavior: it validates every call, enforces the
/// money invariants, and mutates balances, escrows, withdrawals, and the
/// transaction log atomically within one call. Single-writer semantics are
/// reproduced with one state lock whose write guard spans each whole
/// mutating operation; invariants cross several tables, so there is no
/// per-field locking. Each operation validates all preconditions first,
/// commits a storage batch, and only then touches in-memory state, so a
/// failure of any kind leaves the ledger unchanged.
pub struct PaymentService {
    storage: Arc<dyn LedgerStorage>,
    state: Arc<RwLock<LedgerState>>,
    min_deposit: Amount,
    min_withdrawal: Amount,
}

fn storage_err(err: anyhow::Error) -> LedgerError {
    LedgerError::Storage(err.to_string())
}

impl PaymentService {
    /// Opens the service over a storage backend, replaying persisted state.
    ///
    /// Secondary indexes (per-identity transaction and withdrawal lists)
    /// are rebuilt from the primary tables; transactions are replayed in id
    /// order so reconstruction is deterministic.
    pub async fn new(storage: Arc<dyn LedgerStorage>, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let snapshot = storage.load().await.map_err(storage_err)?;

        let mut state = LedgerState {
            balances: BalanceBook::new(),
            escrows: EscrowTable::new(),
            withdrawals: WithdrawalQueue::new(),
            log: TransactionLog::new(),
            next_tx_id: snapshot.next_tx_id,
            next_withdrawal_id: snapshot.next_withdrawal_id,
            fee_percent: snapshot.fee_percent.unwrap_or(config.fees.percent),
        };

        for (account, amount) in snapshot.balances {
            state.balances.set(account, amount);
        }
        for escrow in snapshot.escrows {
            state.escrows.insert(escrow);
        }
        for request in snapshot.withdrawals {
            state.withdrawals.insert(request);
        }
        let mut transactions = snapshot.transactions;
        transactions.sort_by_key(|tx| tx.id);
        for tx in transactions {
            state.log.append(tx);
        }

        info!(
            accounts = state.balances.len(),
            transactions = state.log.len(),
            next_tx_id = state.next_tx_id,
            fee_percent = state.fee_percent,
            "✅ Payment service ready"
        );

        Ok(Self {
            storage,
            state: Arc::new(RwLock::new(state)),
            min_deposit: config.min_deposit(),
            min_withdrawal: config.min_withdrawal(),
        })
    }

    // ======================== mutating operations ========================

    /// Credits a confirmed external payment to `target`.
    pub async fn deposit(
        &self,
        target: &AccountId,
        amount: Amount,
        external_ref: String,
    ) -> Result<TxId> {
        let mut state = self.state.write().await;

        if amount < self.min_deposit {
            return Err(LedgerError::BelowMinimum {
                minimum: self.min_deposit,
                amount,
            });
        }

        let tx = Transaction {
            id: TxId::new(state.next_tx_id),
            kind: TransactionKind::Deposit,
            from: AccountId::external(),
            to: target.clone(),
            amount,
            fee: Amount::ZERO,
            task_id: None,
            created_at: Utc::now(),
            status: TransactionStatus::Completed,
            external_ref: Some(external_ref),
            note: None,
        };

        let new_balance = state.balances.get(target).saturating_add(amount);
        self.storage
            .commit(LedgerBatch {
                balances: vec![(target.clone(), new_balance)],
                transactions: vec![tx.clone()],
                next_tx_id: Some(state.next_tx_id + 1),
                ..Default::default()
            })
            .await
            .map_err(storage_err)?;

        state.next_tx_id += 1;
        state.balances.credit(target, amount);
        let tx_id = tx.id;
        state.log.append(tx);

        info!(
            target = %target,
            amount = amount.to_sats(),
            tx_id = %tx_id,
            "💰 Deposit credited"
        );
        Ok(tx_id)
    }

    /// Moves `amount` out of the caller's balance into a locked escrow for
    /// `task_id`. At most one locked escrow may exist per task; a fresh
    /// lock over a released or refunded record replaces it.
    pub async fn lock_escrow(
        &self,
        caller: &AccountId,
        task_id: TaskId,
        amount: Amount,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<TxId> {
        let mut state = self.state.write().await;

        if caller.is_anonymous() {
            return Err(LedgerError::Unauthenticated);
        }
        let available = state.balances.get(caller);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        if matches!(state.escrows.get(task_id), Some(existing) if existing.locked) {
            return Err(LedgerError::AlreadyLocked(task_id));
        }

        let escrow = Escrow::lock(task_id, amount, caller.clone(), expires_at);
        let tx = Transaction {
            id: TxId::new(state.next_tx_id),
            kind: TransactionKind::EscrowLock,
            from: caller.clone(),
            to: AccountId::escrow_pool(),
            amount,
            fee: Amount::ZERO,
            task_id: Some(task_id),
            created_at: Utc::now(),
            status: TransactionStatus::Completed,
            external_ref: None,
            note: None,
        };

        self.storage
            .commit(LedgerBatch {
                balances: vec![(caller.clone(), available.saturating_sub(amount))],
                escrows: vec![escrow.clone()],
                transactions: vec![tx.clone()],
                next_tx_id: Some(state.next_tx_id + 1),
                ..Default::default()
            })
            .await
            .map_err(storage_err)?;

        state.next_tx_id += 1;
        state.balances.debit(caller, amount)?;
        state.escrows.insert(escrow);
        let tx_id = tx.id;
        state.log.append(tx);

        info!(
            payer = %caller,
            task_id = %task_id,
            amount = amount.to_sats(),
            tx_id = %tx_id,
            "🔒 Escrow locked"
        );
        Ok(tx_id)
    }

    /// Releases a locked escrow to `beneficiary`, withholding the platform
    /// fee. Only the original payer may release.
    pub async fn release_escrow(
        &self,
        caller: &AccountId,
        task_id: TaskId,
        beneficiary: &AccountId,
    ) -> Result<TxId> {
        let mut state = self.state.write().await;

        let escrow = state
            .escrows
            .get(task_id)
            .ok_or_else(|| LedgerError::NotFound(task_id.to_string()))?;
        if !escrow.locked {
            return Err(LedgerError::AlreadyReleased(task_id));
        }
        if escrow.payer != *caller {
            return Err(LedgerError::NotPayer);
        }

        let gross = escrow.amount;
        let fee = gross.percent(state.fee_percent);
        let net = gross.saturating_sub(fee);

        let mut released = escrow.clone();
        released.mark_released(beneficiary.clone());

        let tx = Transaction {
            id: TxId::new(state.next_tx_id),
            kind: TransactionKind::TaskPayment,
            from: caller.clone(),
            to: beneficiary.clone(),
            amount: gross,
            fee,
            task_id: Some(task_id),
            created_at: Utc::now(),
            status: TransactionStatus::Completed,
            external_ref: None,
            note: None,
        };

        let new_balance = state.balances.get(beneficiary).saturating_add(net);
        self.storage
            .commit(LedgerBatch {
                balances: vec![(beneficiary.clone(), new_balance)],
                escrows: vec![released.clone()],
                transactions: vec![tx.clone()],
                next_tx_id: Some(state.next_tx_id + 1),
                ..Default::default()
            })
            .await
            .map_err(storage_err)?;

        state.next_tx_id += 1;
        state.balances.credit(beneficiary, net);
        state.escrows.insert(released);
        let tx_id = tx.id;
        state.log.append(tx);

        info!(
            payer = %caller,
            beneficiary = %beneficiary,
            task_id = %task_id,
            gross = gross.to_sats(),
            fee = fee.to_sats(),
            net = net.to_sats(),
            tx_id = %tx_id,
            "🔓 Escrow released"
        );
        Ok(tx_id)
    }

    /// Returns a locked escrow to the payer in full, no fee. Only the
    /// original payer may refund.
    pub async fn refund_escrow(&self, caller: &AccountId, task_id: TaskId) -> Result<TxId> {
        let mut state = self.state.write().await;

        let escrow = state
            .escrows
            .get(task_id)
            .ok_or_else(|| LedgerError::NotFound(task_id.to_string()))?;
        if !escrow.locked {
            return Err(LedgerError::AlreadyReleased(task_id));
        }
        if escrow.payer != *caller {
            return Err(LedgerError::NotPayer);
        }

        let amount = escrow.amount;
        let mut refunded = escrow.clone();
        refunded.mark_refunded();

        let tx = Transaction {
            id: TxId::new(state.next_tx_id),
            kind: TransactionKind::Refund,
            from: AccountId::escrow_pool(),
            to: caller.clone(),
            amount,
            fee: Amount::ZERO,
            task_id: Some(task_id),
            created_at: Utc::now(),
            status: TransactionStatus::Completed,
            external_ref: None,
            note: None,
        };

        let new_balance = state.balances.get(caller).saturating_add(amount);
        self.storage
            .commit(LedgerBatch {
                balances: vec![(caller.clone(), new_balance)],
                escrows: vec![refunded.clone()],
                transactions: vec![tx.clone()],
                next_tx_id: Some(state.next_tx_id + 1),
                ..Default::default()
            })
            .await
            .map_err(storage_err)?;

        state.next_tx_id += 1;
        state.balances.credit(caller, amount);
        state.escrows.insert(refunded);
        let tx_id = tx.id;
        state.log.append(tx);

        info!(
            payer = %caller,
            task_id = %task_id,
            amount = amount.to_sats(),
            tx_id = %tx_id,
            "🔄 Escrow refunded"
        );
        Ok(tx_id)
    }

    /// Debits the caller immediately and queues an external payout.
    pub async fn request_withdrawal(
        &self,
        caller: &AccountId,
        amount: Amount,
        destination: String,
    ) -> Result<WithdrawalId> {
        let mut state = self.state.write().await;

        if caller.is_anonymous() {
            return Err(LedgerError::Unauthenticated);
        }
        if amount < self.min_withdrawal {
            return Err(LedgerError::BelowMinimum {
                minimum: self.min_withdrawal,
                amount,
            });
        }
        let available = state.balances.get(caller);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        let tx = Transaction {
            id: TxId::new(state.next_tx_id),
            kind: TransactionKind::Withdrawal,
            from: caller.clone(),
            to: AccountId::external(),
            amount,
            fee: Amount::ZERO,
            task_id: None,
            created_at: Utc::now(),
            status: TransactionStatus::Pending,
            external_ref: None,
            note: None,
        };
        let request = WithdrawalRequest::pending(
            WithdrawalId::new(state.next_withdrawal_id),
            caller.clone(),
            amount,
            destination,
            tx.id,
        );

        self.storage
            .commit(LedgerBatch {
                balances: vec![(caller.clone(), available.saturating_sub(amount))],
                withdrawals: vec![request.clone()],
                transactions: vec![tx.clone()],
                next_tx_id: Some(state.next_tx_id + 1),
                next_withdrawal_id: Some(state.next_withdrawal_id + 1),
                ..Default::default()
            })
            .await
            .map_err(storage_err)?;

        state.next_tx_id += 1;
        state.next_withdrawal_id += 1;
        state.balances.debit(caller, amount)?;
        let withdrawal_id = request.id;
        state.withdrawals.insert(request);
        state.log.append(tx);

        info!(
            requester = %caller,
            amount = amount.to_sats(),
            withdrawal_id = %withdrawal_id,
            "📦 Withdrawal requested"
        );
        Ok(withdrawal_id)
    }

    /// Records the outcome of an external payout.
    ///
    /// Failure credits the amount back to the requester; that compensation
    /// is an effect of this call succeeding, not an error from it.
    pub async fn process_withdrawal(
        &self,
        id: WithdrawalId,
        external_ref: Option<String>,
        success: bool,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        let request = state
            .withdrawals
            .get(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        if request.status.is_terminal() {
            return Err(LedgerError::AlreadyProcessed(id));
        }

        let mut processed = request.clone();
        processed.processed_at = Some(Utc::now());
        processed.external_ref = external_ref.clone();
        processed.status = if success {
            WithdrawalStatus::Completed
        } else {
            WithdrawalStatus::Failed
        };

        let tx_status = if success {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        let mut updated_tx = state
            .log
            .get(processed.tx_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(processed.tx_id.to_string()))?;
        updated_tx.status = tx_status;
        if external_ref.is_some() {
            updated_tx.external_ref = external_ref.clone();
        }

        let mut batch = LedgerBatch {
            withdrawals: vec![processed.clone()],
            transactions: vec![updated_tx],
            ..Default::default()
        };
        if !success {
            let refunded = state
                .balances
                .get(&processed.requester)
                .saturating_add(processed.amount);
            batch
                .balances
                .push((processed.requester.clone(), refunded));
        }
        self.storage.commit(batch).await.map_err(storage_err)?;

        state.log.transition(processed.tx_id, tx_status, external_ref);
        if !success {
            state
                .balances
                .credit(&processed.requester, processed.amount);
        }
        let requester = processed.requester.clone();
        let amount = processed.amount;
        state.withdrawals.insert(processed);

        if success {
            info!(
                withdrawal_id = %id,
                requester = %requester,
                amount = amount.to_sats(),
                "✅ Withdrawal settled"
            );
        } else {
            info!(
                withdrawal_id = %id,
                requester = %requester,
                amount = amount.to_sats(),
                "❌ Withdrawal failed, amount credited back"
            );
        }
        Ok(())
    }

    /// Transfers a goodwill payment between users, no fee.
    pub async fn send_bonus(
        &self,
        caller: &AccountId,
        recipient: &AccountId,
        amount: Amount,
        note: Option<String>,
    ) -> Result<TxId> {
        let mut state = self.state.write().await;

        if caller.is_anonymous() {
            return Err(LedgerError::Unauthenticated);
        }
        let available = state.balances.get(caller);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        let tx = Transaction {
            id: TxId::new(state.next_tx_id),
            kind: TransactionKind::Bonus,
            from: caller.clone(),
            to: recipient.clone(),
            amount,
            fee: Amount::ZERO,
            task_id: None,
            created_at: Utc::now(),
            status: TransactionStatus::Completed,
            external_ref: None,
            note,
        };

        let mut batch = LedgerBatch {
            transactions: vec![tx.clone()],
            next_tx_id: Some(state.next_tx_id + 1),
            ..Default::default()
        };
        if caller == recipient {
            batch.balances.push((caller.clone(), available));
        } else {
            batch
                .balances
                .push((caller.clone(), available.saturating_sub(amount)));
            batch.balances.push((
                recipient.clone(),
                state.balances.get(recipient).saturating_add(amount),
            ));
        }
        self.storage.commit(batch).await.map_err(storage_err)?;

        state.next_tx_id += 1;
        state.balances.debit(caller, amount)?;
        state.balances.credit(recipient, amount);
        let tx_id = tx.id;
        state.log.append(tx);

        info!(
            from = %caller,
            to = %recipient,
            amount = amount.to_sats(),
            tx_id = %tx_id,
            "💰 Bonus sent"
        );
        Ok(tx_id)
    }

    /// Sets the platform fee for subsequent releases. Never retroactive.
    pub async fn set_fee_percent(&self, percent: u8) -> Result<()> {
        let mut state = self.state.write().await;

        if percent > MAX_FEE_PERCENT {
            return Err(LedgerError::FeeTooHigh {
                maximum: MAX_FEE_PERCENT,
                requested: percent,
            });
        }

        self.storage
            .commit(LedgerBatch {
                fee_percent: Some(percent),
                ..Default::default()
            })
            .await
            .map_err(storage_err)?;

        let previous = state.fee_percent;
        state.fee_percent = percent;

        info!(
            fee_before = previous,
            fee_after = percent,
            "⚙️ Platform fee updated"
        );
        Ok(())
    }

    // ======================== query surface ========================

    pub async fn balance(&self, account: &AccountId) -> Amount {
        let state = self.state.read().await;
        state.balances.get(account)
    }

    pub async fn transaction(&self, id: TxId) -> Option<Transaction> {
        let state = self.state.read().await;
        state.log.get(id).cloned()
    }

    /// Paginated history for one identity, newest first.
    pub async fn history(
        &self,
        account: &AccountId,
        offset: usize,
        limit: usize,
    ) -> Vec<Transaction> {
        let state = self.state.read().await;
        state.log.history(account, offset, limit)
    }

    pub async fn escrow(&self, task_id: TaskId) -> Option<Escrow> {
        let state = self.state.read().await;
        state.escrows.get(task_id).cloned()
    }

    /// Locked escrows whose expiry has passed; the caller drives any
    /// compensation, the ledger never refunds on its own.
    pub async fn expired_escrows(&self) -> Vec<Escrow> {
        let state = self.state.read().await;
        state.escrows.expired(Utc::now())
    }

    pub async fn withdrawal(&self, id: WithdrawalId) -> Option<WithdrawalRequest> {
        let state = self.state.read().await;
        state.withdrawals.get(id).cloned()
    }

    pub async fn withdrawals_for(&self, account: &AccountId) -> Vec<WithdrawalRequest> {
        let state = self.state.read().await;
        state.withdrawals.for_requester(account)
    }

    pub async fn stats(&self) -> LedgerStats {
        let state = self.state.read().await;
        LedgerStats {
            total_transactions: state.log.len(),
            total_volume: state.log.total_volume(),
            fees_collected: state.log.total_fees(),
            locked_escrows: state.escrows.locked_count(),
            locked_escrow_total: state.escrows.locked_total(),
            pending_withdrawals: state.withdrawals.pending_count(),
        }
    }

    pub async fn fee_percent(&self) -> u8 {
        let state = self.state.read().await;
        state.fee_percent
    }

    pub fn min_deposit(&self) -> Amount {
        self.min_deposit
    }

    pub fn min_withdrawal(&self) -> Amount {
        self.min_withdrawal
    }
}
