pub mod balance;
pub mod config;
pub mod escrow;
pub mod service;
pub mod stats;
pub mod storage;
pub mod transaction;
pub mod withdrawal;

pub use balance::BalanceBook;
pub use config::{LedgerConfig, MAX_FEE_PERCENT};
pub use escrow::{Escrow, EscrowTable};
pub use service::PaymentService;
pub use stats::LedgerStats;
pub use storage::{LedgerBatch, LedgerSnapshot, LedgerStorage, MemoryStorage};
pub use transaction::{Transaction, TransactionKind, TransactionLog, TransactionStatus};
pub use withdrawal::{WithdrawalQueue, WithdrawalRequest, WithdrawalStatus};

pub use taskbit_types::{AccountId, Amount, LedgerError, Result, TaskId, TxId, WithdrawalId};
