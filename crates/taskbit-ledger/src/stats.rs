use serde::{Deserialize, Serialize};
use taskbit_types::Amount;

/// Point-in-time aggregate view of the ledger.
///
/// Snapshot struct filled by the payment service under its read guard, so
/// every field reflects the same consistent state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_transactions: u64,
    /// Sum of the gross amounts of every recorded transaction.
    pub total_volume: Amount,
    /// Fees withheld at escrow release. Not held by any account.
    pub fees_collected: Amount,
    pub locked_escrows: u64,
    pub locked_escrow_total: Amount,
    pub pending_withdrawals: u64,
}
