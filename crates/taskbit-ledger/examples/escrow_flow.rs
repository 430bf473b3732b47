use std::sync::Arc;
use taskbit_ledger::{
    AccountId, Amount, LedgerConfig, LedgerError, MemoryStorage, PaymentService, TaskId,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskbit=info".into()),
        )
        .init();

    println!("Taskbit Escrow Flow Demo");
    println!("========================\n");

    let storage = Arc::new(MemoryStorage::new());
    let ledger = PaymentService::new(storage, LedgerConfig::default()).await?;

    let requester = AccountId::from("alice");
    let worker = AccountId::from("bob");
    let task = TaskId::new(7);

    // 1. The external settlement process confirms an on-chain deposit.
    println!("1. Deposit");
    ledger
        .deposit(&requester, Amount::from_sats(100_000), "btc:deadbeef".to_string())
        .await?;
    println!("   alice: {}\n", ledger.balance(&requester).await);

    // 2. The task board locks the reward when the task is created.
    println!("2. Lock escrow for {}", task);
    ledger
        .lock_escrow(&requester, task, Amount::from_sats(50_000), None)
        .await?;
    println!("   alice: {}", ledger.balance(&requester).await);
    let escrow = ledger.escrow(task).await.expect("escrow just locked");
    println!("   escrow: {} locked by {}\n", escrow.amount, escrow.payer);

    // 3. The requester approves the work; the worker is paid net of fee.
    println!("3. Release at {}% fee", ledger.fee_percent().await);
    ledger.release_escrow(&requester, task, &worker).await?;
    println!("   bob: {}\n", ledger.balance(&worker).await);

    // 4. A second release attempt is rejected.
    println!("4. Double release");
    match ledger.release_escrow(&requester, task, &worker).await {
        Err(LedgerError::AlreadyReleased(task)) => {
            println!("   rejected as expected for {}\n", task)
        }
        other => anyhow::bail!("unexpected result: {:?}", other),
    }

    // 5. The worker withdraws; settlement is confirmed later.
    println!("5. Withdraw");
    let withdrawal = ledger
        .request_withdrawal(&worker, Amount::from_sats(40_000), "bc1qworker".to_string())
        .await?;
    println!("   requested {}, bob now {}", withdrawal, ledger.balance(&worker).await);
    ledger
        .process_withdrawal(withdrawal, Some("btc:cafebabe".to_string()), true)
        .await?;
    println!("   settled\n");

    let stats = ledger.stats().await;
    println!("Ledger stats");
    println!("   transactions: {}", stats.total_transactions);
    println!("   volume:       {}", stats.total_volume);
    println!("   fees:         {}", stats.fees_collected);

    Ok(())
}
