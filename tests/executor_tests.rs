//! Executor tests against the mock ledger.
//!
//! The ledger rejects any submission that touches an object another in-flight
//! submission holds, so `lock_conflicts == 0` means the executor never stamped
//! two concurrent transactions with the same gas coin or owned input.

mod common;

use common::{addr, funded_ledger, mint_zero, signer, RECIPIENT, SENDER};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use sui_ptb::types::{sui_type, Owner};
use sui_ptb::{
    BcsTransactionSerializer, CoinWithBalance, ExecutorError, GasMode, ParallelExecutorConfig,
    ParallelTransactionExecutor, SerialExecutorConfig, SerialTransactionExecutor, Transaction,
};
use sui_transport::MockLedger;

const LATENCY: Duration = Duration::from_millis(20);

fn parallel(
    ledger: &Arc<MockLedger>,
    config: ParallelExecutorConfig,
) -> ParallelTransactionExecutor {
    ParallelTransactionExecutor::new(
        ledger.clone(),
        signer(),
        Arc::new(BcsTransactionSerializer),
        config,
    )
    .unwrap()
}

// =============================================================================
// Parallel executor
// =============================================================================

#[tokio::test]
async fn test_concurrent_submissions_never_share_a_gas_coin() {
    let ledger = funded_ledger(10_000_000_000, LATENCY);
    let executor = parallel(&ledger, ParallelExecutorConfig::default().with_max_pool_size(8));

    let results = join_all(
        (0..8).map(|_| executor.execute_transaction(mint_zero(addr(RECIPIENT)), &[])),
    )
    .await;
    let executed: Vec<_> = results.into_iter().map(Result::unwrap).collect();

    let gas_coins: HashSet<_> = executed
        .iter()
        .filter_map(|e| e.effects.gas_object().map(|g| g.object_id))
        .collect();
    assert_eq!(gas_coins.len(), 8);
    assert_eq!(ledger.stats().lock_conflicts, 0);
    assert_eq!(ledger.coins_owned_by(addr(RECIPIENT), &sui_type()).len(), 8);

    let stats = executor.pool_stats();
    assert_eq!(stats.available, 8);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.refills, 1);
}

#[tokio::test]
async fn test_transactions_sharing_an_owned_object_run_in_order() {
    let ledger = funded_ledger(10_000_000_000, LATENCY);
    let object = ledger.create_object(Owner::AddressOwner(addr(SENDER)), None);
    let executor = parallel(&ledger, ParallelExecutorConfig::default().with_max_pool_size(4));

    let touch = |function: &str| {
        let mut tx = Transaction::new();
        let obj = tx.object(object.object_id).unwrap();
        tx.move_call(addr("0xcafe"), "vault", function, vec![], vec![obj])
            .unwrap();
        tx
    };
    let results = join_all(vec![
        executor.execute_transaction(touch("deposit"), &[]),
        executor.execute_transaction(touch("withdraw"), &[]),
        executor.execute_transaction(mint_zero(addr(RECIPIENT)), &[]),
    ])
    .await;

    assert!(results.iter().all(Result::is_ok), "{:?}", results);
    assert_eq!(ledger.stats().lock_conflicts, 0);
    assert_eq!(ledger.stats().rejected, 0);
    let latest = ledger.object_ref(&object.object_id).unwrap();
    assert_eq!(
        executor
            .caching_executor()
            .cache()
            .get_object(&object.object_id)
            .map(|cached| cached.object_ref),
        Some(latest)
    );
}

#[tokio::test]
async fn test_failed_submission_coin_never_returns_to_pool() {
    let ledger = funded_ledger(10_000_000_000, LATENCY);
    let executor = parallel(&ledger, ParallelExecutorConfig::default().with_max_pool_size(4));

    // Warm the pool: the first transaction triggers the refill.
    executor
        .execute_transaction(mint_zero(addr(RECIPIENT)), &[])
        .await
        .unwrap();
    assert_eq!(executor.pool_stats().available, 4);

    ledger.fail_next_executions(1);
    let results = join_all(
        (0..4).map(|_| executor.execute_transaction(mint_zero(addr(RECIPIENT)), &[])),
    )
    .await;
    let failed: Vec<_> = results
        .iter()
        .filter(|r| matches!(r, Err(ExecutorError::ExecutionFailed { .. })))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);

    let stats = executor.pool_stats();
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.available, 3);
    // Every coin still in rotation matches the ledger exactly.
    for coin in executor.available_coins() {
        assert_eq!(ledger.object_ref(&coin.object_id()), Some(coin.object_ref.clone()));
        assert_eq!(ledger.coin_balance(&coin.object_id()), Some(coin.balance));
    }
}

#[tokio::test]
async fn test_refill_spends_only_configured_source_coins() {
    let ledger = funded_ledger(0, LATENCY);
    let sender = addr(SENDER);
    let first = ledger.mint_sui(sender, 300_000_000);
    let second = ledger.mint_sui(sender, 300_000_000);
    let untouched = ledger.mint_sui(sender, 5_000_000_000);
    let executor = parallel(
        &ledger,
        ParallelExecutorConfig::default()
            .with_max_pool_size(2)
            .with_source_coins(vec![first.object_id, second.object_id]),
    );

    executor
        .execute_transaction(mint_zero(addr(RECIPIENT)), &[])
        .await
        .unwrap();

    // Both sources paid the refill and were merged into the first one.
    assert_eq!(ledger.object_ref(&second.object_id), None);
    assert_eq!(
        ledger.coin_balance(&first.object_id),
        Some(600_000_000 - 2 * 200_000_000 - 2_000_000)
    );
    assert_eq!(ledger.object_ref(&untouched.object_id), Some(untouched));

    let stats = executor.pool_stats();
    assert_eq!(stats.refills, 1);
    assert_eq!(stats.source_coins, 1);
    assert_eq!(stats.available, 2);
}

#[tokio::test]
async fn test_address_balance_mode_pays_without_coins() {
    let ledger = funded_ledger(0, LATENCY);
    let sender = addr(SENDER);
    ledger.set_address_balance(sender, sui_type(), 500_000_000);
    let executor = parallel(
        &ledger,
        ParallelExecutorConfig::default()
            .with_max_pool_size(3)
            .with_gas_mode(GasMode::AddressBalance),
    );

    let results = join_all(
        (0..3).map(|_| executor.execute_transaction(mint_zero(addr(RECIPIENT)), &[])),
    )
    .await;
    assert!(results.iter().all(Result::is_ok));
    for executed in results.into_iter().flatten() {
        assert!(executed.effects.gas_object().is_none());
    }
    assert_eq!(ledger.address_balance(sender, &sui_type()), 500_000_000 - 3 * 2_000_000);
    assert_eq!(executor.pool_stats().reserved_balance, 0);
    assert_eq!(executor.pool_stats().refills, 0);
    executor.wait_for_last_transaction().await.unwrap();
}

// =============================================================================
// Serial executor
// =============================================================================

#[tokio::test]
async fn test_serial_executor_reuses_gas_coin_from_effects() {
    let ledger = funded_ledger(1_000_000_000, Duration::ZERO);
    let executor = SerialTransactionExecutor::new(
        ledger.clone(),
        signer(),
        Arc::new(BcsTransactionSerializer),
        SerialExecutorConfig::default(),
    );

    for amount in [10, 20, 30] {
        let mut tx = Transaction::new();
        let coin = tx.coin_with_balance(CoinWithBalance::sui(amount)).unwrap();
        let to = tx.pure_address(addr(RECIPIENT)).unwrap();
        tx.transfer_objects(vec![coin], to).unwrap();
        executor.execute_transaction(&mut tx, &[]).await.unwrap();
    }

    // Only the first build had to look up a gas coin.
    let gas = executor.gas_coin().unwrap();
    assert_eq!(ledger.object_ref(&gas.object_id), Some(gas.clone()));
    assert_eq!(
        ledger.coin_balance(&gas.object_id),
        Some(1_000_000_000 - 60 - 3 * 2_000_000)
    );
    assert_eq!(ledger.stats().rejected, 0);
}
