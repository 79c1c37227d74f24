//! Parallel transaction executor.
//!
//! Transactions touching disjoint owned objects are submitted concurrently,
//! each paying gas with its own coin from a pool (or from the sender's address
//! balance). Transactions sharing an owned object wait for each other in
//! arrival order. The pool is refilled on demand by splitting fresh coins off
//! the sender's funds.
//!
//! # Flow
//!
//! ```text
//! execute_transaction
//!   ├─ prepare (intents, object resolution)
//!   ├─ lock owned inputs          (per-object FIFO)
//!   ├─ acquire an execution slot  (at most `max_pool_size` in flight)
//!   ├─ build queue                (one at a time)
//!   │    ├─ gas price, budget
//!   │    ├─ checkout gas coin  ─► refill when the pool is empty
//!   │    └─ cached object versions
//!   ├─ build, sign, execute
//!   └─ settle: return or retire the coin, or evict cache entries on failure
//! ```

use crate::caching::CachingTransactionExecutor;
use crate::config::{GasMode, ParallelExecutorConfig};
use crate::epoch::EpochInfoCache;
use crate::error::ExecutorError;
use crate::pool::{CheckedOutCoin, CoinPool, PoolStats, PooledCoin};
use crate::queue::{ObjectLocks, SerialQueue};
use anyhow::anyhow;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sui_ptb_builder::{ResolveContext, Transaction, MAX_GAS_OBJECTS};
use sui_ptb_types::{
    balance_type, sui_type, Argument, CallArg, ExecutedTransaction, IdOperation, ObjectId,
    ObjectRef, Owner, SuiAddress, TransactionEffects, WithdrawFrom,
};
use sui_transport::{LedgerClient, Signer, TransactionSerializer};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

const REFILL_COIN_PAGE_SIZE: usize = 50;

/// Executes independent transactions concurrently with a pool of gas coins.
///
/// ```ignore
/// let executor = ParallelTransactionExecutor::new(client, signer, serializer, config)?;
/// let results = futures::future::join_all(
///     transactions.into_iter().map(|tx| executor.execute_transaction(tx, &[])),
/// )
/// .await;
/// ```
pub struct ParallelTransactionExecutor {
    signer: Arc<dyn Signer>,
    client: Arc<dyn LedgerClient>,
    serializer: Arc<dyn TransactionSerializer>,
    config: ParallelExecutorConfig,
    cache: CachingTransactionExecutor,
    epoch: EpochInfoCache,
    pool: Mutex<CoinPool>,
    object_locks: ObjectLocks,
    build_queue: SerialQueue,
    slots: Semaphore,
    /// Held while the cache is repaired after a failure; builds wait for it.
    cache_update: tokio::sync::Mutex<()>,
    pending: AtomicUsize,
    reserved: Mutex<u128>,
    settle: SettleTracker,
}

impl ParallelTransactionExecutor {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        signer: Arc<dyn Signer>,
        serializer: Arc<dyn TransactionSerializer>,
        config: ParallelExecutorConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        info!(
            max_pool_size = config.max_pool_size,
            gas_mode = %config.gas_mode,
            sender = %signer.address(),
            "starting parallel executor"
        );
        Ok(Self {
            epoch: EpochInfoCache::new(client.clone(), config.epoch_boundary_window),
            cache: CachingTransactionExecutor::new(client.clone(), serializer.clone()),
            pool: Mutex::new(CoinPool::new(config.source_coins.clone())),
            object_locks: ObjectLocks::new(),
            build_queue: SerialQueue::new(),
            slots: Semaphore::new(config.max_pool_size),
            cache_update: tokio::sync::Mutex::new(()),
            pending: AtomicUsize::new(0),
            reserved: Mutex::new(0),
            settle: SettleTracker::default(),
            signer,
            client,
            serializer,
            config,
        })
    }

    pub fn config(&self) -> &ParallelExecutorConfig {
        &self.config
    }

    pub fn caching_executor(&self) -> &CachingTransactionExecutor {
        &self.cache
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            pending_transactions: self.pending.load(Ordering::SeqCst),
            reserved_balance: *self.reserved.lock(),
            ..self.pool.lock().stats()
        }
    }

    /// Coins currently available for checkout, in checkout order.
    pub fn available_coins(&self) -> Vec<PooledCoin> {
        self.pool.lock().available()
    }

    /// Build, sign and execute `tx`.
    ///
    /// Returns once the transaction has executed. A transaction executed with
    /// a failure status is returned as [`ExecutorError::ExecutionFailed`].
    pub async fn execute_transaction(
        &self,
        mut tx: Transaction,
        additional_signatures: &[String],
    ) -> Result<ExecutedTransaction, ExecutorError> {
        let _ticket = self.settle.begin();
        tx.set_sender_if_not_set(self.signer.address());
        tx.prepare_for_serialization(&ResolveContext::new(self.client.as_ref()))
            .await?;

        let used = tx.owned_object_ids();
        let _objects = self.object_locks.acquire(&used).await;
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|e| ExecutorError::Submission(e.into()))?;

        let (_pending, lease) = self.build_queue.run(self.stamp(&mut tx)).await?;
        let result = self.submit(&mut tx, additional_signatures).await;

        match result {
            Ok(executed) => {
                match lease {
                    GasLease::Coin(coin) => self.settle_gas_coin(coin, &tx, &executed.effects),
                    GasLease::Reserved(reservation) => drop(reservation),
                }
                debug!(digest = %executed.digest, "parallel executor committed transaction");
                Ok(executed)
            }
            Err(e) => {
                match lease {
                    GasLease::Coin(coin) => coin.retire(None),
                    GasLease::Reserved(reservation) => drop(reservation),
                }
                warn!(error = %e, objects = used.len(), "transaction failed, evicting its objects");
                let _update = self.cache_update.lock().await;
                self.cache.cache().delete_objects(&used);
                if let Err(wait) = self.cache.wait_for_last_transaction().await {
                    warn!(error = %wait, "waiting for last transaction failed");
                }
                Err(e)
            }
        }
    }

    /// Set gas price, budget and payment. Runs inside the build queue.
    async fn stamp(
        &self,
        tx: &mut Transaction,
    ) -> Result<(PendingGuard<'_>, GasLease<'_>), ExecutorError> {
        if tx.data().gas_data.price.is_none() {
            tx.set_gas_price(self.epoch.reference_gas_price().await?);
        }
        tx.set_gas_budget_if_not_set(self.config.gas_budget());
        drop(self.cache_update.lock().await);

        let pending = PendingGuard::new(&self.pending);
        let lease = match self.config.gas_mode {
            GasMode::AddressBalance => {
                tx.set_gas_payment(Vec::new());
                tx.set_expiration(self.epoch.valid_during_expiration().await?);
                let budget = tx
                    .data()
                    .gas_data
                    .budget
                    .unwrap_or_else(|| self.config.gas_budget());
                let required = budget.saturating_add(sui_withdrawals(tx.inputs()));
                GasLease::Reserved(self.reserve(required).await?)
            }
            GasMode::Coins => {
                let coin = self.checkout_gas_coin().await?;
                let payment = coin.object_ref().cloned().into_iter().collect();
                tx.set_gas_payment(payment);
                GasLease::Coin(coin)
            }
        };
        self.cache.cache().resolve_inputs(tx)?;
        Ok((pending, lease))
    }

    async fn submit(
        &self,
        tx: &mut Transaction,
        additional_signatures: &[String],
    ) -> Result<ExecutedTransaction, ExecutorError> {
        let bytes = tx
            .build(
                &ResolveContext::new(self.client.as_ref()),
                self.serializer.as_ref(),
            )
            .await?;
        let signature = self
            .signer
            .sign_transaction(&bytes)
            .await
            .map_err(ExecutorError::Submission)?;
        let mut signatures = Vec::with_capacity(1 + additional_signatures.len());
        signatures.push(signature);
        signatures.extend_from_slice(additional_signatures);

        let executed = self.cache.execute_transaction(&bytes, &signatures).await?;
        if !executed.effects.is_success() {
            return Err(ExecutorError::ExecutionFailed {
                digest: executed.digest,
                error: executed
                    .effects
                    .failure_reason()
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }
        Ok(executed)
    }

    /// Return the gas coin to the pool, or retire it when it was spent from
    /// or ran low.
    fn settle_gas_coin(
        &self,
        coin: CheckedOutCoin<'_>,
        tx: &Transaction,
        effects: &TransactionEffects,
    ) {
        let sender = self.signer.address();
        let Some((gas_ref, gas_owner)) = effects.gas_object().and_then(|c| c.written()) else {
            coin.retire(None);
            return;
        };
        if gas_owner != Owner::AddressOwner(sender) {
            debug!(coin = %gas_ref.object_id, "gas coin left the sender, dropping it");
            coin.forget();
            return;
        }

        let remaining = coin.balance() as i128 - effects.gas_used.net_gas_usage();
        if !tx.uses_gas_coin() && remaining >= self.config.minimum_coin_balance as i128 {
            coin.release(PooledCoin {
                object_ref: gas_ref,
                balance: u64::try_from(remaining).unwrap_or(u64::MAX),
            });
        } else {
            coin.retire(Some(gas_ref));
        }
    }

    async fn checkout_gas_coin(&self) -> Result<CheckedOutCoin<'_>, ExecutorError> {
        let empty = self.pool.lock().available_len() == 0;
        if empty && self.pending.load(Ordering::SeqCst) <= self.config.max_pool_size {
            self.refill().await?;
        }
        CheckedOutCoin::checkout(&self.pool).ok_or(ExecutorError::PoolExhausted)
    }

    /// Reserve `amount` of the sender's address balance for one transaction,
    /// net of what in-flight transactions already hold.
    async fn reserve(&self, amount: u64) -> Result<Reservation<'_>, ExecutorError> {
        let balance = self
            .client
            .get_balance(self.signer.address(), &sui_type())
            .await
            .map_err(ExecutorError::Submission)?;
        let mut reserved = self.reserved.lock();
        let available = (balance.address_balance as u128).saturating_sub(*reserved);
        if available < amount as u128 {
            return Err(ExecutorError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        *reserved += amount as u128;
        Ok(Reservation {
            reserved: &self.reserved,
            amount: amount as u128,
        })
    }

    /// Split a batch of fresh coins off the refill sources. Runs inside the
    /// build queue.
    async fn refill(&self) -> Result<(), ExecutorError> {
        let available = self.pool.lock().available_len();
        let pending = self.pending.load(Ordering::SeqCst);
        let batch = self
            .config
            .coin_batch_size
            .min((self.config.max_pool_size + 1).saturating_sub(available + pending))
            .min(u16::MAX as usize);
        if batch == 0 {
            return Ok(());
        }

        let owner = self.signer.address();
        let taken = self.pool.lock().take_sources().unwrap_or_default();
        let mut spent: Vec<ObjectId> = Vec::new();
        let result = match self.refill_payment(owner, &taken).await {
            Ok(payment) => {
                spent = payment.iter().map(|r| r.object_id).collect();
                self.execute_refill(owner, payment, batch).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(error = %e, sources = taken.len(), "refill failed, keeping its sources");
            // Coins offered as payment may have changed version; the rest are untouched.
            let mut pool = self.pool.lock();
            pool.restore_sources(spent.iter().map(|id| (*id, None)));
            pool.restore_sources(taken);
        }
        result
    }

    async fn execute_refill(
        &self,
        owner: SuiAddress,
        payment: Vec<ObjectRef>,
        batch: usize,
    ) -> Result<(), ExecutorError> {
        let mut tx = Transaction::new();
        tx.set_sender(owner);
        tx.set_gas_payment(payment);
        tx.set_gas_budget(self.config.gas_budget());
        tx.set_gas_price(self.epoch.reference_gas_price().await?);
        let amount = tx.pure_u64(self.config.initial_coin_balance)?;
        let split = tx.split_coins(Argument::GasCoin, vec![amount; batch])?;
        let coins = (0..batch as u16).map(|i| split.nested(i)).collect();
        let recipient = tx.pure_address(owner)?;
        tx.transfer_objects(coins, recipient)?;

        self.cache.wait_for_last_transaction().await?;
        let bytes = tx
            .build(
                &ResolveContext::new(self.client.as_ref()),
                self.serializer.as_ref(),
            )
            .await?;
        let signature = self
            .signer
            .sign_transaction(&bytes)
            .await
            .map_err(ExecutorError::Refill)?;
        let executed = self
            .client
            .execute_transaction(&bytes, &[signature])
            .await
            .map_err(ExecutorError::Refill)?;

        let effects = &executed.effects;
        let gas = effects.gas_object().and_then(|c| c.written());
        if !effects.is_success() {
            if let Some((gas_ref, _)) = gas {
                self.pool.lock().add_source(gas_ref.object_id, Some(gas_ref));
            }
            return Err(ExecutorError::Refill(anyhow!(
                "refill transaction {} failed: {}",
                executed.digest,
                effects.failure_reason().unwrap_or("unknown")
            )));
        }

        let coins: Vec<PooledCoin> = effects
            .created()
            .filter(|c| c.id_operation == IdOperation::Created)
            .filter_map(|c| c.written())
            .filter(|(_, coin_owner)| *coin_owner == Owner::AddressOwner(owner))
            .map(|(object_ref, _)| PooledCoin {
                object_ref,
                balance: self.config.initial_coin_balance,
            })
            .collect();
        let created = coins.len();
        {
            let mut pool = self.pool.lock();
            pool.add_coins(coins);
            if let Some((gas_ref, _)) = gas {
                pool.add_source(gas_ref.object_id, Some(gas_ref));
            }
            pool.record_refill();
        }
        info!(digest = %executed.digest, coins = created, "refilled gas pool");

        self.client
            .wait_for_transaction(&executed.digest)
            .await
            .map_err(ExecutorError::Refill)
    }

    /// Gas payment for a refill: the known sources, fetching any whose version
    /// is unknown, or every other SUI coin of the sender.
    async fn refill_payment(
        &self,
        owner: SuiAddress,
        sources: &[(ObjectId, Option<ObjectRef>)],
    ) -> Result<Vec<ObjectRef>, ExecutorError> {
        let mut payment = Vec::new();
        let mut unknown = Vec::new();
        for (id, latest) in sources {
            match latest {
                Some(object_ref) => payment.push(object_ref.clone()),
                None => unknown.push(*id),
            }
        }
        if !unknown.is_empty() {
            let fetched = self
                .client
                .get_objects(&unknown)
                .await
                .map_err(ExecutorError::Refill)?;
            payment.extend(
                fetched
                    .into_iter()
                    .flatten()
                    .filter(|info| info.owner == Owner::AddressOwner(owner))
                    .map(|info| info.object_ref),
            );
        }
        if payment.is_empty() {
            payment = self.discover_coins(owner).await?;
        }
        if payment.is_empty() {
            return Err(ExecutorError::Refill(anyhow!(
                "{} owns no SUI coins to fund the gas pool",
                owner
            )));
        }
        if payment.len() > MAX_GAS_OBJECTS {
            let rest = payment.split_off(MAX_GAS_OBJECTS);
            let mut pool = self.pool.lock();
            for object_ref in rest {
                pool.add_source(object_ref.object_id, Some(object_ref));
            }
        }
        Ok(payment)
    }

    async fn discover_coins(&self, owner: SuiAddress) -> Result<Vec<ObjectRef>, ExecutorError> {
        let known = self.pool.lock().pool_ids();
        let sui = sui_type();
        let mut coins = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .client
                .list_coins(owner, &sui, cursor.take(), REFILL_COIN_PAGE_SIZE)
                .await
                .map_err(ExecutorError::Refill)?;
            coins.extend(
                page.coins
                    .into_iter()
                    .filter(|coin| !known.contains(&coin.object_ref.object_id))
                    .map(|coin| coin.object_ref),
            );
            if !page.has_next_page || coins.len() >= MAX_GAS_OBJECTS {
                break;
            }
            cursor = page.next_cursor;
        }
        debug!(coins = coins.len(), "discovered refill sources");
        Ok(coins)
    }

    /// Forget cached versions and epoch info. Available coins become refill
    /// sources; coins checked out to in-flight transactions are settled by them.
    pub async fn reset_cache(&self) -> Result<(), ExecutorError> {
        self.epoch.invalidate().await;
        let _update = self.cache_update.lock().await;
        self.pool.lock().reset();
        self.cache.reset().await
    }

    /// Wait for every transaction started before this call, then for the last
    /// executed one to be indexed.
    pub async fn wait_for_last_transaction(&self) -> Result<(), ExecutorError> {
        self.settle.wait().await;
        let _update = self.cache_update.lock().await;
        self.cache.wait_for_last_transaction().await
    }
}

/// Upper bound of the SUI the transaction withdraws from the sender's
/// address balance, on top of gas.
fn sui_withdrawals(inputs: &[CallArg]) -> u64 {
    let sui_balance = balance_type(sui_type());
    inputs
        .iter()
        .filter_map(|input| match input {
            CallArg::FundsWithdrawal(w)
                if w.withdraw_from == WithdrawFrom::Sender && w.balance_type == sui_balance =>
            {
                Some(w.max_amount)
            }
            _ => None,
        })
        .fold(0u64, u64::saturating_add)
}

enum GasLease<'a> {
    Coin(CheckedOutCoin<'a>),
    Reserved(Reservation<'a>),
}

/// Address-balance gas reserved by one in-flight transaction.
struct Reservation<'a> {
    reserved: &'a Mutex<u128>,
    amount: u128,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut reserved = self.reserved.lock();
        *reserved = reserved.saturating_sub(self.amount);
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn new(pending: &'a AtomicUsize) -> Self {
        pending.fetch_add(1, Ordering::SeqCst);
        Self(pending)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct SettleState {
    next: u64,
    in_flight: BTreeSet<u64>,
}

/// Tracks in-flight transactions so callers can wait for everything started
/// before a given point.
#[derive(Debug, Default)]
struct SettleTracker {
    state: Mutex<SettleState>,
    settled: Notify,
}

struct Ticket<'a> {
    tracker: &'a SettleTracker,
    id: u64,
}

impl SettleTracker {
    fn begin(&self) -> Ticket<'_> {
        let mut state = self.state.lock();
        let id = state.next;
        state.next += 1;
        state.in_flight.insert(id);
        Ticket { tracker: self, id }
    }

    /// Resolves once every ticket issued before this call is dropped.
    fn wait(&self) -> impl Future<Output = ()> + '_ {
        let horizon = self.state.lock().next;
        async move {
            loop {
                let mut notified = std::pin::pin!(self.settled.notified());
                notified.as_mut().enable();
                let oldest = self.state.lock().in_flight.first().copied();
                if oldest.map_or(true, |id| id >= horizon) {
                    return;
                }
                notified.await;
            }
        }
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.tracker.state.lock().in_flight.remove(&self.id);
        self.tracker.settled.notify_waiters();
    }
}
