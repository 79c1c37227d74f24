//! One transaction at a time, chaining the gas coin from effect to effect.

use crate::caching::CachingTransactionExecutor;
use crate::config::{GasMode, SerialExecutorConfig};
use crate::epoch::EpochInfoCache;
use crate::error::ExecutorError;
use crate::queue::SerialQueue;
use std::sync::Arc;
use sui_ptb_builder::{ResolveContext, Transaction};
use sui_ptb_types::{ExecutedTransaction, ObjectRef, TransactionEffects};
use sui_transport::{LedgerClient, Signer, TransactionSerializer};
use tracing::{debug, warn};

const GAS_COIN_KEY: &str = "gasCoin";

/// Executes transactions strictly in submission order.
///
/// The gas coin reported in each transaction's effects pays for the next one,
/// so consecutive transactions never wait for the ledger's indexes. Any failure
/// resets the cache and the next transaction starts from fresh ledger state.
pub struct SerialTransactionExecutor {
    signer: Arc<dyn Signer>,
    client: Arc<dyn LedgerClient>,
    config: SerialExecutorConfig,
    cache: CachingTransactionExecutor,
    epoch: EpochInfoCache,
    queue: SerialQueue,
}

impl SerialTransactionExecutor {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        signer: Arc<dyn Signer>,
        serializer: Arc<dyn TransactionSerializer>,
        config: SerialExecutorConfig,
    ) -> Self {
        Self {
            epoch: EpochInfoCache::new(client.clone(), config.epoch_boundary_window),
            cache: CachingTransactionExecutor::new(client.clone(), serializer),
            signer,
            client,
            config,
            queue: SerialQueue::new(),
        }
    }

    pub fn config(&self) -> &SerialExecutorConfig {
        &self.config
    }

    pub fn caching_executor(&self) -> &CachingTransactionExecutor {
        &self.cache
    }

    /// Gas coin the next transaction will use, if one is known.
    pub fn gas_coin(&self) -> Option<ObjectRef> {
        self.cache.cache().get_custom(GAS_COIN_KEY)
    }

    /// Record effects produced outside this executor.
    pub fn apply_effects(&self, effects: &TransactionEffects) {
        self.cache.apply_effects(effects);
        self.cache_gas_coin(effects);
    }

    fn cache_gas_coin(&self, effects: &TransactionEffects) {
        if self.config.gas_mode == GasMode::AddressBalance {
            return;
        }
        let cache = self.cache.cache();
        match effects.gas_object().and_then(|c| c.written()) {
            Some((gas_ref, _)) => {
                if let Err(e) = cache.set_custom(GAS_COIN_KEY, &gas_ref) {
                    warn!(error = %e, "failed to cache gas coin");
                    cache.delete_custom(GAS_COIN_KEY);
                }
            }
            None => cache.delete_custom(GAS_COIN_KEY),
        }
    }

    /// Build `tx` with the cached gas coin without executing it.
    pub async fn build_transaction(&self, tx: &mut Transaction) -> Result<Vec<u8>, ExecutorError> {
        self.queue.run(self.build_locked(tx)).await
    }

    async fn build_locked(&self, tx: &mut Transaction) -> Result<Vec<u8>, ExecutorError> {
        tx.set_sender_if_not_set(self.signer.address());
        tx.prepare_for_serialization(&ResolveContext::new(self.client.as_ref()))
            .await?;

        let mut copy = tx.clone();
        match self.config.gas_mode {
            GasMode::AddressBalance => {
                copy.set_gas_payment(Vec::new());
                copy.set_expiration(self.epoch.valid_during_expiration().await?);
            }
            GasMode::Coins => {
                if let Some(gas_coin) = self.gas_coin() {
                    copy.set_gas_payment(vec![gas_coin]);
                }
            }
        }
        copy.set_gas_budget_if_not_set(self.config.default_gas_budget);
        self.cache.build_transaction(&mut copy).await
    }

    /// Build, sign and execute `tx` after every previously queued transaction.
    ///
    /// A transaction that executes with a failure status is returned as
    /// [`ExecutorError::ExecutionFailed`].
    pub async fn execute_transaction(
        &self,
        tx: &mut Transaction,
        additional_signatures: &[String],
    ) -> Result<ExecutedTransaction, ExecutorError> {
        self.queue
            .run(async {
                let result = match self.build_locked(tx).await {
                    Ok(bytes) => self.submit(&bytes, additional_signatures).await,
                    Err(e) => Err(e),
                };
                self.finish(result).await
            })
            .await
    }

    /// Sign and execute bytes built elsewhere.
    pub async fn execute_bytes(
        &self,
        tx_bytes: &[u8],
        additional_signatures: &[String],
    ) -> Result<ExecutedTransaction, ExecutorError> {
        self.queue
            .run(async {
                let result = self.submit(tx_bytes, additional_signatures).await;
                self.finish(result).await
            })
            .await
    }

    async fn submit(
        &self,
        tx_bytes: &[u8],
        additional_signatures: &[String],
    ) -> Result<ExecutedTransaction, ExecutorError> {
        let signature = self
            .signer
            .sign_transaction(tx_bytes)
            .await
            .map_err(ExecutorError::Submission)?;
        let mut signatures = Vec::with_capacity(1 + additional_signatures.len());
        signatures.push(signature);
        signatures.extend_from_slice(additional_signatures);

        let executed = self.cache.execute_transaction(tx_bytes, &signatures).await?;
        self.cache_gas_coin(&executed.effects);
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
        debug!(digest = %executed.digest, "serial executor committed transaction");
        Ok(executed)
    }

    async fn finish(
        &self,
        result: Result<ExecutedTransaction, ExecutorError>,
    ) -> Result<ExecutedTransaction, ExecutorError> {
        if let Err(e) = &result {
            warn!(error = %e, stage = %e.stage(), "serial execution failed, resetting cache");
            if let Err(reset_err) = self.reset_cache().await {
                warn!(error = %reset_err, "cache reset after failure also failed");
            }
        }
        result
    }

    pub async fn reset_cache(&self) -> Result<(), ExecutorError> {
        self.epoch.invalidate().await;
        self.cache.reset().await
    }

    pub async fn wait_for_last_transaction(&self) -> Result<(), ExecutorError> {
        self.cache.wait_for_last_transaction().await
    }
}
