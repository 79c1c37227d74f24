//! Build and execute transactions through an [`ObjectCache`].

use crate::cache::ObjectCache;
use crate::error::ExecutorError;
use parking_lot::Mutex;
use std::sync::Arc;
use sui_ptb_builder::{ResolveContext, Transaction};
use sui_ptb_types::{ExecutedTransaction, TransactionEffects};
use sui_transport::{LedgerClient, Signer, TransactionSerializer};
use tracing::debug;

/// Executes transactions and keeps an [`ObjectCache`] current from their effects.
pub struct CachingTransactionExecutor {
    client: Arc<dyn LedgerClient>,
    serializer: Arc<dyn TransactionSerializer>,
    cache: ObjectCache,
    last_digest: Mutex<Option<String>>,
}

impl CachingTransactionExecutor {
    pub fn new(client: Arc<dyn LedgerClient>, serializer: Arc<dyn TransactionSerializer>) -> Self {
        Self {
            client,
            serializer,
            cache: ObjectCache::new(),
            last_digest: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub fn client(&self) -> &dyn LedgerClient {
        self.client.as_ref()
    }

    /// Drop owned objects and custom entries, then wait for the last transaction
    /// to be indexed. Shared and immutable entries are kept.
    pub async fn reset(&self) -> Result<(), ExecutorError> {
        self.cache.clear_owned_objects();
        self.cache.clear_custom();
        self.wait_for_last_transaction().await
    }

    /// Fill inputs from the cache, then build against the ledger.
    pub async fn build_transaction(&self, tx: &mut Transaction) -> Result<Vec<u8>, ExecutorError> {
        self.cache.resolve_inputs(tx)?;
        let ctx = ResolveContext::new(self.client.as_ref());
        Ok(tx.build(&ctx, self.serializer.as_ref()).await?)
    }

    /// Submit signed bytes and record the effects, whatever the execution status.
    pub async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[String],
    ) -> Result<ExecutedTransaction, ExecutorError> {
        let executed = self
            .client
            .execute_transaction(tx_bytes, signatures)
            .await
            .map_err(ExecutorError::Submission)?;
        self.apply_effects(&executed.effects);
        Ok(executed)
    }

    pub async fn sign_and_execute_transaction(
        &self,
        tx: &mut Transaction,
        signer: &dyn Signer,
    ) -> Result<ExecutedTransaction, ExecutorError> {
        tx.set_sender_if_not_set(signer.address());
        let bytes = self.build_transaction(tx).await?;
        let signature = signer
            .sign_transaction(&bytes)
            .await
            .map_err(ExecutorError::Submission)?;
        self.execute_transaction(&bytes, &[signature]).await
    }

    pub fn apply_effects(&self, effects: &TransactionEffects) {
        *self.last_digest.lock() = Some(effects.transaction_digest.clone());
        self.cache.apply_effects(effects);
    }

    pub fn last_digest(&self) -> Option<String> {
        self.last_digest.lock().clone()
    }

    /// Wait until the last executed transaction is indexed.
    pub async fn wait_for_last_transaction(&self) -> Result<(), ExecutorError> {
        let digest = self.last_digest.lock().take();
        if let Some(digest) = digest {
            debug!(digest = %digest, "waiting for last transaction");
            self.client
                .wait_for_transaction(&digest)
                .await
                .map_err(ExecutorError::Submission)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_core_types::account_address::AccountAddress;
    use sui_ptb_types::{sui_type, Argument, SuiAddress};
    use sui_transport::{BcsTransactionSerializer, MockLedger, MockSigner};

    fn addr(s: &str) -> SuiAddress {
        AccountAddress::from_hex_literal(s).unwrap()
    }

    #[tokio::test]
    async fn test_second_transaction_uses_cached_versions() {
        let ledger = Arc::new(MockLedger::new());
        let sender = addr("0xa11ce");
        let gas = ledger.mint_sui(sender, 1_000_000_000);
        let coin = ledger.mint_sui(sender, 1_000);
        let executor =
            CachingTransactionExecutor::new(ledger.clone(), Arc::new(BcsTransactionSerializer));
        let signer = MockSigner::new(sender);

        for _ in 0..2 {
            let mut tx = Transaction::new();
            tx.set_gas_budget(10_000_000);
            tx.set_gas_payment(vec![executor
                .cache()
                .get_object(&gas.object_id)
                .map(|c| c.object_ref)
                .unwrap_or_else(|| gas.clone())]);
            // Stale reference on purpose: the cache moves it to the latest version.
            let input = tx.object_ref(coin.clone()).unwrap();
            let amount = tx.pure_u64(1).unwrap();
            tx.split_coins(input, vec![amount]).unwrap();
            let to = tx.pure_address(sender).unwrap();
            tx.transfer_objects(vec![Argument::NestedResult(0, 0)], to)
                .unwrap();

            let executed = executor
                .sign_and_execute_transaction(&mut tx, &signer)
                .await
                .unwrap();
            assert!(executed.effects.is_success());
        }

        assert_eq!(ledger.coin_balance(&coin.object_id), Some(998));
        assert!(executor.last_digest().is_some());
        executor.reset().await.unwrap();
        assert!(executor.last_digest().is_none());
        assert!(executor.cache().get_object(&coin.object_id).is_none());
        assert_eq!(ledger.coins_owned_by(sender, &sui_type()).len(), 4);
    }
}
