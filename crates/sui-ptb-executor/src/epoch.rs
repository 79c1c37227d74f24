//! Cached epoch information: reference gas price and `ValidDuring` expirations.

use crate::error::ExecutorError;
use std::sync::Arc;
use std::time::Duration;
use sui_ptb_types::TransactionExpiration;
use sui_transport::{EpochInfo, LedgerClient};
use tracing::debug;

/// Epoch info, refetched once the epoch is within `window` of its end.
pub struct EpochInfoCache {
    client: Arc<dyn LedgerClient>,
    window: Duration,
    current: tokio::sync::Mutex<Option<EpochInfo>>,
}

fn now_ms() -> i128 {
    chrono::Utc::now().timestamp_millis() as i128
}

impl EpochInfoCache {
    pub fn new(client: Arc<dyn LedgerClient>, window: Duration) -> Self {
        Self {
            client,
            window,
            current: tokio::sync::Mutex::new(None),
        }
    }

    fn is_fresh(&self, info: &EpochInfo) -> bool {
        info.epoch_end_timestamp_ms() as i128 - self.window.as_millis() as i128 - now_ms() > 0
    }

    /// Current epoch info. Concurrent callers share a single fetch.
    pub async fn get(&self) -> Result<EpochInfo, ExecutorError> {
        let mut current = self.current.lock().await;
        if let Some(info) = current.as_ref().filter(|info| self.is_fresh(info)) {
            return Ok(info.clone());
        }
        let info = self
            .client
            .get_epoch_info()
            .await
            .map_err(ExecutorError::Submission)?;
        debug!(
            epoch = info.epoch,
            gas_price = info.reference_gas_price,
            "fetched epoch info"
        );
        *current = Some(info.clone());
        Ok(info)
    }

    pub async fn reference_gas_price(&self) -> Result<u64, ExecutorError> {
        Ok(self.get().await?.reference_gas_price)
    }

    /// An expiration valid for the current and the next epoch, with a random nonce.
    pub async fn valid_during_expiration(&self) -> Result<TransactionExpiration, ExecutorError> {
        let info = self.get().await?;
        Ok(TransactionExpiration::ValidDuring {
            min_epoch: Some(info.epoch),
            max_epoch: Some(info.epoch + 1),
            min_timestamp: None,
            max_timestamp: None,
            chain: info.chain_identifier,
            nonce: rand::random::<u32>(),
        })
    }

    /// Forget the cached info; the next call refetches.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}
