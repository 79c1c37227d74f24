//! Transaction executors.
//!
//! - [`CachingTransactionExecutor`]: builds against an [`ObjectCache`] kept
//!   current from effects, so back-to-back transactions skip index lag.
//! - [`SerialTransactionExecutor`]: one transaction at a time, chaining the gas
//!   coin from each transaction's effects into the next.
//! - [`ParallelTransactionExecutor`]: concurrent submission with a pool of gas
//!   coins (or address-balance gas), serializing only transactions that share
//!   owned objects.

pub mod cache;
pub mod caching;
pub mod config;
pub mod epoch;
pub mod error;
pub mod parallel;
pub mod pool;
pub mod queue;
pub mod serial;

pub use cache::{CachedObject, ObjectCache};
pub use caching::CachingTransactionExecutor;
pub use config::{GasMode, ParallelExecutorConfig, SerialExecutorConfig};
pub use epoch::EpochInfoCache;
pub use error::ExecutorError;
pub use parallel::ParallelTransactionExecutor;
pub use pool::{PoolStats, PooledCoin};
pub use queue::{ObjectGuard, ObjectLocks, SerialQueue};
pub use serial::SerialTransactionExecutor;
