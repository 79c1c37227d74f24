//! Build, resolve and execute Sui programmable transactions.
//!
//! - [`types`]: the transaction reference model (arguments, inputs, commands, effects)
//! - [`transport`]: ledger client, signer and serializer seams
//! - [`builder`]: the transaction graph builder and intent resolution
//! - [`executor`]: caching, serial and parallel executors
//!
//! Most applications only need the re-exports below.
//!
//! ```ignore
//! use sui_ptb::{CoinWithBalance, ParallelExecutorConfig, ParallelTransactionExecutor, Transaction};
//!
//! let executor = ParallelTransactionExecutor::new(
//!     client,
//!     signer,
//!     Arc::new(BcsTransactionSerializer),
//!     ParallelExecutorConfig::from_env()?,
//! )?;
//! let mut tx = Transaction::new();
//! let coin = tx.coin_with_balance(CoinWithBalance::sui(1_000))?;
//! let to = tx.pure_address(recipient)?;
//! tx.transfer_objects(vec![coin], to)?;
//! let executed = executor.execute_transaction(tx, &[]).await?;
//! ```

pub use sui_ptb_builder as builder;
pub use sui_ptb_executor as executor;
pub use sui_ptb_types as types;
pub use sui_transport as transport;

pub use sui_ptb_builder::{
    BuildError, CoinWithBalance, ErrorStage, IntentResolver, ResolveContext, ResultMapping,
    Transaction, TransactionDataBuilder,
};
pub use sui_ptb_executor::{
    CachingTransactionExecutor, ExecutorError, GasMode, ParallelExecutorConfig,
    ParallelTransactionExecutor, PoolStats, SerialExecutorConfig, SerialTransactionExecutor,
};
pub use sui_transport::{BcsTransactionSerializer, LedgerClient, Signer, TransactionSerializer};
