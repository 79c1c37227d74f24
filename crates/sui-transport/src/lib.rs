//! Sui Transport Layer
//!
//! The seams between the transaction builder / executors and the outside world.
//!
//! This crate provides:
//! - [`client`]: [`LedgerClient`], the async interface used to read objects, balances
//!   and coins, and to submit signed transactions
//! - [`signer`]: [`Signer`], which signs finalized transaction bytes
//! - [`serializer`]: [`TransactionSerializer`] and the reference [`BcsTransactionSerializer`]
//! - `mock` (feature `test-utils`): an in-memory ledger for tests
//!
//! # Example
//!
//! ```ignore
//! use sui_transport::{BcsTransactionSerializer, LedgerClient, TransactionSerializer};
//!
//! let bytes = BcsTransactionSerializer.serialize(&tx_data)?;
//! let signature = signer.sign_transaction(&bytes).await?;
//! let executed = client.execute_transaction(&bytes, &[signature]).await?;
//! client.wait_for_transaction(&executed.digest).await?;
//! ```

pub mod client;
pub mod serializer;
pub mod signer;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::{Balance, Coin, CoinPage, EpochInfo, LedgerClient, ObjectInfo};
pub use serializer::{BcsTransactionSerializer, TransactionSerializer};
pub use signer::Signer;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockLedger, MockSigner};
