//! Programmable transaction graphs.
//!
//! - [`TransactionDataBuilder`]: deduplicated inputs, ordered commands, and the
//!   structural edits (`insert_transaction`, `replace_command`, `map_arguments`)
//!   that keep every `Result` reference pointing at the right command.
//! - [`intents`]: placeholder commands rewritten by registered resolvers at build
//!   time, including the built-in [`CoinWithBalance`] resolver.
//! - [`Transaction`]: a builder with a resolver pipeline, producing serialized bytes.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = Transaction::new();
//! tx.set_sender(sender);
//! tx.set_gas_budget(10_000_000);
//! let coin = tx.coin_with_balance(CoinWithBalance::sui(1_000))?;
//! let to = tx.pure_address(recipient)?;
//! tx.transfer_objects(vec![coin], to)?;
//! let bytes = tx.build(&ResolveContext::new(&client), &BcsTransactionSerializer).await?;
//! ```

pub mod builder;
pub mod error;
pub mod intents;
pub mod resolve;
pub mod surgery;
pub mod transaction;
pub mod validation;

pub use builder::{TransactionDataBuilder, TransactionResult, MAX_ENTRIES};
pub use error::{BuildError, ErrorStage};
pub use intents::{
    CoinWithBalance, CoinWithBalanceResolver, IntentPipeline, IntentResolver, Next,
    ResolveContext, COIN_WITH_BALANCE,
};
pub use resolve::resolve_objects;
pub use surgery::ResultMapping;
pub use transaction::{Transaction, MAX_GAS_OBJECTS};
pub use validation::{check_references, find_reference_errors, ReferenceError, ReferenceErrorKind};
