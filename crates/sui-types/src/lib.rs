//! Shared types for the sui-ptb workspace.
//!
//! This crate holds the reference model that every other crate in the workspace
//! speaks: object identifiers and references, the argument / input / command
//! unions of a programmable transaction, the transaction envelope, and the
//! effects reported back by the ledger.
//!
//! ## Modules
//!
//! - [`base`] - ids, [`ObjectRef`](base::ObjectRef), coin type helpers
//! - [`ptb`] - [`Argument`](ptb::Argument), [`CallArg`](ptb::CallArg), [`Command`](ptb::Command)
//! - [`transaction`] - [`TransactionData`](transaction::TransactionData) and gas data
//! - [`effects`] - [`TransactionEffects`](effects::TransactionEffects) and object owners
//! - [`env_utils`] / [`encoding`] - small helpers shared by the config and transport layers

pub mod base;
pub mod effects;
pub mod encoding;
pub mod env_utils;
pub mod ptb;
pub mod transaction;

// Re-export commonly used types at crate root
pub use base::{
    balance_type, coin_type, parse_type_tag, sui_type, ObjectId, ObjectRef, SequenceNumber,
    SuiAddress, SUI_FRAMEWORK_ADDRESS,
};
pub use effects::{
    ChangedObject, ExecutedTransaction, ExecutionStatus, GasCostSummary, IdOperation,
    ObjectOutput, Owner, TransactionEffects,
};
pub use ptb::{
    Argument, CallArg, CoinKind, CoinWithBalanceData, Command, FundsWithdrawal, IntentCommand,
    IntentData, ObjectArg, UnresolvedObject, WithdrawFrom,
};
pub use transaction::{GasData, TransactionData, TransactionExpiration};
