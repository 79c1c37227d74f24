//! Errors raised while assembling or finalizing a transaction graph.

use crate::surgery::ResultMapping;
use crate::validation::ReferenceError;
use sui_ptb_types::{Argument, ObjectId};
use thiserror::Error;

/// Which stage of the pipeline an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStage {
    /// Malformed graph surgery or an unfinished graph. The graph is left unchanged.
    Structural,
    /// An intent or object could not be resolved against the ledger.
    Resolution,
    /// The transport or the ledger rejected a submission.
    Submission,
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorStage::Structural => "structural",
            ErrorStage::Resolution => "resolution",
            ErrorStage::Submission => "submission",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("command index {index} out of range ({len} commands)")]
    CommandIndexOutOfRange { index: usize, len: usize },

    #[error("input index {index} out of range ({len} inputs)")]
    InputIndexOutOfRange { index: usize, len: usize },

    #[error("transaction would have {len} {what}, more than an argument can address")]
    CapacityExceeded { what: &'static str, len: usize },

    #[error("{reference:?} in command {command} cannot be expressed by {mapping:?}")]
    UnmappableReference {
        command: usize,
        reference: Argument,
        mapping: ResultMapping,
    },

    #[error("{mapping:?} points outside the {replacement_len} replacement command(s)")]
    MappingOutOfRange {
        mapping: ResultMapping,
        replacement_len: usize,
    },

    #[error("command {command} still references removed command via {reference:?}")]
    DanglingReference { command: usize, reference: Argument },

    #[error(transparent)]
    InvalidReference(#[from] ReferenceError),

    #[error("input {index} must keep object {expected}")]
    InputKeyMismatch { index: usize, expected: String },

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("failed to encode pure value: {0}")]
    PureEncoding(#[from] bcs::Error),

    #[error("command {index} is an unresolved {name} intent")]
    UnresolvedIntent { index: usize, name: String },

    #[error("no resolver registered for {name} intents")]
    MissingResolver { name: String },

    #[error("input {index} is an unresolved object")]
    UnresolvedObject { index: usize },

    #[error("{0} must be set")]
    MissingField(&'static str),

    #[error("failed to serialize transaction: {0:#}")]
    Serialization(anyhow::Error),

    #[error("a ledger client is required to resolve {0}")]
    MissingClient(&'static str),

    #[error("ledger query failed: {0:#}")]
    Client(anyhow::Error),

    #[error("object {} not found", .0.to_hex_literal())]
    ObjectNotFound(ObjectId),

    #[error("insufficient balance of {coin_type} for {owner}: required {required}, available {available}")]
    InsufficientBalance {
        coin_type: String,
        owner: String,
        required: u128,
        available: u128,
    },

    #[error("{name} resolver failed: {message}")]
    Resolver { name: String, message: String },
}

impl BuildError {
    pub fn stage(&self) -> ErrorStage {
        match self {
            BuildError::MissingClient(_)
            | BuildError::Client(_)
            | BuildError::ObjectNotFound(_)
            | BuildError::InsufficientBalance { .. }
            | BuildError::Resolver { .. } => ErrorStage::Resolution,
            _ => ErrorStage::Structural,
        }
    }
}
