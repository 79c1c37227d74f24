//! Executor errors.

use sui_ptb_builder::{BuildError, ErrorStage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    /// The transaction could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Signing, transport, or ledger rejection before execution.
    #[error("submission failed: {0:#}")]
    Submission(anyhow::Error),

    /// The ledger executed the transaction and it aborted. Gas was still charged.
    #[error("transaction {digest} failed: {error}")]
    ExecutionFailed { digest: String, error: String },

    /// No gas coin could be checked out, even after a refill.
    #[error("no gas coins available")]
    PoolExhausted,

    /// Address balance minus in-flight reservations cannot cover the gas budget
    /// plus the transaction's own withdrawals.
    #[error("insufficient address balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u128 },

    /// The refill transaction that funds the pool failed.
    #[error("gas pool refill failed: {0:#}")]
    Refill(anyhow::Error),
}

impl ExecutorError {
    pub fn stage(&self) -> ErrorStage {
        match self {
            ExecutorError::Build(err) => err.stage(),
            ExecutorError::Submission(_)
            | ExecutorError::ExecutionFailed { .. }
            | ExecutorError::PoolExhausted
            | ExecutorError::InsufficientBalance { .. }
            | ExecutorError::Refill(_) => ErrorStage::Submission,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_follows_build_errors() {
        let err = ExecutorError::from(BuildError::MissingField("gas budget"));
        assert_eq!(err.stage(), ErrorStage::Structural);
        let err = ExecutorError::Refill(anyhow::anyhow!("no funds"));
        assert_eq!(err.stage(), ErrorStage::Submission);
        assert!(err.to_string().contains("no funds"));
    }

    #[test]
    fn test_insufficient_balance_is_a_submission_error() {
        let err = ExecutorError::InsufficientBalance {
            required: 110,
            available: 10,
        };
        assert_eq!(err.stage(), ErrorStage::Submission);
        assert_eq!(
            err.to_string(),
            "insufficient address balance: required 110, available 10"
        );
    }
}
