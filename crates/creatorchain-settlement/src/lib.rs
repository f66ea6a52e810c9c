//! # creatorchain-settlement
//!
//! Batch payout settlement: turns a revenue pool into one on-chain transfer
//! per confirmed contributor and reconciles the outcome into the ledger.
//!
//! A run is not atomic. Each contributor's transfer succeeds or fails on its
//! own, and every outcome is persisted before the next contributor is
//! attempted, so a crash never loses track of funds already sent.
//!
//! ## Modules
//!
//! - [`config`] — Timeouts, confirmation depth and read-retry policy
//! - [`ledger`] — Persistence interface and its SQLite implementation
//! - [`executor`] — Pre-flight checks and transfer submission
//! - [`verifier`] — Polling a submitted transfer to a final outcome
//! - [`locks`] — Per-signer submission ordering
//! - [`orchestrator`] — Distribution runs, retries and reconciliation

pub mod config;
pub mod executor;
pub mod ledger;
pub mod locks;
pub mod orchestrator;
pub mod verifier;

use creatorchain_revenue::RevenueError;
use creatorchain_types::{ContributorId, PayoutId, PoolId, PoolStatus, TxHash};
use serde::{Deserialize, Serialize};

pub use config::SettlementConfig;
pub use executor::{TransferError, TransferExecutor, TransferHandle};
pub use ledger::{Ledger, PayoutUpdate, SqliteLedger};
pub use locks::SignerLocks;
pub use orchestrator::{
    DistributionOrchestrator, PayoutOutcome, PayoutResult, PoolReport, RecoveryResult, Resolution,
    RunResult,
};
pub use verifier::{PaymentVerifier, VerificationOutcome};

/// Coarse failure taxonomy shared by per-payout results and operation
/// errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rejected before anything was submitted or persisted.
    Validation,
    /// A pre-submission check failed. Nothing was broadcast.
    Preflight,
    /// Signing or broadcast failed. Nothing reached the chain.
    Submission,
    /// Mined, but reverted on-chain. No value moved.
    Reverted,
    /// Submitted, outcome unknown. Funds may have moved.
    Ambiguous,
    /// Storage or other internal failure.
    Internal,
}

/// Errors returned by settlement operations.
///
/// Per-contributor transfer failures inside a run are not errors of the run
/// itself; they are reported in [`RunResult`].
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// Share table or amount rejected by the split calculator.
    #[error(transparent)]
    Revenue(#[from] RevenueError),

    /// Input rejected before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The pool is not in a state that allows a new run.
    #[error("pool {pool_id} is {status}, expected pending")]
    PoolNotPending { pool_id: PoolId, status: PoolStatus },

    /// The pair's latest payout cannot be retried.
    #[error("payout for contributor {contributor_id} in pool {pool_id} cannot be retried: {reason}")]
    RetryNotAllowed {
        pool_id: PoolId,
        contributor_id: ContributorId,
        reason: String,
    },

    /// The outcome of an earlier attempt is still unknown. Sending again
    /// could pay twice.
    #[error("payout {payout_id} outcome is still unknown (reference {})", reference_str(.reference))]
    AmbiguousOutcome {
        payout_id: PayoutId,
        reference: Option<TxHash>,
    },

    /// A concurrent writer holds the state this operation needs.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

fn reference_str(reference: &Option<TxHash>) -> String {
    reference.map_or_else(|| "none".to_string(), |r| r.to_string())
}

impl SettlementError {
    /// Failure class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            SettlementError::Revenue(_)
            | SettlementError::Validation(_)
            | SettlementError::PoolNotPending { .. }
            | SettlementError::RetryNotAllowed { .. }
            | SettlementError::Conflict(_)
            | SettlementError::NotFound(_) => ErrorClass::Validation,
            SettlementError::AmbiguousOutcome { .. } => ErrorClass::Ambiguous,
            SettlementError::Storage(_) => ErrorClass::Internal,
        }
    }
}

impl From<creatorchain_db::DbError> for SettlementError {
    fn from(err: creatorchain_db::DbError) -> Self {
        use creatorchain_db::DbError;
        match err {
            DbError::NotFound(what) => SettlementError::NotFound(what),
            DbError::Constraint(msg) => SettlementError::Conflict(msg),
            other => SettlementError::Storage(other.to_string()),
        }
    }
}

/// Convenience result type for settlement operations.
pub type Result<T> = std::result::Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_map_to_settlement_errors() {
        let err: SettlementError = creatorchain_db::DbError::NotFound("pool 9".into()).into();
        assert!(matches!(err, SettlementError::NotFound(_)));

        let err: SettlementError =
            creatorchain_db::DbError::Constraint("UNIQUE constraint failed".into()).into();
        assert!(matches!(err, SettlementError::Conflict(_)));
        assert_eq!(err.class(), ErrorClass::Validation);

        let err: SettlementError = creatorchain_db::DbError::Migration("v2".into()).into();
        assert_eq!(err.class(), ErrorClass::Internal);
    }

    #[test]
    fn test_ambiguous_message_names_reference() {
        let err = SettlementError::AmbiguousOutcome {
            payout_id: PayoutId(4),
            reference: None,
        };
        assert_eq!(err.class(), ErrorClass::Ambiguous);
        assert!(err.to_string().contains("reference none"));
    }
}
