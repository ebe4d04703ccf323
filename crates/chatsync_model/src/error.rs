//! Error types for the data model.

use crate::transaction::TransactionStatus;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by model invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A transaction was moved along an edge its state machine does not have.
    #[error("invalid transaction transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: TransactionStatus,
        /// Requested status.
        to: TransactionStatus,
    },
}
