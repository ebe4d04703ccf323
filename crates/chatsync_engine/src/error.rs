//! Error types for the engine.

use chatsync_model::{ModelError, TransactionId};
use chatsync_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while persisting or loading conversations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Local backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A model invariant was violated.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// A local record holds unreadable data.
    #[error("corrupt local record {key}: {message}")]
    CorruptRecord {
        /// Record key.
        key: String,
        /// Parser message.
        message: String,
    },

    /// The remote store rejected or failed a call.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote store is unreachable.
    #[error("not connected to remote store")]
    NotConnected,

    /// The remote store requires a signed-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A remote call exceeded the configured timeout.
    #[error("remote operation timed out after {0:?}")]
    Timeout(Duration),

    /// Neither tier accepted the write.
    #[error("all storage tiers failed: {}", errors.join("; "))]
    AllTiersFailed {
        /// Per-tier error messages.
        errors: Vec<String>,
    },

    /// No parked transaction has this id.
    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionId),

    /// The retry worker is no longer running.
    #[error("retry scheduler stopped")]
    SchedulerStopped,
}

impl EngineError {
    /// Creates a retryable remote error.
    pub fn remote_retryable(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error.
    pub fn remote_fatal(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if repeating the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Remote { retryable, .. } => *retryable,
            EngineError::Storage(_)
            | EngineError::NotConnected
            | EngineError::Timeout(_)
            | EngineError::AllTiersFailed { .. } => true,
            EngineError::Serialization(_)
            | EngineError::Model(_)
            | EngineError::CorruptRecord { .. }
            | EngineError::NotAuthenticated
            | EngineError::UnknownTransaction(_)
            | EngineError::SchedulerStopped => false,
        }
    }

    /// Flattens the error into per-tier messages.
    pub fn messages(&self) -> Vec<String> {
        match self {
            EngineError::AllTiersFailed { errors } => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EngineError::remote_retryable("503").is_retryable());
        assert!(!EngineError::remote_fatal("invalid payload").is_retryable());
        assert!(EngineError::NotConnected.is_retryable());
        assert!(EngineError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(EngineError::AllTiersFailed { errors: vec![] }.is_retryable());
        assert!(!EngineError::SchedulerStopped.is_retryable());
        assert!(!EngineError::NotAuthenticated.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = EngineError::AllTiersFailed {
            errors: vec!["local: disk full".into(), "remote c1: offline".into()],
        };
        assert_eq!(
            err.to_string(),
            "all storage tiers failed: local: disk full; remote c1: offline"
        );

        let err = EngineError::CorruptRecord {
            key: "chatsync.order".into(),
            message: "expected value".into(),
        };
        assert!(err.to_string().contains("chatsync.order"));
    }

    #[test]
    fn messages_flatten_tiers() {
        let err = EngineError::AllTiersFailed {
            errors: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.messages(), vec!["a", "b"]);
        assert_eq!(
            EngineError::NotConnected.messages(),
            vec!["not connected to remote store"]
        );
    }
}
