//! Outcome of a persistence operation.

use crate::conversation::RecordSource;
use crate::transaction::TransactionId;

/// What a save did.
///
/// A save that could not reach any tier but was queued for retry still
/// returns a result (with `success == false`); only a failure with retries
/// disabled is reported as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceResult {
    /// Whether at least one tier holds the snapshot.
    pub success: bool,
    /// Remote if the remote tier accepted the write, local otherwise.
    pub source: RecordSource,
    /// Number of conversations merged with newer remote copies.
    pub conflicts_resolved: usize,
    /// Tier errors absorbed during the operation.
    pub errors: Vec<String>,
    /// Retries scheduled so far.
    pub retry_count: u32,
    /// Transaction that produced this result.
    pub transaction_id: Option<TransactionId>,
}

impl PersistenceResult {
    /// A committed write.
    #[must_use]
    pub fn committed(source: RecordSource, transaction_id: TransactionId) -> Self {
        Self {
            success: true,
            source,
            conflicts_resolved: 0,
            errors: Vec::new(),
            retry_count: 0,
            transaction_id: Some(transaction_id),
        }
    }

    /// A write that failed now and was queued for retry.
    #[must_use]
    pub fn retrying(transaction_id: TransactionId, retry_count: u32, errors: Vec<String>) -> Self {
        Self {
            success: false,
            source: RecordSource::Local,
            conflicts_resolved: 0,
            errors,
            retry_count,
            transaction_id: Some(transaction_id),
        }
    }

    /// Sets the absorbed tier errors.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the number of merged conversations.
    #[must_use]
    pub fn with_conflicts_resolved(mut self, conflicts_resolved: usize) -> Self {
        self.conflicts_resolved = conflicts_resolved;
        self
    }

    /// Returns true if the write landed on one tier but not the other.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.success && !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_result() {
        let id = TransactionId::new();
        let result = PersistenceResult::committed(RecordSource::Remote, id)
            .with_conflicts_resolved(2);
        assert!(result.success);
        assert_eq!(result.source, RecordSource::Remote);
        assert_eq!(result.conflicts_resolved, 2);
        assert_eq!(result.transaction_id, Some(id));
        assert!(!result.is_partial());
    }

    #[test]
    fn partial_result() {
        let result = PersistenceResult::committed(RecordSource::Local, TransactionId::new())
            .with_errors(vec!["remote: offline".into()]);
        assert!(result.is_partial());
    }

    #[test]
    fn retrying_result() {
        let result = PersistenceResult::retrying(TransactionId::new(), 1, vec!["x".into()]);
        assert!(!result.success);
        assert_eq!(result.retry_count, 1);
        assert!(!result.is_partial());
    }
}
