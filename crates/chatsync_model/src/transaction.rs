//! Persistence transactions.

use crate::conversation::{now_millis, Conversations};
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a save attempt.
///
/// Every call to save allocates a fresh id; retries keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new random transaction ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the raw UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Lifecycle state of a transaction.
///
/// ```text
/// pending ──► committed
///    │
///    ├──► failed ──► pending   (retry)
///    │      │
///    └──────┴──► rolled_back ──► pending   (manual retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Waiting to be written, or being written.
    Pending,
    /// Durably written to at least one tier. Terminal.
    Committed,
    /// Discarded without being written.
    RolledBack,
    /// The last attempt failed on every tier.
    Failed,
}

impl TransactionStatus {
    /// Returns the snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled_back",
            TransactionStatus::Failed => "failed",
        }
    }

    fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Committed)
                | (Pending, Failed)
                | (Pending, RolledBack)
                | (Failed, Pending)
                | (Failed, RolledBack)
                | (RolledBack, Pending)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work persisting one conversation snapshot.
///
/// The coordinator creates a transaction per save request and tracks it
/// until it commits or permanently fails. The snapshot may be replaced once
/// while pending, when conflict resolution produced a merged set.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TransactionId,
    conversations: Conversations,
    timestamp: u64,
    status: TransactionStatus,
    retry_count: u32,
    notify_user: bool,
}

impl Transaction {
    /// Creates a pending transaction for `conversations`.
    #[must_use]
    pub fn new(conversations: Conversations) -> Self {
        Self {
            id: TransactionId::new(),
            conversations,
            timestamp: now_millis(),
            status: TransactionStatus::Pending,
            retry_count: 0,
            notify_user: true,
        }
    }

    /// Sets whether failures of this transaction are reported to the user.
    #[must_use]
    pub fn with_notify_user(mut self, notify_user: bool) -> Self {
        self.notify_user = notify_user;
        self
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the snapshot being persisted.
    #[must_use]
    pub fn conversations(&self) -> &Conversations {
        &self.conversations
    }

    /// Returns the creation time in milliseconds since the epoch.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Returns the number of retries scheduled so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns true if the user asked to hear about this transaction.
    #[must_use]
    pub fn notify_user(&self) -> bool {
        self.notify_user
    }

    /// Returns true while the transaction may still be written.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Returns true if another retry fits under `max_retries`.
    #[must_use]
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    /// Replaces the snapshot with a resolved one.
    pub fn replace_conversations(&mut self, conversations: Conversations) -> ModelResult<()> {
        if !self.is_pending() {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: TransactionStatus::Pending,
            });
        }
        self.conversations = conversations;
        Ok(())
    }

    /// Counts one more retry and returns the new count.
    pub fn increment_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// Marks the transaction as committed.
    pub fn mark_committed(&mut self) -> ModelResult<()> {
        self.transition(TransactionStatus::Committed)
    }

    /// Marks the last attempt as failed.
    pub fn mark_failed(&mut self) -> ModelResult<()> {
        self.transition(TransactionStatus::Failed)
    }

    /// Moves a failed or rolled back transaction back to pending.
    pub fn mark_pending(&mut self) -> ModelResult<()> {
        self.transition(TransactionStatus::Pending)
    }

    /// Marks the transaction as discarded.
    pub fn mark_rolled_back(&mut self) -> ModelResult<()> {
        self.transition(TransactionStatus::RolledBack)
    }

    fn transition(&mut self, next: TransactionStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
