//! # ChatSync Engine
//!
//! Conversation persistence and synchronization across two storage tiers.
//!
//! This crate provides:
//! - Local store adapter over a [`chatsync_storage::KeyValueBackend`]
//! - Remote store abstraction with an in-memory implementation
//! - Conflict detection and merge before every save
//! - Transaction coordination (local first, then concurrent remote upserts)
//! - A retry worker with exponential backoff
//! - Identity and notification seams for the host application
//!
//! ## Architecture
//!
//! A save is one [`chatsync_model::Transaction`]:
//! 1. Fetch the remote snapshot and merge records the remote has newer
//! 2. Write the snapshot to the local tier
//! 3. Upsert every conversation to the remote tier, concurrently
//! 4. Commit if either tier accepted the write; otherwise hand the
//!    transaction to the retry worker
//!
//! ## Key Invariants
//!
//! - The local tier is written before the remote tier
//! - A save succeeds if at least one tier persisted it
//! - A load never fails and always contains the default conversation
//! - At most one retry loop runs at a time
//! - A transaction is retried at most `max_retries` times

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod identity;
mod local;
mod notify;
mod remote;
mod scheduler;

pub use config::{EngineConfig, RetryConfig, SaveOptions};
pub use coordinator::{ConversationEngine, LoadOutcome};
pub use error::{EngineError, EngineResult};
pub use identity::{IdentityProvider, StaticIdentity};
pub use local::{
    LocalSnapshot, LocalStore, LocalWrite, ACTIVE_KEY, CONVERSATIONS_KEY, ORDER_KEY, VERSION_KEY,
};
pub use notify::{
    Notification, NotificationAction, NotificationKind, NotificationSink, NullSink, RecordingSink,
    TracingSink,
};
pub use remote::{MemoryRemoteStore, OfflineRemote, RemoteSnapshot, RemoteStore, UpsertOutcome};
pub use scheduler::{RetryScheduler, RetryStats, TransactionExecutor};
