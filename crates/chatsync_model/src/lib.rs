//! # ChatSync Model
//!
//! Data model for the ChatSync persistence engine.
//!
//! This crate provides:
//! - `Conversation` and `Message` records with pass-through extra fields
//! - Display order helpers for the conversation list
//! - `Transaction` and its status state machine
//! - `ConflictRecord`, `ConflictPolicy` and the pure `ConflictResolver`
//! - `PersistenceResult` returned by save operations
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod conversation;
mod error;
mod order;
mod result;
mod transaction;

pub use conflict::{ConflictPolicy, ConflictRecord, ConflictResolver};
pub use conversation::{
    ensure_default_bucket, now_millis, Conversation, Conversations, Message, MessageRole,
    RecordSource, DEFAULT_CONVERSATION_ID, DEFAULT_CONVERSATION_TITLE,
};
pub use error::{ModelError, ModelResult};
pub use order::{normalize_order, recency_order};
pub use result::PersistenceResult;
pub use transaction::{Transaction, TransactionId, TransactionStatus};
