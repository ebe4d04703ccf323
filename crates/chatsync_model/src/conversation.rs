//! Conversation and message records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Id of the catch-all conversation that must exist after every load.
pub const DEFAULT_CONVERSATION_ID: &str = "everything-else";

/// Title given to a synthesized default conversation.
pub const DEFAULT_CONVERSATION_TITLE: &str = "Everything else";

/// Conversations keyed by id. Display order is kept separately.
pub type Conversations = HashMap<String, Conversation>;

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Which tier a record was last taken from.
///
/// Purely informational; the conflict resolver sets `Merged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Read from or written to the local tier.
    #[default]
    Local,
    /// Read from or written to the remote tier.
    Remote,
    /// Produced by merging a local and a remote record.
    Merged,
}

impl RecordSource {
    /// Returns the lowercase wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Local => "local",
            RecordSource::Remote => "remote",
            RecordSource::Merged => "merged",
        }
    }
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Written by the user.
    User,
    /// Generated by the assistant.
    Assistant,
    /// Injected by the application.
    System,
}

/// A single entry in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message id, unique within its conversation.
    pub id: String,
    /// Author of the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Creation time in milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: u64,
    /// Fields attached by other features, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Creates a message.
    pub fn new(
        id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp,
            extra: Map::new(),
        }
    }

    /// Creates a user message.
    pub fn user(id: impl Into<String>, content: impl Into<String>, timestamp: u64) -> Self {
        Self::new(id, MessageRole::User, content, timestamp)
    }

    /// Creates an assistant message.
    pub fn assistant(id: impl Into<String>, content: impl Into<String>, timestamp: u64) -> Self {
        Self::new(id, MessageRole::Assistant, content, timestamp)
    }
}

/// A named, ordered message thread.
///
/// The JSON form uses camelCase field names. Fields this crate does not know
/// about are captured in `extra` and written back unchanged, so records
/// produced by newer clients survive a round trip through older ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Stable id, identical on both tiers.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Transcript in insertion order.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Insight data attached by other features. Opaque here.
    #[serde(default)]
    pub insights: Map<String, Value>,
    /// Context data attached by other features. Opaque here.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Game the conversation is about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    /// Whether the user pinned the conversation.
    #[serde(default)]
    pub is_pinned: bool,
    /// Logical modification time (ms since epoch) used for conflict checks.
    #[serde(default)]
    pub last_modified: u64,
    /// Stamp assigned by the local tier on every write that changed the record.
    #[serde(default)]
    pub version: u64,
    /// Tier the record came from.
    #[serde(default)]
    pub source: RecordSource,
    /// Unknown fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Conversation {
    /// Creates an empty conversation modified now.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            messages: Vec::new(),
            insights: Map::new(),
            context: Map::new(),
            game_id: None,
            is_pinned: false,
            last_modified: now_millis(),
            version: 0,
            source: RecordSource::Local,
            extra: Map::new(),
        }
    }

    /// Creates the catch-all default conversation.
    #[must_use]
    pub fn default_bucket(now: u64) -> Self {
        Self::new(DEFAULT_CONVERSATION_ID, DEFAULT_CONVERSATION_TITLE).with_last_modified(now)
    }

    /// Sets the logical modification time.
    #[must_use]
    pub fn with_last_modified(mut self, last_modified: u64) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Appends a message.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Replaces the transcript.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Sets the game id.
    #[must_use]
    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    /// Sets the pinned flag.
    #[must_use]
    pub fn pinned(mut self, is_pinned: bool) -> Self {
        self.is_pinned = is_pinned;
        self
    }

    /// Sets the source tag.
    #[must_use]
    pub fn with_source(mut self, source: RecordSource) -> Self {
        self.source = source;
        self
    }

    /// Returns true for the catch-all default conversation.
    #[must_use]
    pub fn is_default_bucket(&self) -> bool {
        self.id == DEFAULT_CONVERSATION_ID
    }

    /// Number of messages in the transcript.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Compares everything except the bookkeeping fields `version` and `source`.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.last_modified == other.last_modified
            && self.is_pinned == other.is_pinned
            && self.game_id == other.game_id
            && self.messages == other.messages
            && self.insights == other.insights
            && self.context == other.context
            && self.extra == other.extra
    }
}

/// Inserts the default conversation if it is missing.
///
/// Returns true if a conversation was synthesized.
pub fn ensure_default_bucket(conversations: &mut Conversations, now: u64) -> bool {
    if conversations.contains_key(DEFAULT_CONVERSATION_ID) {
        return false;
    }
    conversations.insert(
        DEFAULT_CONVERSATION_ID.to_string(),
        Conversation::default_bucket(now),
    );
    true
}
