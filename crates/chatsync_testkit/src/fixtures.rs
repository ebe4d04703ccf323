//! Test fixtures.
//!
//! Builders for conversations and message transcripts, and temporary
//! directories holding a [`FileBackend`].

use chatsync_model::{Conversation, Conversations, Message};
use chatsync_storage::FileBackend;
use std::path::Path;
use tempfile::TempDir;

/// A file backend in a temporary directory, removed on drop.
pub struct TempFileBackend {
    /// The backend.
    pub backend: FileBackend,
    // Dropped after `backend` so the directory lock is released first.
    temp_dir: TempDir,
}

impl TempFileBackend {
    /// Creates a backend in a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend = FileBackend::open(temp_dir.path()).expect("Failed to open file backend");
        Self { backend, temp_dir }
    }

    /// Returns the directory holding the records.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Splits into the backend and the directory guard.
    pub fn into_parts(self) -> (FileBackend, TempDir) {
        (self.backend, self.temp_dir)
    }
}

impl Default for TempFileBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempFileBackend {
    type Target = FileBackend;

    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

/// Builds a transcript of alternating user and assistant messages.
pub fn messages(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            let id = format!("m{i}");
            let timestamp = 1_000 + i as u64;
            if i % 2 == 0 {
                Message::user(id, format!("question {i}"), timestamp)
            } else {
                Message::assistant(id, format!("answer {i}"), timestamp)
            }
        })
        .collect()
}

/// Builds a conversation with `message_count` messages.
pub fn conversation(id: &str, message_count: usize, last_modified: u64) -> Conversation {
    Conversation::new(id, format!("Conversation {id}"))
        .with_messages(messages(message_count))
        .with_last_modified(last_modified)
}

/// Collects conversations into a map keyed by id.
pub fn snapshot<I>(conversations: I) -> Conversations
where
    I: IntoIterator<Item = Conversation>,
{
    conversations
        .into_iter()
        .map(|conversation| (conversation.id.clone(), conversation))
        .collect()
}

/// Builds `count` conversations `c0..c{count}` with increasing modification times.
pub fn numbered_snapshot(count: usize) -> Conversations {
    snapshot((0..count).map(|i| conversation(&format!("c{i}"), i % 4, 100 * (i as u64 + 1))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_model::MessageRole;
    use chatsync_storage::KeyValueBackend;

    #[test]
    fn transcript_alternates_roles() {
        let transcript = messages(3);
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0].role, MessageRole::User);
        assert_eq!(transcript[1].role, MessageRole::Assistant);
        assert_eq!(transcript[2].id, "m2");
    }

    #[test]
    fn numbered_snapshot_builds_distinct_ids() {
        let data = numbered_snapshot(5);
        assert_eq!(data.len(), 5);
        assert_eq!(data["c4"].last_modified, 500);
        assert_eq!(data["c3"].message_count(), 3);
    }

    #[test]
    fn temp_file_backend_round_trip() {
        let temp = TempFileBackend::new();
        temp.put("k", "\"v\"").unwrap();
        assert_eq!(temp.get("k").unwrap().as_deref(), Some("\"v\""));
        assert!(temp.path().join("k.json").exists());
    }
}
