//! Local tier adapter.
//!
//! The local tier keeps four independent records in a
//! [`KeyValueBackend`]:
//!
//! | Key | Contents |
//! |-----|----------|
//! | [`CONVERSATIONS_KEY`] | JSON object of id → conversation |
//! | [`ORDER_KEY`] | JSON array of ids in display order |
//! | [`ACTIVE_KEY`] | JSON string, the selected conversation |
//! | [`VERSION_KEY`] | JSON number, the last stamp handed out |
//!
//! A damaged order, active or version record is ignored and rebuilt. A
//! damaged conversations record makes the whole tier unreadable.

use crate::error::{EngineError, EngineResult};
use chatsync_model::{normalize_order, now_millis, Conversation, Conversations};
use chatsync_storage::KeyValueBackend;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Record holding the conversation map.
pub const CONVERSATIONS_KEY: &str = "chatsync.conversations";
/// Record holding the display order.
pub const ORDER_KEY: &str = "chatsync.order";
/// Record holding the active conversation id.
pub const ACTIVE_KEY: &str = "chatsync.active";
/// Record holding the last version stamp.
pub const VERSION_KEY: &str = "chatsync.version";

/// Everything the local tier holds.
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    /// Conversations keyed by id.
    pub conversations: Conversations,
    /// Display order, normalized against `conversations`.
    pub order: Vec<String>,
    /// Stored active conversation id, if any.
    pub active_conversation_id: Option<String>,
    /// Last stamp handed out.
    pub version: u64,
    /// Keys whose records were unreadable and ignored.
    pub repaired: Vec<String>,
}

/// Summary of a local write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWrite {
    /// Stamp after the write.
    pub version: u64,
    /// Number of conversations that received the new stamp.
    pub changed: usize,
}

/// Conversation store over a key-value backend.
pub struct LocalStore<B> {
    backend: B,
    write_lock: Mutex<()>,
}

impl<B: KeyValueBackend> LocalStore<B> {
    /// Creates a store over the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reads the local state.
    ///
    /// Fails only when the backend fails or the conversations record is
    /// corrupt.
    pub fn load(&self) -> EngineResult<LocalSnapshot> {
        let stored: Conversations = self.read_json(CONVERSATIONS_KEY)?.unwrap_or_default();
        // Re-key by record id so a hand-edited map cannot disagree with itself.
        let conversations: Conversations = stored
            .into_values()
            .map(|conversation| (conversation.id.clone(), conversation))
            .collect();

        let mut repaired = Vec::new();
        let order: Vec<String> = self.read_tolerant(ORDER_KEY, &mut repaired)?.unwrap_or_default();
        let active_conversation_id: Option<String> =
            self.read_tolerant(ACTIVE_KEY, &mut repaired)?;
        let version: u64 = self.read_tolerant(VERSION_KEY, &mut repaired)?.unwrap_or(0);

        Ok(LocalSnapshot {
            order: normalize_order(&order, &conversations),
            conversations,
            active_conversation_id,
            version,
            repaired,
        })
    }

    /// Writes the conversation map and display order.
    ///
    /// Conversations whose content changed since the last write receive a
    /// fresh stamp; unchanged ones keep their stored version. The stamp is
    /// `max(last stamp + 1, now)`, so versions never go backwards.
    pub fn save(&self, conversations: &Conversations, order: &[String]) -> EngineResult<LocalWrite> {
        let _guard = self.write_lock.lock();

        let existing: Conversations = match self.read_json(CONVERSATIONS_KEY) {
            Ok(existing) => existing.unwrap_or_default(),
            Err(EngineError::CorruptRecord { message, .. }) => {
                warn!(key = CONVERSATIONS_KEY, error = %message, "overwriting corrupt record");
                Conversations::new()
            }
            Err(e) => return Err(e),
        };
        let stored_stamp = self
            .read_json::<u64>(VERSION_KEY)
            .ok()
            .flatten()
            .unwrap_or(0)
            .max(existing.values().map(|c| c.version).max().unwrap_or(0));
        if stored_stamp == u64::MAX {
            warn!(key = VERSION_KEY, "version stamp saturated");
        }
        let stamp = stored_stamp.saturating_add(1).max(now_millis());

        let mut changed = existing.keys().filter(|id| !conversations.contains_key(*id)).count();
        let mut records = Conversations::with_capacity(conversations.len());
        for (id, conversation) in conversations {
            let mut record = conversation.clone();
            match existing.get(id) {
                Some(previous) if previous.same_content(conversation) => {
                    record.version = previous.version;
                }
                _ => {
                    record.version = stamp;
                    changed += 1;
                }
            }
            records.insert(id.clone(), record);
        }

        // Sorted so identical snapshots produce identical bytes.
        let sorted: BTreeMap<&String, &Conversation> = records.iter().collect();
        self.write_json(CONVERSATIONS_KEY, &sorted)?;
        self.write_json(ORDER_KEY, &order)?;

        let version = if changed > 0 {
            self.write_json(VERSION_KEY, &stamp)?;
            stamp
        } else {
            stored_stamp
        };
        debug!(
            conversations = records.len(),
            changed, version, "local snapshot written"
        );
        Ok(LocalWrite { version, changed })
    }

    /// Returns the stored active conversation id.
    pub fn active_conversation(&self) -> EngineResult<Option<String>> {
        self.read_json(ACTIVE_KEY)
    }

    /// Persists the active conversation id.
    pub fn set_active_conversation(&self, id: &str) -> EngineResult<()> {
        self.write_json(ACTIVE_KEY, &id)
    }

    /// Returns the last stamp handed out.
    pub fn version(&self) -> EngineResult<u64> {
        Ok(self.read_json(VERSION_KEY)?.unwrap_or(0))
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> EngineResult<Option<T>> {
        match self.backend.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| EngineError::CorruptRecord {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn read_tolerant<T: DeserializeOwned>(
        &self,
        key: &str,
        repaired: &mut Vec<String>,
    ) -> EngineResult<Option<T>> {
        match self.read_json(key) {
            Err(EngineError::CorruptRecord { message, .. }) => {
                warn!(key, error = %message, "ignoring corrupt record");
                repaired.push(key.to_string());
                Ok(None)
            }
            other => other,
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> EngineResult<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.put(key, &raw)?;
        Ok(())
    }
}
