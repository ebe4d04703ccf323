//! Remote tier abstraction.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use chatsync_model::{Conversation, Conversations, RecordSource};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of a single remote upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    /// The remote kept its own, newer copy instead of the one sent.
    pub conflict_resolved: bool,
}

/// A user's conversations as held by the remote tier.
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    /// Conversations in the remote's display order.
    pub conversations: Vec<Conversation>,
    /// Display order as stored remotely.
    pub order: Vec<String>,
}

impl RemoteSnapshot {
    /// Converts the snapshot into a map keyed by id plus the order.
    ///
    /// Every record is tagged with [`RecordSource::Remote`].
    pub fn into_parts(self) -> (Conversations, Vec<String>) {
        let conversations = self
            .conversations
            .into_iter()
            .map(|mut conversation| {
                conversation.source = RecordSource::Remote;
                (conversation.id.clone(), conversation)
            })
            .collect();
        (conversations, self.order)
    }
}

/// The remote tier.
///
/// Implementations talk to a per-user document store. Each conversation is
/// written independently; there is no multi-record transaction.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Writes one conversation for a user.
    ///
    /// Unless `force_overwrite` is set, a stored copy with a newer
    /// `last_modified` is kept and the outcome reports
    /// `conflict_resolved = true`.
    async fn upsert_conversation(
        &self,
        user_id: &str,
        conversation: &Conversation,
        force_overwrite: bool,
    ) -> EngineResult<UpsertOutcome>;

    /// Reads every conversation of a user.
    async fn load_conversations(&self, user_id: &str) -> EngineResult<RemoteSnapshot>;
}

#[async_trait]
impl<R: RemoteStore + ?Sized> RemoteStore for Arc<R> {
    async fn upsert_conversation(
        &self,
        user_id: &str,
        conversation: &Conversation,
        force_overwrite: bool,
    ) -> EngineResult<UpsertOutcome> {
        (**self)
            .upsert_conversation(user_id, conversation, force_overwrite)
            .await
    }

    async fn load_conversations(&self, user_id: &str) -> EngineResult<RemoteSnapshot> {
        (**self).load_conversations(user_id).await
    }
}

/// Remote tier that is never reachable.
///
/// Used when the engine runs in local-only mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemote;

#[async_trait]
impl RemoteStore for OfflineRemote {
    async fn upsert_conversation(
        &self,
        _user_id: &str,
        _conversation: &Conversation,
        _force_overwrite: bool,
    ) -> EngineResult<UpsertOutcome> {
        Err(EngineError::NotConnected)
    }

    async fn load_conversations(&self, _user_id: &str) -> EngineResult<RemoteSnapshot> {
        Err(EngineError::NotConnected)
    }
}

#[derive(Debug, Default)]
struct UserRecords {
    conversations: HashMap<String, Conversation>,
    order: Vec<String>,
}

impl UserRecords {
    fn store(&mut self, conversation: Conversation) {
        self.order.retain(|id| id != &conversation.id);
        self.order.insert(0, conversation.id.clone());
        self.conversations.insert(conversation.id.clone(), conversation);
    }
}

/// In-memory remote tier with failure injection.
///
/// Useful for tests and for running the engine without a server.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    users: RwLock<HashMap<String, UserRecords>>,
    connected: AtomicBool,
    fail_loads: AtomicBool,
    failing_upserts: RwLock<HashSet<String>>,
    latency: RwLock<Option<Duration>>,
    upsert_calls: AtomicUsize,
    load_calls: AtomicUsize,
}

impl MemoryRemoteStore {
    /// Creates an empty, connected store.
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
            fail_loads: AtomicBool::new(false),
            failing_upserts: RwLock::new(HashSet::new()),
            latency: RwLock::new(None),
            upsert_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
        }
    }

    /// Stores a conversation directly, bypassing conflict checks.
    pub fn insert(&self, user_id: &str, conversation: Conversation) {
        self.users
            .write()
            .entry(user_id.to_string())
            .or_default()
            .store(conversation.with_source(RecordSource::Remote));
    }

    /// Returns a stored conversation.
    pub fn get(&self, user_id: &str, id: &str) -> Option<Conversation> {
        self.users
            .read()
            .get(user_id)
            .and_then(|records| records.conversations.get(id).cloned())
    }

    /// Returns the number of conversations stored for a user.
    pub fn len(&self, user_id: &str) -> usize {
        self.users
            .read()
            .get(user_id)
            .map_or(0, |records| records.conversations.len())
    }

    /// Returns true if nothing is stored for a user.
    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }

    /// Returns true unless the store was disconnected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sets whether the store is reachable.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every load fail until cleared.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Makes upserts of one conversation fail until cleared.
    pub fn fail_upserts_for(&self, conversation_id: impl Into<String>) {
        self.failing_upserts.write().insert(conversation_id.into());
    }

    /// Clears injected load and upsert failures.
    pub fn clear_failures(&self) {
        self.failing_upserts.write().clear();
        self.fail_loads.store(false, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Number of upsert calls received, including failed ones.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Number of load calls received, including failed ones.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_connected(&self) -> EngineResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::NotConnected)
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert_conversation(
        &self,
        user_id: &str,
        conversation: &Conversation,
        force_overwrite: bool,
    ) -> EngineResult<UpsertOutcome> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_connected()?;
        if self.failing_upserts.read().contains(&conversation.id) {
            return Err(EngineError::remote_retryable(format!(
                "upsert of {} rejected",
                conversation.id
            )));
        }

        let mut users = self.users.write();
        let records = users.entry(user_id.to_string()).or_default();
        if !force_overwrite {
            if let Some(stored) = records.conversations.get(&conversation.id) {
                if stored.last_modified > conversation.last_modified {
                    return Ok(UpsertOutcome {
                        conflict_resolved: true,
                    });
                }
            }
        }
        records.store(conversation.clone().with_source(RecordSource::Remote));
        Ok(UpsertOutcome::default())
    }

    async fn load_conversations(&self, user_id: &str) -> EngineResult<RemoteSnapshot> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_connected()?;
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(EngineError::remote_retryable("load rejected"));
        }

        let users = self.users.read();
        let Some(records) = users.get(user_id) else {
            return Ok(RemoteSnapshot::default());
        };
        let conversations = records
            .order
            .iter()
            .filter_map(|id| records.conversations.get(id).cloned())
            .collect();
        Ok(RemoteSnapshot {
            conversations,
            order: records.order.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(id: &str, last_modified: u64) -> Conversation {
        Conversation::new(id, id).with_last_modified(last_modified)
    }

    #[tokio::test]
    async fn upsert_and_load() {
        let store = MemoryRemoteStore::new();
        store
            .upsert_conversation("u1", &conversation("a", 1), false)
            .await
            .unwrap();
        store
            .upsert_conversation("u1", &conversation("b", 2), false)
            .await
            .unwrap();

        let snapshot = store.load_conversations("u1").await.unwrap();
        assert_eq!(snapshot.order, vec!["b", "a"]);
        assert_eq!(snapshot.conversations.len(), 2);
        assert_eq!(snapshot.conversations[0].source, RecordSource::Remote);

        assert!(store.load_conversations("u2").await.unwrap().conversations.is_empty());
        assert_eq!(store.upsert_calls(), 2);
        assert_eq!(store.load_calls(), 2);
    }

    #[tokio::test]
    async fn newer_remote_copy_is_kept() {
        let store = MemoryRemoteStore::new();
        store.insert("u1", conversation("a", 200));

        let outcome = store
            .upsert_conversation("u1", &conversation("a", 100), false)
            .await
            .unwrap();
        assert!(outcome.conflict_resolved);
        assert_eq!(store.get("u1", "a").unwrap().last_modified, 200);

        let outcome = store
            .upsert_conversation("u1", &conversation("a", 100), true)
            .await
            .unwrap();
        assert!(!outcome.conflict_resolved);
        assert_eq!(store.get("u1", "a").unwrap().last_modified, 100);
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MemoryRemoteStore::new();
        store.fail_upserts_for("a");

        let err = store
            .upsert_conversation("u1", &conversation("a", 1), false)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        store
            .upsert_conversation("u1", &conversation("b", 1), false)
            .await
            .unwrap();

        store.set_fail_loads(true);
        assert!(store.load_conversations("u1").await.is_err());

        store.clear_failures();
        store
            .upsert_conversation("u1", &conversation("a", 1), false)
            .await
            .unwrap();
        assert_eq!(store.len("u1"), 2);
    }

    #[tokio::test]
    async fn disconnected_store() {
        let store = MemoryRemoteStore::new();
        store.set_connected(false);
        assert!(!store.is_connected());

        let err = store
            .upsert_conversation("u1", &conversation("a", 1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotConnected));
        assert!(store.is_empty("u1"));
        assert_eq!(store.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn offline_remote_always_fails() {
        let remote = OfflineRemote;
        assert!(matches!(
            remote.load_conversations("u1").await,
            Err(EngineError::NotConnected)
        ));
        assert!(matches!(
            remote.upsert_conversation("u1", &conversation("a", 1), false).await,
            Err(EngineError::NotConnected)
        ));
    }

    #[test]
    fn snapshot_into_parts_tags_remote() {
        let snapshot = RemoteSnapshot {
            conversations: vec![conversation("a", 1).with_source(RecordSource::Local)],
            order: vec!["a".into()],
        };
        let (map, order) = snapshot.into_parts();
        assert_eq!(map["a"].source, RecordSource::Remote);
        assert_eq!(order, vec!["a"]);
    }
}
