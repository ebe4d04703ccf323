//! Transaction coordination across the local and remote tiers.

use crate::config::{EngineConfig, SaveOptions};
use crate::error::{EngineError, EngineResult};
use crate::identity::IdentityProvider;
use crate::local::LocalStore;
use crate::notify::{Notification, NotificationAction, NotificationSink};
use crate::remote::{RemoteSnapshot, RemoteStore};
use crate::scheduler::{RetryScheduler, RetryStats, TransactionExecutor};
use async_trait::async_trait;
use chatsync_model::{
    ensure_default_bucket, normalize_order, now_millis, recency_order, ConflictResolver,
    Conversations, PersistenceResult, RecordSource, Transaction, TransactionId,
    DEFAULT_CONVERSATION_ID,
};
use chatsync_storage::KeyValueBackend;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a load produced.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// Conversations keyed by id. Always contains the default conversation.
    pub conversations: Conversations,
    /// Display order covering every conversation exactly once.
    pub order: Vec<String>,
    /// Selected conversation; the default conversation if none is stored.
    pub active_conversation_id: String,
    /// Tier the data came from.
    pub source: RecordSource,
    /// Tier failures absorbed along the way.
    pub errors: Vec<String>,
}

impl LoadOutcome {
    fn minimal(now: u64, errors: Vec<String>) -> Self {
        let mut conversations = Conversations::new();
        ensure_default_bucket(&mut conversations, now);
        Self {
            conversations,
            order: vec![DEFAULT_CONVERSATION_ID.to_string()],
            active_conversation_id: DEFAULT_CONVERSATION_ID.to_string(),
            source: RecordSource::Local,
            errors,
        }
    }
}

/// Persists conversation snapshots to a local and a remote tier.
///
/// Saves write the local tier first and then upsert every conversation to
/// the remote tier concurrently. A save succeeds if either tier accepted it.
/// Failed saves are retried in the background with exponential backoff.
///
/// Must be created from within a Tokio runtime.
pub struct ConversationEngine<B, R> {
    core: Arc<EngineCore<B, R>>,
    scheduler: RetryScheduler,
}

impl<B, R> ConversationEngine<B, R>
where
    B: KeyValueBackend + 'static,
    R: RemoteStore + 'static,
{
    /// Creates an engine and starts its retry worker.
    pub fn new(
        config: EngineConfig,
        backend: B,
        remote: R,
        identity: Arc<dyn IdentityProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let core = Arc::new(EngineCore {
            resolver: ConflictResolver::new(config.conflict_policy),
            local: LocalStore::new(backend),
            remote,
            identity,
            sink,
            active: Mutex::new(HashMap::new()),
            config,
        });
        let executor: Arc<dyn TransactionExecutor> = core.clone();
        let scheduler = RetryScheduler::spawn(core.config.retry.clone(), executor);
        Self { core, scheduler }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Returns the local tier.
    pub fn local(&self) -> &LocalStore<B> {
        &self.core.local
    }

    /// Returns the remote tier.
    pub fn remote(&self) -> &R {
        &self.core.remote
    }

    /// Saves a full conversation snapshot.
    ///
    /// Unless `force_overwrite` is set, records the remote holds in a newer
    /// version are merged first. When neither tier accepts the write and
    /// retries are enabled, the transaction is queued and an unsuccessful
    /// result is returned; once retries are ruled out the error is returned.
    pub async fn save(
        &self,
        conversations: Conversations,
        options: SaveOptions,
    ) -> EngineResult<PersistenceResult> {
        let mut transaction = Transaction::new(conversations).with_notify_user(options.notify_user);
        let id = transaction.id();
        self.core.track(&transaction);
        debug!(
            transaction = %id,
            conversations = transaction.conversations().len(),
            "save requested"
        );

        let conflicts_resolved = if options.force_overwrite {
            0
        } else {
            self.core.reconcile(&mut transaction).await
        };

        match self.core.execute_atomic_save(&mut transaction).await {
            Ok(result) => {
                let result = result.with_conflicts_resolved(conflicts_resolved);
                if options.notify_user {
                    self.core.notify_saved(&result);
                }
                Ok(result)
            }
            Err(err) => self
                .handle_failure(transaction, err, options)
                .map(|result| result.with_conflicts_resolved(conflicts_resolved)),
        }
    }

    fn handle_failure(
        &self,
        mut transaction: Transaction,
        err: EngineError,
        options: SaveOptions,
    ) -> EngineResult<PersistenceResult> {
        let id = transaction.id();
        if let Err(e) = transaction.mark_failed() {
            debug!(transaction = %id, error = %e, "transaction already left pending");
        }

        let max_retries = self.core.config.retry.max_retries;
        if options.retry_on_failure && err.is_retryable() && transaction.can_retry(max_retries) {
            let retry_count = transaction.increment_retry();
            warn!(transaction = %id, retry_count, error = %err, "save failed, retry scheduled");
            self.core.track(&transaction);
            if let Err(e) = self.scheduler.enqueue(transaction) {
                error!(transaction = %id, error = %err, scheduler = %e, "save failed, retry worker stopped");
                self.core.forget(id);
                if options.notify_user {
                    self.core.notify_failed(id);
                }
                return Err(err);
            }
            if options.notify_user {
                self.core.sink.notify(Notification::warning(format!(
                    "Couldn't save your conversations, retrying ({retry_count} of {max_retries})"
                )));
            }
            return Ok(PersistenceResult::retrying(id, retry_count, err.messages()));
        }

        error!(transaction = %id, error = %err, "save failed");
        self.core.forget(id);
        self.scheduler.park(transaction);
        if options.notify_user {
            self.core.notify_failed(id);
        }
        Err(err)
    }

    /// Loads the conversation set.
    ///
    /// Prefers the remote tier when a user is signed in and mirrors what it
    /// returns into the local tier. Falls back to the local tier, then to a
    /// state holding only the default conversation. Never fails.
    pub async fn load(&self) -> LoadOutcome {
        let now = now_millis();
        let mut errors = Vec::new();

        if let Some(user_id) = self.core.identity.current_user_id() {
            let remote = self
                .core
                .with_timeout(self.core.remote.load_conversations(&user_id))
                .await;
            match remote {
                Ok(snapshot) => return self.core.adopt_remote(snapshot, errors, now),
                Err(e) => {
                    warn!(error = %e, "remote load failed, using local tier");
                    errors.push(format!("remote: {e}"));
                }
            }
        }

        match self.core.local.load() {
            Ok(snapshot) => {
                let mut conversations = snapshot.conversations;
                if ensure_default_bucket(&mut conversations, now) {
                    debug!("default conversation synthesized");
                }
                let order = normalize_order(&snapshot.order, &conversations);
                let active_conversation_id =
                    active_or_default(snapshot.active_conversation_id, &conversations);
                info!(conversations = conversations.len(), "loaded from local tier");
                LoadOutcome {
                    conversations,
                    order,
                    active_conversation_id,
                    source: RecordSource::Local,
                    errors,
                }
            }
            Err(e) => {
                error!(error = %e, "local load failed, starting from an empty state");
                errors.push(format!("local: {e}"));
                LoadOutcome::minimal(now, errors)
            }
        }
    }

    /// Persists the selected conversation id in the local tier.
    pub fn set_active_conversation(&self, id: &str) -> EngineResult<()> {
        self.core.local.set_active_conversation(id)
    }

    /// Runs a parked transaction again, immediately.
    ///
    /// The transaction is parked again if the attempt fails.
    pub async fn retry_now(&self, id: TransactionId) -> EngineResult<PersistenceResult> {
        let mut transaction = self
            .scheduler
            .take_failed(id)
            .ok_or(EngineError::UnknownTransaction(id))?;
        if let Err(e) = transaction.mark_pending() {
            self.scheduler.park(transaction);
            return Err(e.into());
        }
        info!(transaction = %id, retry_count = transaction.retry_count(), "manual retry");
        self.core.track(&transaction);

        match self.core.execute_atomic_save(&mut transaction).await {
            Ok(result) => {
                self.core
                    .sink
                    .notify(Notification::success("Your conversations were saved"));
                Ok(result)
            }
            Err(err) => {
                if let Err(e) = transaction.mark_failed() {
                    debug!(transaction = %id, error = %e, "transaction already left pending");
                }
                error!(transaction = %id, error = %err, "manual retry failed");
                self.core.forget(id);
                self.scheduler.park(transaction);
                self.core.notify_failed(id);
                Err(err)
            }
        }
    }

    /// Ids of transactions that have not reached a terminal state.
    pub fn active_transactions(&self) -> Vec<TransactionId> {
        let mut ids: Vec<_> = self.core.active.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Ids of parked transactions awaiting a manual retry.
    pub fn failed_transactions(&self) -> Vec<TransactionId> {
        self.scheduler.failed()
    }

    /// Number of transactions queued or being retried.
    pub fn pending_retries(&self) -> usize {
        self.scheduler.pending()
    }

    /// Returns the retry worker counters.
    pub fn retry_stats(&self) -> RetryStats {
        self.scheduler.stats()
    }

    /// Waits until the retry queue is empty.
    pub async fn wait_for_retries(&self) {
        self.scheduler.wait_idle().await;
    }

    /// Stops the retry worker. Queued transactions are parked.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        let parked = self.scheduler.failed();
        self.core.active.lock().retain(|id, _| !parked.contains(id));
        info!(parked = parked.len(), "conversation engine stopped");
    }
}

/// State shared between the engine and its retry worker.
struct EngineCore<B, R> {
    config: EngineConfig,
    resolver: ConflictResolver,
    local: LocalStore<B>,
    remote: R,
    identity: Arc<dyn IdentityProvider>,
    sink: Arc<dyn NotificationSink>,
    active: Mutex<HashMap<TransactionId, Transaction>>,
}

impl<B, R> EngineCore<B, R>
where
    B: KeyValueBackend,
    R: RemoteStore,
{
    fn track(&self, transaction: &Transaction) {
        self.active.lock().insert(transaction.id(), transaction.clone());
    }

    fn forget(&self, id: TransactionId) {
        if self.active.lock().remove(&id).is_none() {
            debug!(transaction = %id, "transaction was no longer active");
        }
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = EngineResult<T>>,
    ) -> EngineResult<T> {
        match self.config.remote_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout(limit)),
            },
            None => call.await,
        }
    }

    /// Merges records the remote holds in a newer version into the
    /// transaction. Returns the number of merged records.
    async fn reconcile(&self, transaction: &mut Transaction) -> usize {
        let id = transaction.id();
        let Some(user_id) = self.identity.current_user_id() else {
            return 0;
        };
        let snapshot = match self.with_timeout(self.remote.load_conversations(&user_id)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(transaction = %id, error = %e, "conflict check skipped");
                return 0;
            }
        };

        let (remote, _) = snapshot.into_parts();
        let conflicts = self.resolver.detect(transaction.conversations(), &remote);
        if conflicts.is_empty() {
            return 0;
        }
        for conflict in &conflicts {
            info!(
                transaction = %id,
                conversation_id = %conflict.conversation_id,
                local = conflict.local_last_modified,
                remote = conflict.remote_last_modified,
                policy = ?self.resolver.policy(),
                "merging newer remote copy"
            );
        }

        let merged = self
            .resolver
            .resolve(transaction.conversations(), &remote, &conflicts);
        if let Err(e) = transaction.replace_conversations(merged) {
            warn!(transaction = %id, error = %e, "merged snapshot discarded");
            return 0;
        }
        conflicts.len()
    }

    /// Writes the transaction to the local tier, then to the remote tier.
    async fn execute_atomic_save(
        &self,
        transaction: &mut Transaction,
    ) -> EngineResult<PersistenceResult> {
        let id = transaction.id();
        let mut errors = Vec::new();

        let order = recency_order(transaction.conversations());
        let local_ok = match self.local.save(transaction.conversations(), &order) {
            Ok(write) => {
                debug!(transaction = %id, version = write.version, changed = write.changed, "local write done");
                true
            }
            Err(e) => {
                warn!(transaction = %id, error = %e, "local write failed");
                errors.push(format!("local: {e}"));
                false
            }
        };

        let remote_ok = match self.identity.current_user_id() {
            Some(user_id) => match self.push_remote(&user_id, transaction.conversations()).await {
                Ok(Some(kept_remote)) => {
                    debug!(transaction = %id, kept_remote, "remote write done");
                    true
                }
                Ok(None) => {
                    debug!(transaction = %id, "nothing to write remotely");
                    false
                }
                Err(remote_errors) => {
                    errors.extend(remote_errors);
                    false
                }
            },
            None => {
                debug!(transaction = %id, "signed out, remote write skipped");
                false
            }
        };

        if !local_ok && !remote_ok {
            return Err(EngineError::AllTiersFailed { errors });
        }

        let source = if remote_ok {
            RecordSource::Remote
        } else {
            RecordSource::Local
        };
        transaction.mark_committed()?;
        self.forget(id);
        info!(
            transaction = %id,
            source = %source,
            retry_count = transaction.retry_count(),
            "transaction committed"
        );
        Ok(PersistenceResult::committed(source, id)
            .with_errors(errors)
            .with_retry_count(transaction.retry_count()))
    }

    /// Upserts every conversation except the default one, concurrently.
    ///
    /// Returns how many upserts kept a newer remote copy, `None` if there was
    /// nothing to upsert, or one message per failed upsert.
    async fn push_remote(
        &self,
        user_id: &str,
        conversations: &Conversations,
    ) -> Result<Option<usize>, Vec<String>> {
        let upserts: Vec<_> = conversations
            .values()
            .filter(|conversation| !conversation.is_default_bucket())
            .map(|conversation| async move {
                let outcome = self
                    .with_timeout(self.remote.upsert_conversation(user_id, conversation, false))
                    .await;
                (conversation.id.as_str(), outcome)
            })
            .collect();
        if upserts.is_empty() {
            return Ok(None);
        }

        let mut kept_remote = 0;
        let mut errors = Vec::new();
        for (conversation_id, outcome) in join_all(upserts).await {
            match outcome {
                Ok(outcome) if outcome.conflict_resolved => kept_remote += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(conversation_id, error = %e, "remote upsert failed");
                    errors.push(format!("remote {conversation_id}: {e}"));
                }
            }
        }

        if errors.is_empty() {
            Ok(Some(kept_remote))
        } else {
            Err(errors)
        }
    }

    fn adopt_remote(&self, snapshot: RemoteSnapshot, mut errors: Vec<String>, now: u64) -> LoadOutcome {
        let (mut conversations, order) = snapshot.into_parts();

        let local = match self.local.load() {
            Ok(local) => Some(local),
            Err(e) => {
                warn!(error = %e, "local tier unreadable during remote load");
                None
            }
        };
        // The remote never stores the default conversation; keep the local one.
        if !conversations.contains_key(DEFAULT_CONVERSATION_ID) {
            if let Some(default) = local
                .as_ref()
                .and_then(|local| local.conversations.get(DEFAULT_CONVERSATION_ID))
            {
                conversations.insert(DEFAULT_CONVERSATION_ID.to_string(), default.clone());
            }
        }
        ensure_default_bucket(&mut conversations, now);
        let order = normalize_order(&order, &conversations);

        if let Err(e) = self.local.save(&conversations, &order) {
            warn!(error = %e, "could not mirror remote data locally");
            errors.push(format!("local: {e}"));
        }

        let stored_active = local.and_then(|local| local.active_conversation_id);
        info!(conversations = conversations.len(), "loaded from remote tier");
        LoadOutcome {
            active_conversation_id: active_or_default(stored_active, &conversations),
            conversations,
            order,
            source: RecordSource::Remote,
            errors,
        }
    }

    fn notify_failed(&self, id: TransactionId) {
        self.sink.notify(
            Notification::error("Couldn't save your conversations")
                .with_action(NotificationAction::RetryNow(id)),
        );
    }

    fn notify_saved(&self, result: &PersistenceResult) {
        if result.conflicts_resolved > 0 {
            let noun = if result.conflicts_resolved == 1 {
                "conversation"
            } else {
                "conversations"
            };
            self.sink.notify(Notification::success(format!(
                "Merged {} {noun} with newer changes from another device",
                result.conflicts_resolved
            )));
        }
        if result.is_partial() {
            let message = match result.source {
                RecordSource::Remote => "Saved to the cloud, but not on this device",
                _ => "Saved on this device only; cloud sync will catch up",
            };
            self.sink.notify(Notification::warning(message));
        }
    }
}

#[async_trait]
impl<B, R> TransactionExecutor for EngineCore<B, R>
where
    B: KeyValueBackend + 'static,
    R: RemoteStore + 'static,
{
    async fn execute(&self, transaction: &mut Transaction) -> EngineResult<PersistenceResult> {
        self.execute_atomic_save(transaction).await
    }

    fn requeued(&self, transaction: &Transaction) {
        self.track(transaction);
    }

    fn exhausted(&self, transaction: &Transaction, error: &EngineError) {
        let id = transaction.id();
        self.forget(id);
        debug!(transaction = %id, error = %error, "retries exhausted");
        if !transaction.notify_user() {
            return;
        }
        self.sink.notify(
            Notification::error(format!(
                "Couldn't save your conversations after {} retries",
                transaction.retry_count()
            ))
            .with_action(NotificationAction::RetryNow(id)),
        );
    }
}

fn active_or_default(candidate: Option<String>, conversations: &Conversations) -> String {
    candidate
        .filter(|id| conversations.contains_key(id))
        .unwrap_or_else(|| DEFAULT_CONVERSATION_ID.to_string())
}
