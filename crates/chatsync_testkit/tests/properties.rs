//! Property tests across the model, local tier and engine.

use chatsync_engine::{
    ConversationEngine, EngineConfig, LocalStore, NullSink, OfflineRemote, StaticIdentity,
    ACTIVE_KEY, CONVERSATIONS_KEY, ORDER_KEY, VERSION_KEY,
};
use chatsync_model::{
    normalize_order, ConflictPolicy, ConflictResolver, RecordSource, DEFAULT_CONVERSATION_ID,
};
use chatsync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #[test]
    fn normalized_order_lists_every_id_once(
        snapshot in snapshot_strategy(10, true),
        stored in prop::collection::vec(conversation_id_strategy(), 0..12),
    ) {
        let order = normalize_order(&stored, &snapshot);
        prop_assert_eq!(order.len(), snapshot.len());
        let unique: HashSet<_> = order.iter().collect();
        prop_assert_eq!(unique.len(), order.len());
        for id in &order {
            prop_assert!(snapshot.contains_key(id));
        }
    }

    #[test]
    fn merge_keeps_the_longer_transcript(
        local in conversation_strategy("c".to_string()),
        remote in conversation_strategy("c".to_string()),
    ) {
        let resolver = ConflictResolver::new(ConflictPolicy::MostMessages);
        let merged = resolver.merge(&local, &remote);

        prop_assert_eq!(merged.source, RecordSource::Merged);
        prop_assert_eq!(merged.last_modified, local.last_modified.max(remote.last_modified));
        prop_assert_eq!(
            merged.message_count(),
            local.message_count().max(remote.message_count())
        );
        if local.message_count() >= remote.message_count() {
            prop_assert_eq!(&merged.messages, &local.messages);
        }
    }

    #[test]
    fn only_newer_remote_records_conflict(
        local in snapshot_strategy(6, false),
        remote in snapshot_strategy(6, false),
    ) {
        let conflicts = ConflictResolver::default().detect(&local, &remote);
        for conflict in &conflicts {
            let ours = &local[&conflict.conversation_id];
            let theirs = &remote[&conflict.conversation_id];
            prop_assert!(theirs.last_modified > ours.last_modified);
        }
        let expected = local
            .iter()
            .filter(|(id, ours)| {
                remote.get(*id).is_some_and(|theirs| theirs.last_modified > ours.last_modified)
            })
            .count();
        prop_assert_eq!(conflicts.len(), expected);
    }

    #[test]
    fn repeated_save_is_idempotent(snapshot in snapshot_strategy(6, true)) {
        let backend = InMemoryBackend::new();
        let store = LocalStore::new(&backend);
        let order = normalize_order(&[], &snapshot);

        let first = store.save(&snapshot, &order).unwrap();
        let written = backend.snapshot();
        let second = store.save(&snapshot, &order).unwrap();

        prop_assert_eq!(second.changed, 0);
        prop_assert_eq!(second.version, first.version);
        prop_assert_eq!(backend.snapshot(), written);
    }

    #[test]
    fn versions_never_decrease(
        snapshots in prop::collection::vec(snapshot_strategy(4, false), 1..6),
    ) {
        let store = LocalStore::new(InMemoryBackend::new());
        let mut seen: HashMap<String, u64> = HashMap::new();

        for snapshot in &snapshots {
            let order = normalize_order(&[], snapshot);
            store.save(snapshot, &order).unwrap();
            for (id, conversation) in store.load().unwrap().conversations {
                if let Some(previous) = seen.get(&id) {
                    prop_assert!(conversation.version >= *previous);
                }
                seen.insert(id, conversation.version);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn load_always_has_default_conversation(
        conversations in prop::option::of(record_text_strategy()),
        order in prop::option::of(record_text_strategy()),
        active in prop::option::of(record_text_strategy()),
        version in prop::option::of(record_text_strategy()),
    ) {
        let backend = InMemoryBackend::new();
        for (key, text) in [
            (CONVERSATIONS_KEY, conversations),
            (ORDER_KEY, order),
            (ACTIVE_KEY, active),
            (VERSION_KEY, version),
        ] {
            if let Some(text) = text {
                backend.put(key, &text).unwrap();
            }
        }

        let outcome = runtime().block_on(async {
            let engine = ConversationEngine::new(
                EngineConfig::default(),
                backend,
                OfflineRemote,
                Arc::new(StaticIdentity::anonymous()),
                Arc::new(NullSink),
            );
            engine.load().await
        });

        prop_assert!(outcome.conversations.contains_key(DEFAULT_CONVERSATION_ID));
        prop_assert!(outcome.conversations.contains_key(&outcome.active_conversation_id));
        prop_assert_eq!(outcome.order.len(), outcome.conversations.len());
        prop_assert_eq!(outcome.source, RecordSource::Local);
    }
}
