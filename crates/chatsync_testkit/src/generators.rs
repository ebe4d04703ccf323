//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random conversations and snapshots
//! that keep ids unique and valid.

use chatsync_model::{Conversation, Conversations, Message, MessageRole, DEFAULT_CONVERSATION_ID};
use proptest::prelude::*;

/// Strategy for generating conversation ids.
pub fn conversation_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating message roles.
pub fn role_strategy() -> impl Strategy<Value = MessageRole> {
    prop_oneof![
        Just(MessageRole::User),
        Just(MessageRole::Assistant),
        Just(MessageRole::System),
    ]
}

/// Strategy for generating transcripts with unique message ids.
pub fn messages_strategy(max: usize) -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec((role_strategy(), ".{0,40}", 0u64..1_000_000), 0..=max).prop_map(
        |items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (role, content, timestamp))| {
                    Message::new(format!("m{i}"), role, content, timestamp)
                })
                .collect()
        },
    )
}

/// Strategy for generating a conversation with the given id.
pub fn conversation_strategy(id: String) -> impl Strategy<Value = Conversation> {
    (
        "[A-Za-z ]{1,20}",
        messages_strategy(6),
        1u64..1_000_000,
        any::<bool>(),
    )
        .prop_map(move |(title, messages, last_modified, is_pinned)| {
            Conversation::new(id.clone(), title)
                .with_messages(messages)
                .with_last_modified(last_modified)
                .pinned(is_pinned)
        })
}

/// Strategy for generating snapshots of up to `max` conversations.
///
/// The default conversation is included when `with_default` is true.
pub fn snapshot_strategy(max: usize, with_default: bool) -> impl Strategy<Value = Conversations> {
    prop::collection::btree_set(conversation_id_strategy(), 0..=max)
        .prop_flat_map(|ids| {
            ids.into_iter()
                .filter(|id| id != DEFAULT_CONVERSATION_ID)
                .map(conversation_strategy)
                .collect::<Vec<_>>()
        })
        .prop_map(move |conversations| {
            let mut snapshot: Conversations = conversations
                .into_iter()
                .map(|conversation| (conversation.id.clone(), conversation))
                .collect();
            if with_default {
                snapshot.insert(
                    DEFAULT_CONVERSATION_ID.to_string(),
                    Conversation::default_bucket(1),
                );
            }
            snapshot
        })
}

/// Strategy for generating arbitrary record contents, valid JSON or not.
pub fn record_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("null".to_string()),
        Just("[]".to_string()),
        Just("{}".to_string()),
        ".{0,64}",
        any::<i64>().prop_map(|n| n.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn ids_are_valid_record_suffixes(id in conversation_id_strategy()) {
            prop_assert!(!id.is_empty());
            prop_assert!(id.len() <= 16);
        }

        #[test]
        fn snapshot_keys_match_ids(snapshot in snapshot_strategy(8, true)) {
            prop_assert!(snapshot.contains_key(DEFAULT_CONVERSATION_ID));
            for (key, conversation) in &snapshot {
                prop_assert_eq!(key, &conversation.id);
            }
        }
    }
}
