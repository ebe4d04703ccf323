//! Conflict detection and resolution.
//!
//! A conflict exists when the remote tier holds a record whose
//! `last_modified` is greater than the local record with the same id. Ids
//! only present locally are new records, never conflicts.

use crate::conversation::{Conversation, Conversations, RecordSource};
use serde::{Deserialize, Serialize};

/// A conversation whose remote copy is newer than the local one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    /// Conversation ID.
    pub conversation_id: String,
    /// Local `last_modified`.
    pub local_last_modified: u64,
    /// Remote `last_modified`.
    pub remote_last_modified: u64,
}

/// Policy for merging a conflicted conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep the side with more messages; ties keep local.
    ///
    /// Loses a newer edit that did not add messages (a rename, a pin).
    #[default]
    MostMessages,
    /// Keep the side with the greater `last_modified`; ties keep local.
    LastWriteWins,
    /// Local always wins.
    LocalWins,
    /// Remote always wins.
    RemoteWins,
}

impl ConflictPolicy {
    fn prefers_local(&self, local: &Conversation, remote: &Conversation) -> bool {
        match self {
            ConflictPolicy::MostMessages => local.message_count() >= remote.message_count(),
            ConflictPolicy::LastWriteWins => local.last_modified >= remote.last_modified,
            ConflictPolicy::LocalWins => true,
            ConflictPolicy::RemoteWins => false,
        }
    }
}

/// Compares local and remote snapshots and merges conflicted records.
///
/// The resolver is pure: it never talks to a store, so the coordinator
/// fetches the remote snapshot once and hands it to both `detect` and
/// `resolve`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    /// Creates a resolver using `policy`.
    #[must_use]
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Returns the merge policy.
    #[must_use]
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Lists conversations whose remote copy is strictly newer, sorted by id.
    #[must_use]
    pub fn detect(&self, local: &Conversations, remote: &Conversations) -> Vec<ConflictRecord> {
        let mut conflicts: Vec<ConflictRecord> = local
            .iter()
            .filter_map(|(id, ours)| {
                let theirs = remote.get(id)?;
                (theirs.last_modified > ours.last_modified).then(|| ConflictRecord {
                    conversation_id: id.clone(),
                    local_last_modified: ours.last_modified,
                    remote_last_modified: theirs.last_modified,
                })
            })
            .collect();
        conflicts.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        conflicts
    }

    /// Returns `local` with every conflicted record replaced by its merge.
    #[must_use]
    pub fn resolve(
        &self,
        local: &Conversations,
        remote: &Conversations,
        conflicts: &[ConflictRecord],
    ) -> Conversations {
        let mut resolved = local.clone();
        for conflict in conflicts {
            let id = &conflict.conversation_id;
            if let (Some(ours), Some(theirs)) = (local.get(id), remote.get(id)) {
                resolved.insert(id.clone(), self.merge(ours, theirs));
            }
        }
        resolved
    }

    /// Merges one conversation.
    ///
    /// The winning side supplies the content. `last_modified` becomes the
    /// maximum of both sides and `source` becomes `Merged`. Extra fields the
    /// winner lacks are taken from the other side.
    #[must_use]
    pub fn merge(&self, local: &Conversation, remote: &Conversation) -> Conversation {
        let (winner, other) = if self.policy.prefers_local(local, remote) {
            (local, remote)
        } else {
            (remote, local)
        };

        let mut merged = winner.clone();
        for (key, value) in &other.extra {
            merged
                .extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        merged.last_modified = local.last_modified.max(remote.last_modified);
        merged.version = local.version.max(remote.version);
        merged.source = RecordSource::Merged;
        merged
    }
}
