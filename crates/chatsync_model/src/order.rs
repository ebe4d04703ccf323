//! Display order of the conversation list.
//!
//! The order list is persisted next to the conversation map so the list can
//! be rendered without sorting, and so a damaged map entry does not scramble
//! it. It is kept most-recently-modified first.

use crate::conversation::Conversations;
use std::collections::HashSet;

/// Ids sorted by `last_modified` descending, ties broken by id ascending.
#[must_use]
pub fn recency_order(conversations: &Conversations) -> Vec<String> {
    let mut entries: Vec<(&String, u64)> = conversations
        .iter()
        .map(|(id, c)| (id, c.last_modified))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().map(|(id, _)| id.clone()).collect()
}

/// Repairs a stored order list against the conversation map.
///
/// Keeps the relative order of known ids, drops unknown and duplicate ids,
/// and appends ids missing from the list in recency order.
#[must_use]
pub fn normalize_order(order: &[String], conversations: &Conversations) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(conversations.len());
    let mut normalized = Vec::with_capacity(conversations.len());

    for id in order {
        if conversations.contains_key(id) && seen.insert(id.as_str()) {
            normalized.push(id.clone());
        }
    }

    for id in recency_order(conversations) {
        if !seen.contains(id.as_str()) {
            normalized.push(id);
        }
    }
    normalized
}
