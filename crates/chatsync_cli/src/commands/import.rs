//! Import command implementation.

use super::open;
use chatsync_engine::SaveOptions;
use chatsync_model::{Conversation, Conversations, RecordSource};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Accepted shapes of an import file.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    List(Vec<Conversation>),
    Map(HashMap<String, Conversation>),
}

/// What an import would change.
#[derive(Debug)]
pub struct ImportPlan {
    /// Conversation set to save.
    pub conversations: Conversations,
    /// Conversations that did not exist before.
    pub added: usize,
    /// Existing conversations replaced by the imported copy.
    pub updated: usize,
    /// Imported conversations dropped in favour of a newer stored copy.
    pub skipped: usize,
}

/// Runs the import command.
pub async fn run(path: &Path, file: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)?;
    let imported = parse_conversations(&text)?;

    let engine = open(path)?;
    let outcome = engine.load().await;
    if !outcome.errors.is_empty() && !force {
        return Err(format!(
            "Store at {:?} is damaged ({}); run verify, or pass --force to overwrite",
            path,
            outcome.errors.join("; ")
        )
        .into());
    }

    let plan = plan_import(outcome.conversations, imported, force);
    let result = engine
        .save(
            plan.conversations,
            SaveOptions::new()
                .force_overwrite(true)
                .notify_user(false)
                .retry_on_failure(false),
        )
        .await?;

    println!(
        "Imported {} new, {} updated, {} skipped (saved to {} tier)",
        plan.added, plan.updated, plan.skipped, result.source
    );
    engine.shutdown().await;
    Ok(())
}

/// Parses a JSON array of conversations or a JSON object of id → conversation.
pub fn parse_conversations(text: &str) -> Result<Vec<Conversation>, serde_json::Error> {
    let conversations = match serde_json::from_str(text)? {
        ImportFile::List(list) => list,
        ImportFile::Map(map) => {
            let mut list: Vec<Conversation> = map.into_values().collect();
            list.sort_by(|a, b| a.id.cmp(&b.id));
            list
        }
    };
    Ok(conversations)
}

/// Merges imported conversations into the stored set.
///
/// A stored conversation is replaced when the imported copy is newer, or
/// always with `force`.
pub fn plan_import(
    mut conversations: Conversations,
    imported: Vec<Conversation>,
    force: bool,
) -> ImportPlan {
    let (mut added, mut updated, mut skipped) = (0, 0, 0);
    for mut conversation in imported {
        conversation.source = RecordSource::Local;
        match conversations.get(&conversation.id) {
            None => added += 1,
            Some(stored) if force || conversation.last_modified > stored.last_modified => {
                updated += 1
            }
            Some(_) => {
                skipped += 1;
                continue;
            }
        }
        conversations.insert(conversation.id.clone(), conversation);
    }
    ImportPlan {
        conversations,
        added,
        updated,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_testkit::{conversation, snapshot};

    #[test]
    fn parses_array_and_map() {
        let list = serde_json::to_string(&vec![conversation("a", 1, 10)]).unwrap();
        assert_eq!(parse_conversations(&list).unwrap()[0].id, "a");

        let map = serde_json::to_string(&snapshot([
            conversation("b", 0, 10),
            conversation("a", 2, 20),
        ]))
        .unwrap();
        let parsed = parse_conversations(&map).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, "a");
        assert_eq!(parsed[0].message_count(), 2);

        assert!(parse_conversations("42").is_err());
    }

    #[test]
    fn newer_stored_copy_wins_without_force() {
        let stored = snapshot([conversation("a", 3, 200), conversation("b", 1, 100)]);
        let imported = vec![
            conversation("a", 1, 100),
            conversation("b", 2, 300),
            conversation("c", 1, 50),
        ];

        let plan = plan_import(stored, imported, false);
        assert_eq!((plan.added, plan.updated, plan.skipped), (1, 1, 1));
        assert_eq!(plan.conversations["a"].message_count(), 3);
        assert_eq!(plan.conversations["b"].message_count(), 2);
        assert_eq!(plan.conversations.len(), 3);
    }

    #[test]
    fn force_replaces_everything() {
        let stored = snapshot([conversation("a", 3, 200)]);
        let plan = plan_import(stored, vec![conversation("a", 1, 100)], true);
        assert_eq!(plan.updated, 1);
        assert_eq!(plan.conversations["a"].message_count(), 1);
    }

    #[tokio::test]
    async fn import_then_export_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        let file = dir.path().join("import.json");
        std::fs::write(
            &file,
            serde_json::to_string(&vec![conversation("a", 2, 100), conversation("b", 1, 200)])
                .unwrap(),
        )
        .unwrap();

        run(&store, &file, false).await.unwrap();

        let engine = crate::commands::open_existing(&store).unwrap();
        let outcome = engine.load().await;
        let ordered = crate::commands::export::in_display_order(&outcome);
        assert_eq!(ordered.len(), 3);
        let ids: Vec<_> = ordered
            .iter()
            .filter(|c| !c.is_default_bucket())
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, ["b", "a"]);
        engine.shutdown().await;
    }
}
