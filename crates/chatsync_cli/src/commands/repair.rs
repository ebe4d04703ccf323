//! Repair command implementation.

use super::open_existing;
use chatsync_engine::SaveOptions;
use chatsync_model::DEFAULT_CONVERSATION_ID;
use std::path::Path;

/// Runs the repair command.
///
/// Rewrites the order, active and version records from the conversations
/// record. A corrupt conversations record cannot be repaired here.
pub async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_existing(path)?;
    let before = engine.local().load().map_err(|e| {
        format!("Cannot repair {:?}: {e}. Restore the conversations from an export.", path)
    })?;

    let outcome = engine.load().await;
    let synthesized = !before.conversations.contains_key(DEFAULT_CONVERSATION_ID);
    let active_changed =
        before.active_conversation_id.as_deref() != Some(outcome.active_conversation_id.as_str());

    engine
        .save(
            outcome.conversations,
            SaveOptions::new()
                .force_overwrite(true)
                .notify_user(false)
                .retry_on_failure(false),
        )
        .await?;
    engine.set_active_conversation(&outcome.active_conversation_id)?;

    println!("Repaired store at {:?}", path);
    for key in &before.repaired {
        println!("  - rebuilt {}", key);
    }
    if synthesized {
        println!("  - added default conversation");
    }
    if active_changed {
        println!("  - active conversation set to {}", outcome.active_conversation_id);
    }
    println!("  Version stamp: {}", engine.local().version()?);

    engine.shutdown().await;
    Ok(())
}
