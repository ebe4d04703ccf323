//! Export command implementation.

use super::open_existing;
use chatsync_engine::LoadOutcome;
use chatsync_model::Conversation;
use std::path::Path;
use tracing::warn;

/// Runs the export command.
pub async fn run(path: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_existing(path)?;
    let outcome = engine.load().await;
    for error in &outcome.errors {
        warn!(error = %error, "export may be incomplete");
    }

    let conversations = in_display_order(&outcome);
    let json = serde_json::to_string_pretty(&conversations)?;
    match output {
        Some(file) => {
            std::fs::write(file, json)?;
            println!(
                "Exported {} conversations to {:?}",
                conversations.len(),
                file
            );
        }
        None => println!("{}", json),
    }

    engine.shutdown().await;
    Ok(())
}

/// Returns the loaded conversations in display order.
pub fn in_display_order(outcome: &LoadOutcome) -> Vec<&Conversation> {
    outcome
        .order
        .iter()
        .filter_map(|id| outcome.conversations.get(id))
        .collect()
}
