//! Inspect command implementation.

use super::open_existing;
use chatsync_model::Conversation;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Number of conversations.
    pub conversation_count: usize,
    /// Number of messages across all conversations.
    pub message_count: usize,
    /// Number of pinned conversations.
    pub pinned_count: usize,
    /// Last version stamp handed out.
    pub version: u64,
    /// Stored active conversation id.
    pub active_conversation_id: Option<String>,
    /// Records that were unreadable and ignored.
    pub repaired: Vec<String>,
    /// Conversations in display order.
    pub conversations: Vec<ConversationSummary>,
}

/// Summary of a single conversation.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    /// Conversation id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Number of messages.
    pub messages: usize,
    /// Logical modification time.
    pub last_modified: u64,
    /// Version stamp.
    pub version: u64,
    /// Pinned flag.
    pub pinned: bool,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            messages: conversation.message_count(),
            last_modified: conversation.last_modified,
            version: conversation.version,
            pinned: conversation.is_pinned,
        }
    }
}

/// Runs the inspect command.
pub async fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_existing(path)?;
    let snapshot = engine.local().load()?;

    let conversations: Vec<ConversationSummary> = snapshot
        .order
        .iter()
        .filter_map(|id| snapshot.conversations.get(id))
        .map(ConversationSummary::from)
        .collect();
    let result = InspectResult {
        path: path.display().to_string(),
        conversation_count: conversations.len(),
        message_count: conversations.iter().map(|c| c.messages).sum(),
        pinned_count: conversations.iter().filter(|c| c.pinned).count(),
        version: snapshot.version,
        active_conversation_id: snapshot.active_conversation_id,
        repaired: snapshot.repaired,
        conversations,
    };

    // Output
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("ChatSync Store Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Contents:");
    println!("  Conversations: {}", result.conversation_count);
    println!("  Messages:      {}", result.message_count);
    println!("  Pinned:        {}", result.pinned_count);
    println!();
    println!("Metadata:");
    println!("  Version stamp: {}", result.version);
    println!(
        "  Active:        {}",
        result.active_conversation_id.as_deref().unwrap_or("(none)")
    );
    if !result.repaired.is_empty() {
        println!("  Unreadable:    {}", result.repaired.join(", "));
    }

    if !result.conversations.is_empty() {
        println!();
        println!("Conversations:");
        for (position, c) in result.conversations.iter().enumerate() {
            println!(
                "  {:>3}. {}{} \"{}\" - {} messages, modified {}, v{}",
                position + 1,
                c.id,
                if c.pinned { " [pinned]" } else { "" },
                c.title,
                c.messages,
                c.last_modified,
                c.version
            );
        }
    }
}
