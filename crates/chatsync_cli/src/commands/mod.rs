//! CLI command implementations.

pub mod export;
pub mod import;
pub mod inspect;
pub mod repair;
pub mod verify;

use chatsync_engine::{
    ConversationEngine, EngineConfig, OfflineRemote, RetryConfig, StaticIdentity, TracingSink,
};
use chatsync_storage::FileBackend;
use std::path::Path;
use std::sync::Arc;

/// Engine over a store directory, local tier only.
pub type LocalEngine = ConversationEngine<FileBackend, OfflineRemote>;

/// Opens an existing store directory.
pub fn open_existing(path: &Path) -> Result<LocalEngine, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store found at {:?}", path).into());
    }
    open(path)
}

/// Opens a store directory, creating it if needed.
///
/// The CLI never retries: a failed save is reported immediately.
pub fn open(path: &Path) -> Result<LocalEngine, Box<dyn std::error::Error>> {
    let backend = FileBackend::open(path)?;
    Ok(ConversationEngine::new(
        EngineConfig::default().with_retry(RetryConfig::no_retry()),
        backend,
        OfflineRemote,
        Arc::new(StaticIdentity::anonymous()),
        Arc::new(TracingSink),
    ))
}
