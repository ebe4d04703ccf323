//! Verify command implementation.

use chatsync_engine::{ACTIVE_KEY, CONVERSATIONS_KEY, ORDER_KEY, VERSION_KEY};
use chatsync_model::{Conversations, DEFAULT_CONVERSATION_ID};
use chatsync_storage::{FileBackend, KeyValueBackend};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of valid records.
    pub valid_records: usize,
    /// Number of corrupt records.
    pub corrupt_records: usize,
    /// Problems that load repairs on its own.
    pub warnings: Vec<String>,
    /// Records that cannot be parsed.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.corrupt_records == 0 && self.errors.is_empty()
    }

    /// Parses one record, counting it as valid or corrupt.
    fn check<T: DeserializeOwned>(
        &mut self,
        backend: &dyn KeyValueBackend,
        key: &str,
    ) -> Result<Option<T>, Box<dyn std::error::Error>> {
        let Some(raw) = backend.get(key)? else {
            return Ok(None);
        };
        self.records_checked += 1;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.valid_records += 1;
                Ok(Some(value))
            }
            Err(e) => {
                self.corrupt_records += 1;
                self.errors.push(format!("{key}: {e}"));
                Ok(None)
            }
        }
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store found at {:?}", path).into());
    }
    println!("Verifying store at {:?}", path);
    println!();

    let backend = FileBackend::open(path)?;
    let result = verify_store(&backend)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

/// Checks each record of a store independently.
pub fn verify_store(
    backend: &dyn KeyValueBackend,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();

    let known = [CONVERSATIONS_KEY, ORDER_KEY, ACTIVE_KEY, VERSION_KEY];
    for key in backend.keys()? {
        if !known.contains(&key.as_str()) {
            result.warnings.push(format!("unrecognized record {key}"));
        }
    }

    let conversations: Option<Conversations> = result.check(backend, CONVERSATIONS_KEY)?;
    let order: Option<Vec<String>> = result.check(backend, ORDER_KEY)?;
    let active: Option<String> = result.check(backend, ACTIVE_KEY)?;
    let version: Option<u64> = result.check(backend, VERSION_KEY)?;

    let Some(conversations) = conversations else {
        return Ok(result);
    };

    for (key, conversation) in &conversations {
        if key != &conversation.id {
            result
                .warnings
                .push(format!("{key} holds conversation {}", conversation.id));
        }
    }
    if !conversations.contains_key(DEFAULT_CONVERSATION_ID) {
        result
            .warnings
            .push("default conversation missing".to_string());
    }

    if let Some(order) = order {
        let mut seen = HashSet::new();
        for id in &order {
            if !conversations.contains_key(id) {
                result.warnings.push(format!("order lists unknown conversation {id}"));
            } else if !seen.insert(id.as_str()) {
                result.warnings.push(format!("order lists {id} twice"));
            }
        }
        let missing = conversations.len() - seen.len();
        if missing > 0 {
            result
                .warnings
                .push(format!("order is missing {missing} conversation(s)"));
        }
    }

    if let Some(active) = active {
        if !conversations.contains_key(&active) {
            result
                .warnings
                .push(format!("active conversation {active} does not exist"));
        }
    }

    let newest = conversations.values().map(|c| c.version).max().unwrap_or(0);
    if version.unwrap_or(0) < newest {
        result
            .warnings
            .push(format!("version stamp is behind record version {newest}"));
    }

    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("  Records checked: {}", result.records_checked);
    println!("  Valid records:   {}", result.valid_records);
    println!("  Corrupt records: {}", result.corrupt_records);

    if !result.warnings.is_empty() {
        println!("  Warnings (repaired on load):");
        for warning in &result.warnings {
            println!("    - {}", warning);
        }
    }
    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in result.errors.iter().take(10) {
            println!("    - {}", error);
        }
        if result.errors.len() > 10 {
            println!("    ... and {} more", result.errors.len() - 10);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_storage::InMemoryBackend;
    use chatsync_testkit::{conversation, snapshot};

    fn store_with(conversations: &Conversations, order: &[&str]) -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend
            .put(CONVERSATIONS_KEY, &serde_json::to_string(conversations).unwrap())
            .unwrap();
        backend
            .put(ORDER_KEY, &serde_json::to_string(order).unwrap())
            .unwrap();
        backend
    }

    #[test]
    fn empty_store_passes() {
        let result = verify_store(&InMemoryBackend::new()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.records_checked, 0);
    }

    #[test]
    fn healthy_store_passes() {
        let data = snapshot([
            conversation("a", 1, 100),
            conversation(DEFAULT_CONVERSATION_ID, 0, 50),
        ]);
        let backend = store_with(&data, &["a", DEFAULT_CONVERSATION_ID]);
        backend.put(ACTIVE_KEY, "\"a\"").unwrap();

        let result = verify_store(&backend).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.valid_records, 3);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn drift_is_reported_as_warnings() {
        let data = snapshot([conversation("a", 1, 100), conversation("b", 1, 200)]);
        let backend = store_with(&data, &["a", "a", "ghost"]);
        backend.put(ACTIVE_KEY, "\"gone\"").unwrap();
        backend.put("stray", "1").unwrap();

        let result = verify_store(&backend).unwrap();
        assert!(result.is_ok());
        let warnings = result.warnings.join("\n");
        assert!(warnings.contains("unrecognized record stray"));
        assert!(warnings.contains("default conversation missing"));
        assert!(warnings.contains("order lists a twice"));
        assert!(warnings.contains("unknown conversation ghost"));
        assert!(warnings.contains("missing 1 conversation"));
        assert!(warnings.contains("active conversation gone"));
    }

    #[test]
    fn corrupt_records_fail() {
        let backend = InMemoryBackend::new();
        backend.put(CONVERSATIONS_KEY, "{\"a\":").unwrap();
        backend.put(VERSION_KEY, "\"x\"").unwrap();

        let result = verify_store(&backend).unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.corrupt_records, 2);
        assert!(result.errors[0].starts_with(CONVERSATIONS_KEY));
    }
}
