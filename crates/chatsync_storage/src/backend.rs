//! Key/value backend trait definition.

use crate::error::{StorageError, StorageResult};
use std::sync::Arc;

/// A low-level key/value backend for the ChatSync local tier.
///
/// Backends are **opaque string stores**. Values are serialized JSON text
/// produced by the engine; backends never parse them.
///
/// # Invariants
///
/// - `get` returns exactly the value most recently `put` under that key
/// - `put` replaces the whole record; a failed `put` leaves the previous value
/// - Records are independent: a write to one key never touches another
/// - Backends must be `Send + Sync`; mutation goes through `&self`
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait KeyValueBackend: Send + Sync {
    /// Reads the record stored under `key`.
    ///
    /// Returns `None` if the key has never been written or was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replaces the record stored under `key`.
    ///
    /// After this returns successfully the value survives process
    /// termination (for persistent backends).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the backend refuses the
    /// write, or an I/O error occurs.
    fn put(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes the record stored under `key`.
    ///
    /// Returns true if a record existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Lists all stored keys in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the key listing cannot be read.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for Arc<B> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).put(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        (**self).remove(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        (**self).keys()
    }
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for &B {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).put(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        (**self).remove(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        (**self).keys()
    }
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for Box<B> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).put(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        (**self).remove(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        (**self).keys()
    }
}

/// Checks that a record key is usable by every backend.
///
/// Keys are 1-128 characters of `[A-Za-z0-9._-]` and may not start with a
/// dot, so they map directly onto file names.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for any other key.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_keys() {
        assert!(validate_key("chatsync.conversations").is_ok());
        assert!(validate_key("order_v2").is_ok());
        assert!(validate_key("a-b-c").is_ok());
    }

    #[test]
    fn rejects_path_like_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("dir/key").is_err());
        assert!(validate_key("with space").is_err());
        assert!(validate_key(&"k".repeat(129)).is_err());
    }
}
