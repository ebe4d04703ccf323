//! File-based key/value backend for persistent storage.

use crate::backend::{validate_key, KeyValueBackend};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "json.tmp";

/// A directory-based key/value backend.
///
/// Each key is stored as its own file, so a torn or corrupted record never
/// affects its neighbours:
///
/// ```text
/// <dir>/
/// ├─ LOCK                              # Advisory lock for single-writer
/// ├─ chatsync.conversations.json
/// ├─ chatsync.order.json
/// ├─ chatsync.active.json
/// └─ chatsync.version.json
/// ```
///
/// # Durability
///
/// `put` writes to a temporary file, syncs it, renames it over the record
/// and syncs the directory (write-then-rename).
///
/// # Thread Safety
///
/// The backend holds an exclusive advisory lock on the directory for its
/// lifetime. Writes within the process are serialized internally.
///
/// # Example
///
/// ```no_run
/// use chatsync_storage::{FileBackend, KeyValueBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("chats")).unwrap();
/// backend.put("chatsync.version", "42").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    write_lock: Mutex<()>,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a backend rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - `dir` exists but is not a directory
    /// - Another process holds the lock (returns `Locked`)
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        if !dir.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("path is not a directory: {}", dir.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: dir.to_path_buf(),
            });
        }

        tracing::debug!(dir = %dir.display(), "opened file backend");

        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the backend directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXT}"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{TEMP_EXT}"))
    }

    #[cfg(unix)]
    fn sync_dir(&self) -> StorageResult<()> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        match fs::read_to_string(self.record_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        let temp_path = self.temp_path(key);
        let mut file = File::create(&temp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.record_path(key))?;
        self.sync_dir()
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        match fs::remove_file(self.record_path(key)) {
            Ok(()) => {
                self.sync_dir()?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let suffix = format!(".{RECORD_EXT}");
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(key) = name.strip_suffix(&suffix) {
                if validate_key(key).is_ok() {
                    keys.push(key.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chats");

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.keys().unwrap().is_empty());
        assert!(path.join(LOCK_FILE).exists());
    }

    #[test]
    fn file_put_and_get() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put("chatsync.order", "[\"a\",\"b\"]").unwrap();
        assert_eq!(
            backend.get("chatsync.order").unwrap().as_deref(),
            Some("[\"a\",\"b\"]")
        );
        assert!(dir.path().join("chatsync.order.json").exists());
        assert!(!dir.path().join("chatsync.order.json.tmp").exists());
    }

    #[test]
    fn file_missing_key() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.get("absent").unwrap(), None);
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend.put("version", "3").unwrap();
        }

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            assert_eq!(backend.get("version").unwrap().as_deref(), Some("3"));
        }
    }

    #[test]
    fn file_remove() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put("active", "\"x\"").unwrap();
        assert!(backend.remove("active").unwrap());
        assert!(!backend.remove("active").unwrap());
        assert_eq!(backend.get("active").unwrap(), None);
    }

    #[test]
    fn file_keys_ignore_foreign_files() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put("b", "2").unwrap();
        backend.put("a", "1").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::write(dir.path().join("c.json.tmp"), "partial").unwrap();

        assert_eq!(backend.keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileBackend::open(dir.path()).unwrap();

        let second = FileBackend::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked { .. })));
    }

    #[test]
    fn file_rejects_invalid_key() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(matches!(
            backend.put("../outside", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.path(), dir.path());
    }
}
