//! Backend wrapper with injectable failures.

use chatsync_storage::{KeyValueBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Wraps a backend and fails reads or writes on demand.
pub struct FlakyBackend<B> {
    inner: B,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    failures_left: AtomicUsize,
    writes: AtomicUsize,
}

impl<B: KeyValueBackend> FlakyBackend<B> {
    /// Wraps a backend; nothing fails until configured.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            failures_left: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Makes every read fail until cleared.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every write fail until cleared.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("injected read failure"));
        }
        Ok(())
    }

    fn check_write(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("injected write failure"));
        }
        let consumed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(StorageError::unavailable("injected write failure"));
        }
        Ok(())
    }
}

impl<B: KeyValueBackend> KeyValueBackend for FlakyBackend<B> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check_read()?;
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_write()?;
        self.inner.put(key, value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        self.check_write()?;
        self.inner.remove(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.check_read()?;
        self.inner.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_storage::InMemoryBackend;

    #[test]
    fn passes_through_by_default() {
        let backend = FlakyBackend::new(InMemoryBackend::new());
        backend.put("a", "1").unwrap();
        assert_eq!(backend.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(backend.writes(), 1);
    }

    #[test]
    fn injected_failures() {
        let backend = FlakyBackend::new(InMemoryBackend::new());

        backend.fail_writes(true);
        assert!(backend.put("a", "1").is_err());
        backend.fail_writes(false);

        backend.fail_next_writes(2);
        assert!(backend.put("a", "1").is_err());
        assert!(backend.put("a", "1").is_err());
        backend.put("a", "1").unwrap();

        backend.fail_reads(true);
        assert!(backend.get("a").is_err());
        assert!(backend.keys().is_err());
        assert_eq!(backend.inner().len(), 1);
    }
}
