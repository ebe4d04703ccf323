//! Configuration for the persistence engine.

use chatsync_model::ConflictPolicy;
use std::time::Duration;

/// Configuration for the persistence engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Policy used to merge conflicted conversations.
    pub conflict_policy: ConflictPolicy,
    /// Upper bound on a single remote call. `None` waits indefinitely.
    pub remote_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            retry: RetryConfig::default(),
            conflict_policy: ConflictPolicy::default(),
            remote_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the remote call timeout.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = Some(timeout);
        self
    }

    /// Disables the remote call timeout.
    pub fn without_remote_timeout(mut self) -> Self {
        self.remote_timeout = None;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
///
/// Retry `n` (1-based) waits `backoff[min(n - 1, len - 1)]` before it runs,
/// so the last entry is reused once the schedule is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before each retry.
    pub backoff: Vec<Duration>,
}

impl RetryConfig {
    /// Creates a retry configuration with the default 1s/2s/4s schedule.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ],
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            backoff: Vec::new(),
        }
    }

    /// Creates a configuration that retries without waiting.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: vec![Duration::ZERO],
        }
    }

    /// Sets the backoff schedule.
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the delay before the retry numbered `retry_count`.
    pub fn delay_for_attempt(&self, retry_count: u32) -> Duration {
        if retry_count == 0 || self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let index = (retry_count as usize - 1).min(self.backoff.len() - 1);
        self.backoff[index]
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Per-call options for a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Skip conflict detection and write the snapshot as given.
    pub force_overwrite: bool,
    /// Report the outcome through the notification sink.
    pub notify_user: bool,
    /// Hand a failed save to the retry worker.
    pub retry_on_failure: bool,
}

impl SaveOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self {
            force_overwrite: false,
            notify_user: true,
            retry_on_failure: true,
        }
    }

    /// Sets whether conflict detection is skipped.
    pub fn force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    /// Sets whether the outcome is reported to the user.
    pub fn notify_user(mut self, notify: bool) -> Self {
        self.notify_user = notify;
        self
    }

    /// Sets whether a failed save is retried in the background.
    pub fn retry_on_failure(mut self, retry: bool) -> Self {
        self.retry_on_failure = retry;
        self
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.conflict_policy, ConflictPolicy::MostMessages);
        assert_eq!(config.remote_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn config_builder() {
        let config = EngineConfig::new()
            .with_retry(RetryConfig::no_retry())
            .with_conflict_policy(ConflictPolicy::LastWriteWins)
            .without_remote_timeout();

        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.conflict_policy, ConflictPolicy::LastWriteWins);
        assert!(config.remote_timeout.is_none());

        let config = config.with_remote_timeout(Duration::from_secs(5));
        assert_eq!(config.remote_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn backoff_schedule() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(4));
        // Past the schedule the last delay repeats.
        assert_eq!(retry.delay_for_attempt(7), Duration::from_secs(4));
    }

    #[test]
    fn immediate_and_disabled_retries() {
        let retry = RetryConfig::immediate(5);
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.delay_for_attempt(4), Duration::ZERO);

        let retry = RetryConfig::no_retry();
        assert_eq!(retry.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn save_options_builder() {
        let options = SaveOptions::default();
        assert!(!options.force_overwrite);
        assert!(options.notify_user);
        assert!(options.retry_on_failure);

        let options = SaveOptions::new()
            .force_overwrite(true)
            .notify_user(false)
            .retry_on_failure(false);
        assert!(options.force_overwrite);
        assert!(!options.notify_user);
        assert!(!options.retry_on_failure);
    }
}
