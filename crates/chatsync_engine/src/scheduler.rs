//! Background retry of failed saves.
//!
//! A single worker task drains an unbounded channel, so at most one retry
//! runs at any time. Transactions enqueued while the worker is busy simply
//! wait their turn.

use crate::config::RetryConfig;
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use chatsync_model::{PersistenceResult, Transaction, TransactionId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Executes transactions on behalf of the retry worker.
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    /// Writes the transaction to the storage tiers.
    ///
    /// On success the transaction is committed.
    async fn execute(&self, transaction: &mut Transaction) -> EngineResult<PersistenceResult>;

    /// Called after a failed attempt, before the transaction is queued again.
    fn requeued(&self, _transaction: &Transaction) {}

    /// Called once a transaction has used up its retries.
    fn exhausted(&self, transaction: &Transaction, error: &EngineError);
}

/// Counters for the retry worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Transactions handed to the scheduler.
    pub enqueued: u64,
    /// Retry attempts executed.
    pub attempts: u64,
    /// Transactions that committed on a retry.
    pub committed: u64,
    /// Transactions that failed their last retry.
    pub exhausted: u64,
}

struct Shared {
    stats: Mutex<RetryStats>,
    dead_letters: Mutex<Vec<Transaction>>,
    outstanding: watch::Sender<usize>,
}

impl Shared {
    fn park(&self, transaction: Transaction) {
        self.dead_letters.lock().push(transaction);
    }

    fn finish(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    fn roll_back(&self, mut transaction: Transaction) {
        if let Err(e) = transaction.mark_rolled_back() {
            debug!(transaction = %transaction.id(), error = %e, "transaction not rolled back");
        }
        warn!(transaction = %transaction.id(), "retry abandoned, parked for manual retry");
        self.park(transaction);
        self.finish();
    }
}

/// Queue of failed transactions with exponential backoff.
pub struct RetryScheduler {
    sender: mpsc::UnboundedSender<Transaction>,
    stop: watch::Sender<bool>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RetryScheduler {
    /// Starts the retry worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: RetryConfig, executor: Arc<dyn TransactionExecutor>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0);
        let (stop, stopped) = watch::channel(false);
        let shared = Arc::new(Shared {
            stats: Mutex::new(RetryStats::default()),
            dead_letters: Mutex::new(Vec::new()),
            outstanding,
        });

        let worker = RetryWorker {
            config,
            executor,
            shared: Arc::clone(&shared),
            requeue: sender.downgrade(),
            receiver,
            stopped,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            sender,
            stop,
            shared,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queues a failed transaction for retry.
    ///
    /// If the worker has stopped, the transaction is rolled back, parked for
    /// manual retry and [`EngineError::SchedulerStopped`] is returned.
    pub fn enqueue(&self, transaction: Transaction) -> EngineResult<()> {
        let id = transaction.id();
        self.shared.outstanding.send_modify(|n| *n += 1);
        self.shared.stats.lock().enqueued += 1;

        match self.sender.send(transaction) {
            Ok(()) => {
                debug!(transaction = %id, "transaction queued for retry");
                Ok(())
            }
            Err(mpsc::error::SendError(transaction)) => {
                self.shared.roll_back(transaction);
                Err(EngineError::SchedulerStopped)
            }
        }
    }

    /// Parks a transaction that will not be retried automatically.
    pub fn park(&self, transaction: Transaction) {
        self.shared.park(transaction);
    }

    /// Removes a parked transaction so it can be run again.
    pub fn take_failed(&self, id: TransactionId) -> Option<Transaction> {
        let mut dead_letters = self.shared.dead_letters.lock();
        let index = dead_letters.iter().position(|t| t.id() == id)?;
        Some(dead_letters.remove(index))
    }

    /// Returns the ids of parked transactions, oldest first.
    pub fn failed(&self) -> Vec<TransactionId> {
        self.shared
            .dead_letters
            .lock()
            .iter()
            .map(Transaction::id)
            .collect()
    }

    /// Number of transactions queued or being retried.
    pub fn pending(&self) -> usize {
        *self.shared.outstanding.borrow()
    }

    /// Returns the worker counters.
    pub fn stats(&self) -> RetryStats {
        *self.shared.stats.lock()
    }

    /// Waits until no transaction is queued or being retried.
    pub async fn wait_idle(&self) {
        let mut outstanding = self.shared.outstanding.subscribe();
        // The sender lives in `shared`, so this cannot observe a closed channel.
        let _ = outstanding.wait_for(|n| *n == 0).await;
    }

    /// Stops the worker.
    ///
    /// The retry in progress finishes; everything still queued is rolled
    /// back and parked for manual retry.
    pub async fn shutdown(&self) {
        self.stop.send_replace(true);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "retry worker terminated abnormally");
            }
        }
    }
}

struct RetryWorker {
    config: RetryConfig,
    executor: Arc<dyn TransactionExecutor>,
    shared: Arc<Shared>,
    requeue: mpsc::WeakUnboundedSender<Transaction>,
    receiver: mpsc::UnboundedReceiver<Transaction>,
    stopped: watch::Receiver<bool>,
}

impl RetryWorker {
    async fn run(mut self) {
        debug!("retry worker started");
        loop {
            let next = tokio::select! {
                biased;
                _ = self.stopped.changed() => None,
                next = self.receiver.recv() => next,
            };
            match next {
                Some(transaction) => self.attempt(transaction).await,
                None => break,
            }
        }

        self.receiver.close();
        while let Ok(transaction) = self.receiver.try_recv() {
            self.shared.roll_back(transaction);
        }
        debug!("retry worker stopped");
    }

    async fn attempt(&self, mut transaction: Transaction) {
        let id = transaction.id();
        let retry_count = transaction.retry_count();
        let delay = self.config.delay_for_attempt(retry_count);
        debug!(transaction = %id, retry_count, delay_ms = delay.as_millis() as u64, "waiting to retry");
        tokio::time::sleep(delay).await;

        if let Err(e) = transaction.mark_pending() {
            debug!(transaction = %id, error = %e, "retrying transaction in its current state");
        }
        self.shared.stats.lock().attempts += 1;

        match self.executor.execute(&mut transaction).await {
            Ok(result) => {
                info!(transaction = %id, retry_count, source = %result.source, "retry committed");
                self.shared.stats.lock().committed += 1;
                self.shared.finish();
            }
            Err(err) => {
                if let Err(e) = transaction.mark_failed() {
                    debug!(transaction = %id, error = %e, "transaction already left pending");
                }
                if err.is_retryable() && transaction.can_retry(self.config.max_retries) {
                    let retry_count = transaction.increment_retry();
                    warn!(transaction = %id, retry_count, error = %err, "retry failed, queued again");
                    self.executor.requeued(&transaction);
                    self.send_again(transaction);
                } else {
                    error!(transaction = %id, retry_count, error = %err, "transaction permanently failed");
                    self.shared.stats.lock().exhausted += 1;
                    self.executor.exhausted(&transaction, &err);
                    self.shared.park(transaction);
                    self.shared.finish();
                }
            }
        }
    }

    fn send_again(&self, transaction: Transaction) {
        let Some(sender) = self.requeue.upgrade() else {
            self.shared.roll_back(transaction);
            return;
        };
        if let Err(mpsc::error::SendError(transaction)) = sender.send(transaction) {
            self.shared.roll_back(transaction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_model::{Conversations, RecordSource, TransactionStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` calls, then commits.
    struct ScriptedExecutor {
        failures: usize,
        calls: AtomicUsize,
        exhausted: Mutex<Vec<TransactionId>>,
    }

    impl ScriptedExecutor {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
                exhausted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TransactionExecutor for ScriptedExecutor {
        async fn execute(&self, transaction: &mut Transaction) -> EngineResult<PersistenceResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(EngineError::AllTiersFailed {
                    errors: vec![format!("attempt {call} failed")],
                });
            }
            transaction.mark_committed()?;
            Ok(PersistenceResult::committed(RecordSource::Local, transaction.id()))
        }

        fn exhausted(&self, transaction: &Transaction, _error: &EngineError) {
            self.exhausted.lock().push(transaction.id());
        }
    }

    fn failed_transaction() -> Transaction {
        let mut transaction = Transaction::new(Conversations::new());
        transaction.mark_failed().unwrap();
        transaction.increment_retry();
        transaction
    }

    #[tokio::test]
    async fn retry_commits_after_failures() {
        let executor = ScriptedExecutor::new(2);
        let scheduler = RetryScheduler::spawn(RetryConfig::immediate(3), executor.clone());

        scheduler.enqueue(failed_transaction()).unwrap();
        scheduler.wait_idle().await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        let stats = scheduler.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.exhausted, 0);
        assert!(scheduler.failed().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn exhausted_transaction_is_parked() {
        let executor = ScriptedExecutor::new(usize::MAX);
        let scheduler = RetryScheduler::spawn(RetryConfig::immediate(3), executor.clone());

        let transaction = failed_transaction();
        let id = transaction.id();
        scheduler.enqueue(transaction).unwrap();
        scheduler.wait_idle().await;

        // Enqueued with retry_count 1, so three attempts in total.
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.stats().exhausted, 1);
        assert_eq!(*executor.exhausted.lock(), vec![id]);
        assert_eq!(scheduler.failed(), vec![id]);

        let parked = scheduler.take_failed(id).unwrap();
        assert_eq!(parked.status(), TransactionStatus::Failed);
        assert_eq!(parked.retry_count(), 3);
        assert!(scheduler.take_failed(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_follows_schedule() {
        let executor = ScriptedExecutor::new(usize::MAX);
        let scheduler = RetryScheduler::spawn(RetryConfig::default(), executor.clone());

        let start = tokio::time::Instant::now();
        scheduler.enqueue(failed_transaction()).unwrap();
        scheduler.wait_idle().await;

        // 1s + 2s + 4s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "elapsed {elapsed:?}");
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn queue_is_drained_one_at_a_time() {
        let executor = ScriptedExecutor::new(0);
        let scheduler = RetryScheduler::spawn(RetryConfig::immediate(3), executor.clone());

        for _ in 0..5 {
            scheduler.enqueue(failed_transaction()).unwrap();
        }
        scheduler.wait_idle().await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), 5);
        assert_eq!(scheduler.stats().committed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rolls_back_queued() {
        let executor = ScriptedExecutor::new(0);
        let config = RetryConfig::new(3).with_backoff(vec![Duration::from_secs(60)]);
        let scheduler = RetryScheduler::spawn(config, executor.clone());

        let first = failed_transaction();
        let second = failed_transaction();
        let second_id = second.id();
        scheduler.enqueue(first).unwrap();
        scheduler.enqueue(second).unwrap();
        // Let the worker pick up the first transaction.
        tokio::task::yield_now().await;

        scheduler.shutdown().await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.failed(), vec![second_id]);
        let parked = scheduler.take_failed(second_id).unwrap();
        assert_eq!(parked.status(), TransactionStatus::RolledBack);
        assert_eq!(scheduler.pending(), 0);

        let err = scheduler.enqueue(failed_transaction()).unwrap_err();
        assert!(matches!(err, EngineError::SchedulerStopped));
        assert_eq!(scheduler.failed().len(), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_is_not_retried() {
        struct Fatal;

        #[async_trait]
        impl TransactionExecutor for Fatal {
            async fn execute(
                &self,
                _transaction: &mut Transaction,
            ) -> EngineResult<PersistenceResult> {
                Err(EngineError::remote_fatal("rejected"))
            }

            fn exhausted(&self, _transaction: &Transaction, _error: &EngineError) {}
        }

        let scheduler = RetryScheduler::spawn(RetryConfig::immediate(3), Arc::new(Fatal));
        scheduler.enqueue(failed_transaction()).unwrap();
        scheduler.wait_idle().await;

        let stats = scheduler.stats();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.exhausted, 1);
    }
}
