// Rust guideline compliant 2026-10-18

//! Retry scheduler -- re-submits transiently failed evaluations after
//! exponential backoff, bounded by a maximum retry count.
//!
//! Entry points: [`RetryScheduler::schedule`], [`RetryScheduler::run`].
//! Configuration via [`RetryConfig::builder`].
//!
//! Task lifecycle: `Pending(n)` -> `Done` on success; `Pending(n)` ->
//! `Pending(n + 1)` after `base_delay * 2^(n + 1)` on failure while
//! `n < max_retries`; otherwise `Abandoned`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use domain::{EvaluationError, Transaction};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// RetryError
// ---------------------------------------------------------------------------

/// Errors that can occur while configuring the retry scheduler.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// The supplied configuration is invalid.
    #[error("invalid retry configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// RetryConfig + builder
// ---------------------------------------------------------------------------

/// What to do when a task arrives and the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Abandon the incoming task; queued tasks are untouched.
    RejectNew,
    /// Abandon the longest-queued task to make room.
    DropOldest,
}

/// Runtime configuration for a [`RetryScheduler`].
///
/// Construct via [`RetryConfig::builder`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the first failed attempt.
    pub max_retries: u32,
    /// Unit of the exponential backoff; retry `k` waits `base_delay * 2^k`.
    pub base_delay: Duration,
    /// Maximum number of queued tasks.
    pub capacity: usize,
    /// Policy applied when `capacity` is reached.
    pub overflow: OverflowPolicy,
}

/// Builder for [`RetryConfig`].
///
/// Obtain via [`RetryConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct RetryConfigBuilder {
    max_retries: u32,
    base_delay: Duration,
    capacity: usize,
    overflow: OverflowPolicy,
}

impl RetryConfig {
    /// Create a builder.
    ///
    /// Default values: `max_retries = 3`, `base_delay = 1 s` (delays of
    /// 2, 4 and 8 s), `capacity = 10_000`, `overflow = RejectNew`.
    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            capacity: 10_000,
            overflow: OverflowPolicy::RejectNew,
        }
    }
}

impl RetryConfigBuilder {
    /// Override the retry cap.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the backoff unit.
    #[must_use]
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Override the queue bound.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Override the overflow policy.
    #[must_use]
    pub fn overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::InvalidConfig`] when `capacity` is zero or
    /// `max_retries` would overflow the backoff shift.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<RetryConfig, RetryError> {
        if self.capacity == 0 {
            return Err(RetryError::InvalidConfig { reason: "capacity must be >= 1".to_owned() });
        }
        if self.max_retries > 16 {
            return Err(RetryError::InvalidConfig {
                reason: "max_retries must be <= 16".to_owned(),
            });
        }
        Ok(RetryConfig {
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            capacity: self.capacity,
            overflow: self.overflow,
        })
    }
}

// ---------------------------------------------------------------------------
// RetryTask
// ---------------------------------------------------------------------------

/// A transaction waiting for its next evaluation attempt.
#[derive(Debug, Clone)]
pub struct RetryTask {
    /// The transaction to re-submit.
    pub transaction: Transaction,
    /// Retry number, starting at 1.
    pub attempt: u32,
    /// Earliest instant the task may run.
    pub eligible_at: Instant,
    /// Error that caused this retry.
    pub last_error: EvaluationError,
    /// Insertion order; breaks ties on `eligible_at` and picks the oldest on overflow.
    seq: u64,
}

/// Result of handing a failed transaction to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Queued; will run after `delay`.
    Scheduled {
        /// Retry number assigned.
        attempt: u32,
        /// Backoff before the retry becomes eligible.
        delay: Duration,
    },
    /// Retry cap reached; the transaction is dropped.
    Abandoned {
        /// Total evaluation attempts made, including the first.
        attempts: u32,
    },
    /// Queue full under [`OverflowPolicy::RejectNew`]; the transaction is dropped.
    Rejected,
}

/// Counters exposed for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Tasks accepted into the queue.
    pub scheduled: u64,
    /// Retries that succeeded.
    pub recovered: u64,
    /// Tasks dropped after exhausting the retry cap.
    pub abandoned: u64,
    /// Tasks dropped by the overflow policy.
    pub overflowed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    recovered: AtomicU64,
    abandoned: AtomicU64,
    overflowed: AtomicU64,
}

#[derive(Debug, Default)]
struct Queue {
    /// Ordered by eligibility, then insertion.
    tasks: BTreeMap<(Instant, u64), RetryTask>,
    next_seq: u64,
}

// ---------------------------------------------------------------------------
// RetryScheduler
// ---------------------------------------------------------------------------

/// Delay queue of failed transactions plus the loop that re-submits them.
///
/// Shared between the ingestion path (which calls [`schedule`](Self::schedule))
/// and the retry loop ([`run`](Self::run)); all methods take `&self`.
#[derive(Debug)]
pub struct RetryScheduler {
    config: RetryConfig,
    queue: Mutex<Queue>,
    wakeup: Notify,
    counters: Counters,
}

impl RetryScheduler {
    /// Create an empty scheduler from `config`.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(Queue::default()),
            wakeup: Notify::new(),
            counters: Counters::default(),
        }
    }

    /// Backoff before retry number `attempt` becomes eligible.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.config.base_delay.saturating_mul(1_u32 << attempt.min(16))
    }

    /// Queue the first retry of a transaction whose live evaluation failed.
    pub fn schedule(&self, transaction: Transaction, error: EvaluationError) -> ScheduleOutcome {
        self.after_failure(transaction, 0, error)
    }

    /// Decide what happens after evaluation attempt `failed_retry` failed.
    ///
    /// `failed_retry` is 0 for the live attempt and `n` for retry `n`.
    fn after_failure(
        &self,
        transaction: Transaction,
        failed_retry: u32,
        error: EvaluationError,
    ) -> ScheduleOutcome {
        if failed_retry >= self.config.max_retries {
            self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                transaction_id = %transaction.transaction_id,
                attempts = failed_retry + 1,
                error = %error,
                "retry.task.abandoned"
            );
            return ScheduleOutcome::Abandoned { attempts: failed_retry + 1 };
        }

        let attempt = failed_retry + 1;
        let delay = self.backoff(attempt);
        let eligible_at = Instant::now() + delay;

        {
            let mut queue = self.queue.lock();
            if queue.tasks.len() >= self.config.capacity {
                match self.config.overflow {
                    OverflowPolicy::RejectNew => {
                        drop(queue);
                        self.counters.overflowed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            transaction_id = %transaction.transaction_id,
                            capacity = self.config.capacity,
                            "retry.queue.overflow.rejected"
                        );
                        return ScheduleOutcome::Rejected;
                    }
                    OverflowPolicy::DropOldest => {
                        let oldest = queue
                            .tasks
                            .iter()
                            .min_by_key(|(_, t)| t.seq)
                            .map(|(k, _)| *k);
                        if let Some(key) = oldest
                            && let Some(evicted) = queue.tasks.remove(&key)
                        {
                            self.counters.overflowed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                transaction_id = %evicted.transaction.transaction_id,
                                capacity = self.config.capacity,
                                "retry.queue.overflow.dropped_oldest"
                            );
                        }
                    }
                }
            }

            let seq = queue.next_seq;
            queue.next_seq += 1;
            tracing::warn!(
                transaction_id = %transaction.transaction_id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retry.task.scheduled"
            );
            queue.tasks.insert(
                (eligible_at, seq),
                RetryTask { transaction, attempt, eligible_at, last_error: error, seq },
            );
        }

        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        self.wakeup.notify_one();
        ScheduleOutcome::Scheduled { attempt, delay }
    }

    /// Remove and return every task eligible at `now`, earliest first.
    #[must_use]
    pub fn take_ready(&self, now: Instant) -> Vec<RetryTask> {
        let mut queue = self.queue.lock();
        // seq never reaches u64::MAX, so the split point is never a real key.
        let later = queue.tasks.split_off(&(now, u64::MAX));
        let ready = std::mem::replace(&mut queue.tasks, later);
        ready.into_values().collect()
    }

    /// Put taken tasks back under their original queue position.
    fn requeue(&self, tasks: impl IntoIterator<Item = RetryTask>) {
        let mut queue = self.queue.lock();
        let mut count = 0_usize;
        for task in tasks {
            queue.tasks.insert((task.eligible_at, task.seq), task);
            count += 1;
        }
        if count > 0 {
            tracing::info!(count, "retry.run.requeued");
        }
    }

    /// Eligibility instant of the next queued task.
    #[must_use]
    pub fn next_eligible(&self) -> Option<Instant> {
        self.queue.lock().tasks.keys().next().map(|(at, _)| *at)
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().tasks.len()
    }

    /// Snapshot of the lifetime counters.
    #[must_use]
    pub fn stats(&self) -> RetryStats {
        RetryStats {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            recovered: self.counters.recovered.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
            overflowed: self.counters.overflowed.load(Ordering::Relaxed),
        }
    }

    /// Run the retry loop until `shutdown` is cancelled.
    ///
    /// Each pass re-submits every ready task through `resubmit`, then sleeps
    /// until the next eligibility instant, a new insertion, or shutdown.
    /// Ready tasks not yet re-submitted when shutdown is observed go back to
    /// the queue; everything still queued on exit is counted in the log.
    pub async fn run<F, Fut>(&self, resubmit: F, shutdown: CancellationToken)
    where
        F: Fn(Transaction) -> Fut,
        Fut: Future<Output = Result<(), EvaluationError>>,
    {
        tracing::info!("retry.run.started");
        loop {
            let mut ready = self.take_ready(Instant::now()).into_iter().peekable();
            while let Some(task) = ready.next_if(|_| !shutdown.is_cancelled()) {
                let id = task.transaction.transaction_id.clone();
                tracing::debug!(
                    transaction_id = %id,
                    attempt = task.attempt,
                    last_error = %task.last_error,
                    "retry.task.resubmitting"
                );
                match resubmit(task.transaction.clone()).await {
                    Ok(()) => {
                        self.counters.recovered.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(transaction_id = %id, attempt = task.attempt, "retry.task.done");
                    }
                    Err(e) => {
                        self.after_failure(task.transaction, task.attempt, e);
                    }
                }
            }
            self.requeue(ready);

            let next = self.next_eligible();
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = self.wakeup.notified() => {}
                () = sleep_until_or_forever(next) => {}
            }
        }
        tracing::info!(dropped = self.pending(), "retry.run.stopped");
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    fn make_tx(id: &str) -> Transaction {
        Transaction {
            transaction_id: id.to_owned(),
            user_id: "user_1".to_owned(),
            amount: 100.0,
            location: "USA".to_owned(),
            timestamp: Utc::now(),
        }
    }

    fn transient() -> EvaluationError {
        EvaluationError::StateUnavailable { reason: "mock failure".to_owned() }
    }

    fn make_scheduler(capacity: usize, overflow: OverflowPolicy) -> RetryScheduler {
        RetryScheduler::new(
            RetryConfig::builder().capacity(capacity).overflow(overflow).build().unwrap(),
        )
    }

    // ------------------------------------------------------------------
    // RetryConfig validation
    // ------------------------------------------------------------------

    #[test]
    fn config_rejects_zero_capacity() {
        let result = RetryConfig::builder().capacity(0).build();
        assert!(matches!(result, Err(RetryError::InvalidConfig { .. })));
    }

    #[test]
    fn builder_defaults() {
        let config = RetryConfig::builder().build().unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.overflow, OverflowPolicy::RejectNew);
    }

    // ------------------------------------------------------------------
    // Backoff and state machine
    // ------------------------------------------------------------------

    #[test]
    fn backoff_doubles_from_two_seconds() {
        let s = make_scheduler(10, OverflowPolicy::RejectNew);
        assert_eq!(s.backoff(1), Duration::from_secs(2));
        assert_eq!(s.backoff(2), Duration::from_secs(4));
        assert_eq!(s.backoff(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn first_failure_schedules_attempt_one() {
        let s = make_scheduler(10, OverflowPolicy::RejectNew);
        let outcome = s.schedule(make_tx("t1"), transient());
        assert_eq!(
            outcome,
            ScheduleOutcome::Scheduled { attempt: 1, delay: Duration::from_secs(2) }
        );
        assert_eq!(s.pending(), 1);
        assert_eq!(s.next_eligible(), Some(Instant::now() + Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn take_ready_respects_eligibility() {
        let s = make_scheduler(10, OverflowPolicy::RejectNew);
        let _ = s.schedule(make_tx("t1"), transient());
        assert!(s.take_ready(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_secs(2)).await;
        let ready = s.take_ready(Instant::now());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].transaction.transaction_id, "t1");
        assert_eq!(ready[0].attempt, 1);
        assert_eq!(s.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ties_are_fifo() {
        let s = make_scheduler(10, OverflowPolicy::RejectNew);
        let _ = s.schedule(make_tx("a"), transient());
        let _ = s.schedule(make_tx("b"), transient());
        let _ = s.schedule(make_tx("c"), transient());
        tokio::time::advance(Duration::from_secs(2)).await;
        let ids: Vec<_> =
            s.take_ready(Instant::now()).into_iter().map(|t| t.transaction.transaction_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    // ------------------------------------------------------------------
    // Overflow policies
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn reject_new_keeps_queue() {
        let s = make_scheduler(2, OverflowPolicy::RejectNew);
        let _ = s.schedule(make_tx("a"), transient());
        let _ = s.schedule(make_tx("b"), transient());
        assert_eq!(s.schedule(make_tx("c"), transient()), ScheduleOutcome::Rejected);
        assert_eq!(s.pending(), 2);
        assert_eq!(s.stats().overflowed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_oldest_makes_room() {
        let s = make_scheduler(2, OverflowPolicy::DropOldest);
        let _ = s.schedule(make_tx("a"), transient());
        let _ = s.schedule(make_tx("b"), transient());
        let outcome = s.schedule(make_tx("c"), transient());
        assert!(matches!(outcome, ScheduleOutcome::Scheduled { attempt: 1, .. }));
        assert_eq!(s.pending(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        let ids: Vec<_> =
            s.take_ready(Instant::now()).into_iter().map(|t| t.transaction.transaction_id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    // ------------------------------------------------------------------
    // Retry loop
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn always_failing_is_abandoned_after_three_retries() {
        let s = make_scheduler(10, OverflowPolicy::RejectNew);
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let call_times = parking_lot::Mutex::new(Vec::new());

        // Live attempt failed; the loop owns the next three.
        let _ = s.schedule(make_tx("doomed"), transient());

        tokio::join!(
            s.run(
                |_tx| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    call_times.lock().push(started.elapsed());
                    async { Err(transient()) }
                },
                token.clone(),
            ),
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                token.cancel();
            }
        );

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = s.stats();
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.recovered, 0);
        assert_eq!(s.pending(), 0);

        // 2 s, then +4 s, then +8 s.
        let times = call_times.lock().clone();
        for (got, want) in times.iter().zip([2_u64, 6, 14]) {
            let want = Duration::from_secs(want);
            assert!(*got >= want && *got < want + Duration::from_millis(100), "{got:?} vs {want:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_second_retry() {
        let s = make_scheduler(10, OverflowPolicy::RejectNew);
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let _ = s.schedule(make_tx("flaky"), transient());

        tokio::join!(
            s.run(
                |_tx| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { if n < 2 { Err(transient()) } else { Ok(()) } }
                },
                token.clone(),
            ),
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                token.cancel();
            }
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let stats = s.stats();
        assert_eq!(stats.recovered, 1);
        assert_eq!(stats.abandoned, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_loop_wakes_on_insertion() {
        let s = make_scheduler(10, OverflowPolicy::RejectNew);
        let token = CancellationToken::new();
        let seen = parking_lot::Mutex::new(Vec::new());

        tokio::join!(
            s.run(
                |tx| {
                    seen.lock().push(tx.transaction_id);
                    async { Ok(()) }
                },
                token.clone(),
            ),
            async {
                // Loop is parked with an empty queue.
                tokio::time::sleep(Duration::from_secs(5)).await;
                let _ = s.schedule(make_tx("late"), transient());
                tokio::time::sleep(Duration::from_secs(5)).await;
                token.cancel();
            }
        );

        assert_eq!(*seen.lock(), vec!["late".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_tasks() {
        let s = make_scheduler(10, OverflowPolicy::RejectNew);
        let token = CancellationToken::new();
        let _ = s.schedule(make_tx("never"), transient());
        token.cancel();
        s.run(|_tx| async { Ok(()) }, token).await;
        assert_eq!(s.pending(), 1);
        assert_eq!(s.stats().recovered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_batch_keeps_unsent_tasks() {
        let s = make_scheduler(10, OverflowPolicy::RejectNew);
        for id in ["a", "b", "c"] {
            let _ = s.schedule(make_tx(id), transient());
        }
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        s.run(
            |_tx| {
                calls.fetch_add(1, Ordering::SeqCst);
                token.cancel();
                async { Ok(()) }
            },
            token.clone(),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.stats().recovered, 1);
        assert_eq!(s.pending(), 2);
        let rest: Vec<_> = s
            .take_ready(Instant::now())
            .into_iter()
            .map(|t| t.transaction.transaction_id)
            .collect();
        assert_eq!(rest, vec!["b", "c"]);
    }

    #[test]
    fn zero_retries_abandons_immediately() {
        let s = RetryScheduler::new(RetryConfig::builder().max_retries(0).build().unwrap());
        assert_eq!(
            s.schedule(make_tx("t"), transient()),
            ScheduleOutcome::Abandoned { attempts: 1 }
        );
        assert_eq!(s.pending(), 0);
    }
}
