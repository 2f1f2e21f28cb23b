// Rust guideline compliant 2026-10-18

//! Consumer component -- reads raw messages from one partition, decodes them,
//! screens each through the [`Pipeline`], and hands transient failures to the
//! retry scheduler.
//!
//! Entry points: [`Consumer::consume_once`], [`Consumer::run`].
//! Configuration via [`ConsumerConfig::builder`].

mod metrics;
mod pipeline;

pub use metrics::PipelineMetrics;
pub use pipeline::{Outcome, Pipeline};

use domain::{Alarm, FraudSink, MessageSource, Transaction};
use retry::{RetryScheduler, ScheduleOutcome};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// ConsumerError
// ---------------------------------------------------------------------------

/// Errors that can occur during message consumption.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// The supplied configuration is invalid.
    #[error("invalid consumer configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The source has no more messages.
    #[error("message source closed")]
    SourceClosed,
}

// ---------------------------------------------------------------------------
// ConsumerConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`Consumer`].
///
/// Construct via [`ConsumerConfig::builder`].
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Label used in log lines, e.g. the consumer group.
    pub group_id: String,
    /// Optional upper bound on messages handled. `None` means infinite.
    pub iterations: Option<u64>,
}

/// Builder for [`ConsumerConfig`].
///
/// Obtain via [`ConsumerConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct ConsumerConfigBuilder {
    group_id: String,
    iterations: Option<u64>,
}

impl ConsumerConfig {
    /// Create a builder. `group_id` is the only required parameter.
    #[must_use]
    pub fn builder(group_id: impl Into<String>) -> ConsumerConfigBuilder {
        ConsumerConfigBuilder { group_id: group_id.into(), iterations: None }
    }
}

impl ConsumerConfigBuilder {
    /// Set a finite message count. Without this the consumer runs until the
    /// source closes or shutdown is requested.
    #[must_use]
    pub fn iterations(mut self, n: u64) -> Self {
        self.iterations = Some(n);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::InvalidConfig`] when `group_id` is blank.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<ConsumerConfig, ConsumerError> {
        if self.group_id.trim().is_empty() {
            return Err(ConsumerError::InvalidConfig {
                reason: "group_id must not be empty".to_owned(),
            });
        }
        Ok(ConsumerConfig { group_id: self.group_id, iterations: self.iterations })
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// How one message was handed off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Payload could not be decoded; dropped.
    Malformed,
    /// Evaluated on the live path.
    Screened(Outcome),
    /// Evaluation failed; passed to the retry scheduler.
    Retrying(ScheduleOutcome),
}

/// Pull loop over one partition.
///
/// Holds no adapter references -- the source, pipeline, and scheduler are
/// injected per call, so one `Consumer` can drive any number of partitions.
#[derive(Debug)]
pub struct Consumer {
    config: ConsumerConfig,
}

impl Consumer {
    /// Create a new consumer from `config`.
    #[must_use]
    pub fn new(config: ConsumerConfig) -> Self {
        Self { config }
    }

    /// Receive one message, screen it, and commit its offset.
    ///
    /// The offset is committed only after the message is fully handed off
    /// (screened, queued for retry, or dropped as malformed); a crash before
    /// that point leads to redelivery.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::SourceClosed`] when the source is exhausted.
    pub async fn consume_once<M, S, A>(
        &self,
        source: &mut M,
        pipeline: &Pipeline<S, A>,
        retry: &RetryScheduler,
    ) -> Result<Handled, ConsumerError>
    where
        M: MessageSource,
        S: FraudSink,
        A: Alarm,
    {
        let message = source.recv().await.ok_or(ConsumerError::SourceClosed)?;

        let tx = match Transaction::decode(&message.payload) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "consumer.message.malformed"
                );
                source.commit(message.offset);
                return Ok(Handled::Malformed);
            }
        };

        tracing::info!(
            transaction_id = %tx.transaction_id,
            partition = message.partition,
            offset = message.offset,
            "consumer.message.received"
        );

        let handled = match pipeline.process(&tx).await {
            Ok(outcome) => Handled::Screened(outcome),
            Err(e) => Handled::Retrying(retry.schedule(tx, e)),
        };

        source.commit(message.offset);
        Ok(handled)
    }

    /// Run the consumption loop until stopped.
    ///
    /// Stops cleanly when:
    /// - the source signals end of stream,
    /// - `shutdown` is cancelled (checked between messages), or
    /// - `config.iterations` messages have been handled.
    ///
    /// Returns the number of messages handled.
    ///
    /// # Errors
    ///
    /// Currently infallible beyond the conditions above; the `Result` leaves
    /// room for fatal source errors.
    pub async fn run<M, S, A>(
        &self,
        mut source: M,
        pipeline: &Pipeline<S, A>,
        retry: &RetryScheduler,
        shutdown: CancellationToken,
    ) -> Result<u64, ConsumerError>
    where
        M: MessageSource,
        S: FraudSink,
        A: Alarm,
    {
        let mut count = 0u64;
        loop {
            let step = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!(group = %self.config.group_id, count, "consumer.run.stopped: shutdown");
                    return Ok(count);
                }
                step = self.consume_once(&mut source, pipeline, retry) => step,
            };

            match step {
                Ok(_) => {}
                Err(ConsumerError::SourceClosed) => {
                    tracing::info!(group = %self.config.group_id, count, "consumer.run.stopped: source closed");
                    return Ok(count);
                }
                Err(e) => return Err(e),
            }

            count += 1;

            if self.config.iterations.is_some_and(|max| count >= max) {
                tracing::info!(group = %self.config.group_id, "consumer.run.stopped: iteration limit reached");
                return Ok(count);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use chrono::Utc;
    use domain::{
        Alarm, AlarmError, FraudSink, FraudVerdict, MessageSource, PersistOutcome, RawMessage,
        SinkError, Transaction,
    };
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub(crate) fn make_tx(id: &str, user: &str, amount: f64, location: &str) -> Transaction {
        Transaction {
            transaction_id: id.to_owned(),
            user_id: user.to_owned(),
            amount,
            location: location.to_owned(),
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn encode(tx: &Transaction) -> Vec<u8> {
        serde_json::to_vec(tx).unwrap()
    }

    /// Pre-loaded partition; records commits.
    #[derive(Debug, Default)]
    pub(crate) struct MockSource {
        queue: VecDeque<RawMessage>,
        next_offset: u64,
        pub(crate) committed: Vec<u64>,
    }

    impl MockSource {
        pub(crate) fn new(payloads: Vec<Vec<u8>>) -> Self {
            let mut source = Self::default();
            for payload in payloads {
                source.push(payload);
            }
            source
        }

        pub(crate) fn push(&mut self, payload: Vec<u8>) {
            self.queue.push_back(RawMessage {
                topic: "transactions".to_owned(),
                partition: 0,
                offset: self.next_offset,
                key: None,
                payload,
            });
            self.next_offset += 1;
        }
    }

    impl MessageSource for MockSource {
        async fn recv(&mut self) -> Option<RawMessage> {
            self.queue.pop_front()
        }

        fn commit(&mut self, offset: u64) {
            self.committed.push(offset);
        }
    }

    /// In-memory sink with id dedup; optionally fails every write.
    #[derive(Debug, Default)]
    pub(crate) struct MockSink {
        rows: Mutex<Vec<FraudVerdict>>,
        fail: bool,
    }

    impl MockSink {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }

        pub(crate) fn stored_ids(&self) -> Vec<String> {
            self.rows.lock().iter().map(|v| v.id().to_owned()).collect()
        }

        pub(crate) fn stored(&self) -> Vec<FraudVerdict> {
            self.rows.lock().clone()
        }
    }

    impl FraudSink for MockSink {
        async fn persist(&self, verdict: &FraudVerdict) -> Result<PersistOutcome, SinkError> {
            if self.fail {
                return Err(SinkError::Unavailable { reason: "mock failure".to_owned() });
            }
            let mut rows = self.rows.lock();
            if rows.iter().any(|v| v.id() == verdict.id()) {
                return Ok(PersistOutcome::Duplicate);
            }
            rows.push(verdict.clone());
            Ok(PersistOutcome::Inserted)
        }

        async fn list_all(&self) -> Result<Vec<FraudVerdict>, SinkError> {
            Ok(self.stored())
        }

        async fn list_by_user(&self, user_id: &str) -> Result<Vec<FraudVerdict>, SinkError> {
            Ok(self.stored().into_iter().filter(|v| v.transaction.user_id == user_id).collect())
        }
    }

    /// Counts triggers; optionally fails each one.
    #[derive(Debug, Default)]
    pub(crate) struct MockAlarm {
        calls: AtomicU32,
        always_fail: bool,
    }

    impl MockAlarm {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn always_failing() -> Self {
            Self { always_fail: true, ..Self::default() }
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Alarm for MockAlarm {
        async fn trigger(&self, verdict: &FraudVerdict) -> Result<(), AlarmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.always_fail {
                return Err(AlarmError::DeliveryFailed {
                    reason: format!("mock fail for tx {}", verdict.id()),
                });
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
