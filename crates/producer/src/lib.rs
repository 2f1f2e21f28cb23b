// Rust guideline compliant 2026-10-18

//! Producer component -- generates transactions and publishes them as JSON
//! through the `Publisher` hexagonal port.
//!
//! Entry points: [`Producer::generate_batch`], [`Producer::produce_once`],
//! [`Producer::publish_scenario`], [`Producer::run`].
//! Configuration via [`ProducerConfig::builder`].

use chrono::Utc;
use domain::{PublishError, Publisher, Transaction};
use parking_lot::Mutex;
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// ProducerError
// ---------------------------------------------------------------------------

/// Errors that can occur during transaction production.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    /// The supplied configuration is invalid.
    #[error("invalid producer configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// A transaction could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    /// A publish failed.
    #[error("publish error: {source}")]
    Publish {
        /// The underlying publisher error.
        #[from]
        source: PublishError,
    },
}

// ---------------------------------------------------------------------------
// ProducerConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`Producer`].
///
/// Construct via [`ProducerConfig::builder`].
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Topic transactions are published to.
    pub topic: String,
    /// Maximum number of transactions per batch (range: `[1, n_max]`).
    pub n_max: usize,
    /// Number of distinct synthetic users (`user_1 ..= user_{users}`).
    pub users: u32,
    /// Delay between successive batches.
    pub poll_interval: Duration,
    /// Optional upper bound on the number of batches. `None` means infinite.
    pub iterations: Option<u64>,
    /// Optional RNG seed for reproducible batches. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Builder for [`ProducerConfig`].
///
/// Obtain via [`ProducerConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct ProducerConfigBuilder {
    topic: String,
    n_max: usize,
    users: u32,
    poll_interval: Duration,
    iterations: Option<u64>,
    seed: Option<u64>,
}

impl ProducerConfig {
    /// Create a builder. `n_max` is the only required parameter.
    ///
    /// Default values: `topic = "transactions"`, `users = 5`,
    /// `poll_interval = 1 s`, `iterations = None`, `seed = None`.
    #[must_use]
    pub fn builder(n_max: usize) -> ProducerConfigBuilder {
        ProducerConfigBuilder {
            topic: "transactions".to_owned(),
            n_max,
            users: 5,
            poll_interval: Duration::from_secs(1),
            iterations: None,
            seed: None,
        }
    }
}

impl ProducerConfigBuilder {
    /// Override the target topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Override the size of the synthetic user pool.
    #[must_use]
    pub fn users(mut self, users: u32) -> Self {
        self.users = users;
        self
    }

    /// Override the inter-batch delay.
    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set a finite batch count. Without this the producer runs until the
    /// publisher closes or shutdown is requested.
    #[must_use]
    pub fn iterations(mut self, n: u64) -> Self {
        self.iterations = Some(n);
        self
    }

    /// Fix the RNG seed for deterministic output (useful in tests).
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProducerError::InvalidConfig`] when `n_max` or `users` is
    /// zero, or the topic is blank.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<ProducerConfig, ProducerError> {
        if self.n_max == 0 {
            return Err(ProducerError::InvalidConfig { reason: "n_max must be >= 1".to_owned() });
        }
        if self.users == 0 {
            return Err(ProducerError::InvalidConfig { reason: "users must be >= 1".to_owned() });
        }
        if self.topic.trim().is_empty() {
            return Err(ProducerError::InvalidConfig {
                reason: "topic must not be empty".to_owned(),
            });
        }
        Ok(ProducerConfig {
            topic: self.topic,
            n_max: self.n_max,
            users: self.users,
            poll_interval: self.poll_interval,
            iterations: self.iterations,
            seed: self.seed,
        })
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// The canned demonstration set.
///
/// One high-amount foreign transaction (`txn_f1`), ten round amounts for
/// `user_2` (`txn_f2 ..= txn_f11`), and one clean transaction (`txn_n12`).
#[must_use]
pub fn scenario() -> Vec<Transaction> {
    let now = Utc::now();
    let tx = |id: &str, user: &str, amount: f64, location: &str| Transaction {
        transaction_id: id.to_owned(),
        user_id: user.to_owned(),
        amount,
        location: location.to_owned(),
        timestamp: now,
    };

    let mut set = vec![tx("txn_f1", "user_1", 6000.0, "Nigeria")];
    let round = [1000.0, 2000.0, 4000.0, 5000.0, 5000.0, 5000.0, 5000.0, 5000.0, 5000.0, 5000.0];
    for (i, amount) in round.into_iter().enumerate() {
        set.push(tx(&format!("txn_f{}", i + 2), "user_2", amount, "USA"));
    }
    set.push(tx("txn_n12", "user_3", 1234.0, "USA"));
    set
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Location pool for synthetic transactions; the first entry is the home country.
const LOCATIONS: &[&str] = &["USA", "USA", "USA", "Canada", "Nigeria", "Brazil", "Germany"];

/// Generates transactions and publishes them to a [`Publisher`] port.
///
/// Holds no concrete publisher reference -- dependency is injected per call.
#[derive(Debug)]
pub struct Producer {
    config: ProducerConfig,
    /// Locked only while generating; never held across an await.
    rng: Mutex<StdRng>,
}

impl Producer {
    /// Create a new producer from `config`.
    ///
    /// Seeds the RNG from `config.seed` if set, otherwise from the OS.
    #[must_use]
    pub fn new(config: ProducerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, rng: Mutex::new(rng) }
    }

    /// Generate one batch of random transactions.
    ///
    /// Batch size is uniformly distributed in `[1, config.n_max]`. Amounts
    /// are integer cents in `[0.01, 10_000.00]`, except one in ten which is a
    /// whole thousand.
    #[must_use]
    pub fn generate_batch(&self) -> Vec<Transaction> {
        let mut rng = self.rng.lock();
        let size = rng.random_range(1..=self.config.n_max);
        let mut batch = Vec::with_capacity(size);
        for _ in 0..size {
            let mut bytes = [0u8; 16];
            rng.fill_bytes(&mut bytes);
            let id = uuid::Builder::from_random_bytes(bytes).into_uuid();

            let amount = if rng.random_ratio(1, 10) {
                f64::from(rng.random_range(1u32..=10)) * 1000.0
            } else {
                // All values in [1, 1_000_000] are exactly representable as f64.
                f64::from(rng.random_range(1u32..=1_000_000u32)) / 100.0
            };

            let user = rng.random_range(1..=self.config.users);
            let location = LOCATIONS[rng.random_range(0..LOCATIONS.len())];

            batch.push(Transaction {
                transaction_id: format!("txn_{id}"),
                user_id: format!("user_{user}"),
                amount,
                location: location.to_owned(),
                timestamp: Utc::now(),
            });
        }
        batch
    }

    /// Publish `transactions` in order, keyed by user.
    ///
    /// # Errors
    ///
    /// Returns [`ProducerError::Publish`] on the first failed publish.
    pub async fn publish_all<P: Publisher>(
        &self,
        publisher: &P,
        transactions: &[Transaction],
    ) -> Result<(), ProducerError> {
        for tx in transactions {
            let payload = serde_json::to_vec(tx)?;
            publisher.publish(&self.config.topic, Some(&tx.user_id), payload).await?;
            tracing::debug!(transaction_id = %tx.transaction_id, "producer.transaction.sent");
        }
        Ok(())
    }

    /// Generate one batch and publish it.
    ///
    /// # Errors
    ///
    /// Propagates any publish failure.
    pub async fn produce_once<P: Publisher>(&self, publisher: &P) -> Result<(), ProducerError> {
        let batch = self.generate_batch();
        tracing::debug!(size = batch.len(), "producer.batch.generated");
        self.publish_all(publisher, &batch).await
    }

    /// Publish the canned demonstration set once.
    ///
    /// # Errors
    ///
    /// Propagates any publish failure.
    pub async fn publish_scenario<P: Publisher>(&self, publisher: &P) -> Result<(), ProducerError> {
        let set = scenario();
        self.publish_all(publisher, &set).await?;
        tracing::info!(count = set.len(), "producer.scenario.sent");
        Ok(())
    }

    /// Run the random production loop until stopped.
    ///
    /// Stops cleanly when:
    /// - the publisher signals [`PublishError::Closed`],
    /// - `shutdown` is cancelled, or
    /// - `config.iterations` batches have been published.
    ///
    /// # Errors
    ///
    /// Returns any other publish or encode error.
    pub async fn run<P: Publisher>(
        &self,
        publisher: &P,
        shutdown: CancellationToken,
    ) -> Result<(), ProducerError> {
        let mut count = 0u64;
        loop {
            match self.produce_once(publisher).await {
                Ok(()) => {}
                Err(ProducerError::Publish { source: PublishError::Closed }) => {
                    tracing::info!(count, "producer.run.stopped: publisher closed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }

            count += 1;
            tracing::info!(iteration = count, "producer.batch.written");

            if self.config.iterations.is_some_and(|max| count >= max) {
                tracing::info!("producer.run.stopped: iteration limit reached");
                return Ok(());
            }

            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!(count, "producer.run.stopped: shutdown");
                    return Ok(());
                }
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
