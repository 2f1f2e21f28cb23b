// Rust guideline compliant 2026-10-18

//! Process settings read from the environment.
//!
//! Every key has a default, so an empty environment yields a runnable
//! configuration. Keys are the upper-case field names (`PARTITIONS`,
//! `SINK_URL`, ...).

use anyhow::Context as _;
use config::{Config, Environment};
use retry::OverflowPolicy;
use serde::Deserialize;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// What the built-in producer publishes at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerMode {
    /// Nothing; transactions come from elsewhere.
    Off,
    /// Random batches until shutdown.
    Random,
    /// The canned demonstration set, once.
    Scenario,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum RetryOverflow {
    RejectNew,
    DropOldest,
}

impl From<RetryOverflow> for OverflowPolicy {
    fn from(value: RetryOverflow) -> Self {
        match value {
            RetryOverflow::RejectNew => Self::RejectNew,
            RetryOverflow::DropOldest => Self::DropOldest,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    kafka_brokers: String,
    kafka_topic_transactions: String,
    kafka_group_id: String,
    partitions: u32,
    port: u16,
    log_level: String,
    log_format: LogFormat,
    log_file: String,
    fraud_log_file: String,
    sink_url: String,
    retry_capacity: usize,
    retry_overflow: RetryOverflow,
    producer_mode: ProducerMode,
}

/// Validated process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Broker list; informational for the in-process bus.
    pub brokers: String,
    /// Topic carrying transaction events.
    pub topic: String,
    /// Consumer group id.
    pub group_id: String,
    /// Partitions per topic.
    pub partitions: u32,
    /// HTTP listen port.
    pub port: u16,
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_format: LogFormat,
    /// JSON file receiving every event; empty disables it.
    pub log_file: String,
    /// JSON file receiving warnings and errors only, fraud alerts included;
    /// empty disables it.
    pub fraud_log_file: String,
    /// `memory` or a `sqlite:` URL.
    pub sink_url: String,
    pub retry_capacity: usize,
    pub retry_overflow: OverflowPolicy,
    pub producer_mode: ProducerMode,
}

impl Settings {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Fails when a value cannot be parsed or violates a bound.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_source(Environment::default().try_parsing(true))
    }

    fn from_source(env: Environment) -> anyhow::Result<Self> {
        let cfg = Config::builder()
            .set_default("kafka_brokers", "localhost:29092")?
            .set_default("kafka_topic_transactions", "transactions")?
            .set_default("kafka_group_id", "fraud-detection-group")?
            .set_default("partitions", 3)?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("log_format", "text")?
            .set_default("log_file", "logs/combined.log")?
            .set_default("fraud_log_file", "logs/fraud.log")?
            .set_default("sink_url", "sqlite:frauds.db")?
            .set_default("retry_capacity", 10_000)?
            .set_default("retry_overflow", "reject-new")?
            .set_default("producer_mode", "scenario")?
            .add_source(env)
            .build()
            .context("building settings")?;

        let raw: RawSettings = cfg.try_deserialize().context("deserializing settings")?;
        anyhow::ensure!(raw.partitions >= 1, "PARTITIONS must be >= 1");
        anyhow::ensure!(raw.retry_capacity >= 1, "RETRY_CAPACITY must be >= 1");
        anyhow::ensure!(!raw.kafka_topic_transactions.trim().is_empty(), "KAFKA_TOPIC_TRANSACTIONS must not be empty");
        anyhow::ensure!(!raw.kafka_group_id.trim().is_empty(), "KAFKA_GROUP_ID must not be empty");

        Ok(Self {
            brokers: raw.kafka_brokers,
            topic: raw.kafka_topic_transactions,
            group_id: raw.kafka_group_id,
            partitions: raw.partitions,
            port: raw.port,
            log_level: raw.log_level,
            log_format: raw.log_format,
            log_file: raw.log_file,
            fraud_log_file: raw.fraud_log_file,
            sink_url: raw.sink_url,
            retry_capacity: raw.retry_capacity,
            retry_overflow: raw.retry_overflow.into(),
            producer_mode: raw.producer_mode,
        })
    }
}
