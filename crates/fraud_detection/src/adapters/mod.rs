// Rust guideline compliant 2026-10-18

//! Adapters (secondary ports) for the fraud-detection binary.
//!
//! Each sub-module implements one or more hexagonal port traits defined in the
//! `domain` crate.

pub mod in_memory_bus;
pub mod in_memory_sink;
pub mod log_alarm;
pub mod sqlite_sink;

use domain::{FraudSink, FraudVerdict, PersistOutcome, SinkError};

use in_memory_sink::InMemorySink;
use sqlite_sink::SqliteSink;

/// Sink selected at startup from `SINK_URL`.
#[derive(Debug, Clone)]
pub enum AnySink {
    /// Durable SQLite store.
    Sqlite(SqliteSink),
    /// Process-local store.
    Memory(InMemorySink),
}

impl AnySink {
    /// Open the sink named by `url`: `memory` or any `sqlite:` URL.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` when the SQLite database cannot be opened.
    pub async fn open(url: &str) -> Result<Self, sqlx::Error> {
        if url.eq_ignore_ascii_case("memory") {
            tracing::info!("sink.memory.selected");
            return Ok(Self::Memory(InMemorySink::new()));
        }
        Ok(Self::Sqlite(SqliteSink::connect(url).await?))
    }
}

impl FraudSink for AnySink {
    async fn persist(&self, verdict: &FraudVerdict) -> Result<PersistOutcome, SinkError> {
        match self {
            Self::Sqlite(s) => s.persist(verdict).await,
            Self::Memory(s) => s.persist(verdict).await,
        }
    }

    async fn list_all(&self) -> Result<Vec<FraudVerdict>, SinkError> {
        match self {
            Self::Sqlite(s) => s.list_all().await,
            Self::Memory(s) => s.list_all().await,
        }
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<FraudVerdict>, SinkError> {
        match self {
            Self::Sqlite(s) => s.list_by_user(user_id).await,
            Self::Memory(s) => s.list_by_user(user_id).await,
        }
    }
}
