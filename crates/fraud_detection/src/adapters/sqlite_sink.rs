// Rust guideline compliant 2026-10-18

//! SQLite adapter for the `FraudSink` port.
//!
//! One row per verdict in the `frauds` table, keyed by `transaction_id`.
//! Reasons are stored as a JSON array of wire names; timestamps as RFC 3339
//! UTC with microsecond precision so that text ordering matches time order.
//!
//! # Idempotency
//!
//! Writes use `INSERT ... ON CONFLICT(transaction_id) DO NOTHING`; the first
//! record for a transaction wins and later writes report `Duplicate`.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use domain::{FraudSink, FraudVerdict, PersistOutcome, RuleName, SinkError, Transaction};
use sqlx::Row as _;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};

const SELECT_COLUMNS: &str =
    "SELECT transaction_id, user_id, amount, location, timestamp, reasons, detected_at FROM frauds";

/// `FraudSink` adapter backed by a SQLite database via `sqlx`.
#[derive(Debug, Clone)]
pub struct SqliteSink {
    pool: sqlx::SqlitePool,
}

impl SqliteSink {
    /// Open or create a SQLite database and initialize the schema.
    ///
    /// In-memory URLs get a single long-lived connection, since every new
    /// connection to `:memory:` would see an empty database.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` when the connection or schema creation fails.
    pub async fn connect(db_url: &str) -> Result<Self, sqlx::Error> {
        let opts = db_url.parse::<SqliteConnectOptions>()?.create_if_missing(true);
        let pool = if db_url.contains(":memory:") || db_url.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(opts)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(5))
                .connect_with(opts)
                .await?
        };
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS frauds (
                transaction_id TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL,
                amount         REAL NOT NULL,
                location       TEXT NOT NULL,
                timestamp      TEXT NOT NULL,
                reasons        TEXT NOT NULL,  -- JSON array of rule names
                detected_at    TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS frauds_user_id ON frauds (user_id)")
            .execute(&pool)
            .await?;
        tracing::info!(url = db_url, "sqlite_sink.ready");
        Ok(Self { pool })
    }

    async fn fetch(&self, user_id: Option<&str>) -> Result<Vec<FraudVerdict>, SinkError> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(&format!(
                    "{SELECT_COLUMNS} WHERE user_id = ? ORDER BY detected_at DESC"
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY detected_at DESC"))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| unavailable("fetch", &e))?;

        rows.iter().map(row_to_verdict).collect()
    }
}

fn unavailable(op: &str, e: &sqlx::Error) -> SinkError {
    tracing::error!(op, error = %e, "sqlite_sink.query.failed");
    SinkError::Unavailable { reason: e.to_string() }
}

fn to_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_verdict(row: &SqliteRow) -> Result<FraudVerdict, SinkError> {
    let transaction_id: String =
        row.try_get("transaction_id").map_err(|e| SinkError::Unavailable { reason: e.to_string() })?;
    let corrupt = |reason: String| SinkError::Corrupt { transaction_id: transaction_id.clone(), reason };
    let column = |e: sqlx::Error| corrupt(e.to_string());
    let time = |text: String| {
        DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("bad timestamp {text:?}: {e}")))
    };

    let reasons: String = row.try_get("reasons").map_err(column)?;
    let reasons: Vec<RuleName> =
        serde_json::from_str(&reasons).map_err(|e| corrupt(format!("bad reasons: {e}")))?;

    Ok(FraudVerdict {
        transaction: Transaction {
            transaction_id: transaction_id.clone(),
            user_id: row.try_get("user_id").map_err(column)?,
            amount: row.try_get("amount").map_err(column)?,
            location: row.try_get("location").map_err(column)?,
            timestamp: time(row.try_get("timestamp").map_err(column)?)?,
        },
        reasons,
        detected_at: time(row.try_get("detected_at").map_err(column)?)?,
    })
}

impl FraudSink for SqliteSink {
    async fn persist(&self, verdict: &FraudVerdict) -> Result<PersistOutcome, SinkError> {
        let tx = &verdict.transaction;
        let reasons = serde_json::to_string(&verdict.reasons)
            .map_err(|e| SinkError::Unavailable { reason: e.to_string() })?;
        let result = sqlx::query(
            "INSERT INTO frauds
             (transaction_id, user_id, amount, location, timestamp, reasons, detected_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(transaction_id) DO NOTHING",
        )
        .bind(&tx.transaction_id)
        .bind(&tx.user_id)
        .bind(tx.amount)
        .bind(&tx.location)
        .bind(to_text(tx.timestamp))
        .bind(reasons)
        .bind(to_text(verdict.detected_at))
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("persist", &e))?;

        if result.rows_affected() == 0 {
            Ok(PersistOutcome::Duplicate)
        } else {
            Ok(PersistOutcome::Inserted)
        }
    }

    async fn list_all(&self) -> Result<Vec<FraudVerdict>, SinkError> {
        self.fetch(None).await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<FraudVerdict>, SinkError> {
        self.fetch(Some(user_id)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
