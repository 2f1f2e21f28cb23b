// Rust guideline compliant 2026-10-18

//! Shared domain types for the fraud-screening pipeline.
//!
//! Defines `Transaction`, `FraudVerdict`, `RawMessage`, the per-port error
//! enums, and the hexagonal port traits: `Publisher`, `MessageSource`,
//! `FraudSink`, and `Alarm`. All pipeline components depend on this crate.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A single financial event to be screened.
///
/// Wire and storage field names are camelCase (`transactionId`, `userId`).
/// The `timestamp` is asserted by the origin and is never used for ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Identity key; unique across the stream.
    pub transaction_id: String,
    /// Account holder the transaction belongs to.
    pub user_id: String,
    /// Non-negative, finite amount.
    pub amount: f64,
    /// Free-form location, e.g. `"USA"`.
    pub location: String,
    /// Origin timestamp.
    ///
    /// Decoding accepts RFC 3339, a zone-less date-time (read as UTC), or a
    /// bare `YYYY-MM-DD` date (midnight UTC). Encoding is always RFC 3339.
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an origin timestamp in any of the forms producers emit.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    if let Some(naive) =
        NAIVE_FORMATS.iter().find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
    {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_timestamp(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp `{text}`")))
}

impl Transaction {
    /// Decode a UTF-8 JSON payload into a validated transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Json`] when the payload is not a transaction
    /// document, or [`DecodeError::Invalid`] when a field violates the data
    /// model (empty id, negative or non-finite amount).
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let tx: Self = serde_json::from_slice(payload)?;
        tx.validate()?;
        Ok(tx)
    }

    fn validate(&self) -> Result<(), DecodeError> {
        if self.transaction_id.trim().is_empty() {
            return Err(DecodeError::Invalid { reason: "transactionId is empty".to_owned() });
        }
        if self.user_id.trim().is_empty() {
            return Err(DecodeError::Invalid { reason: "userId is empty".to_owned() });
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(DecodeError::Invalid {
                reason: format!("amount must be a non-negative number, got {}", self.amount),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rules and verdicts
// ---------------------------------------------------------------------------

/// Closed set of fraud rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleName {
    /// Large amount outside the home country.
    HighAmountForeign,
    /// Amount is a whole multiple of 1000.
    RoundAmount,
    /// Same user seen again inside the velocity window.
    RapidTransactions,
}

impl RuleName {
    /// Wire name of the rule (`"highAmountForeign"`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighAmountForeign => "highAmountForeign",
            Self::RoundAmount => "roundAmount",
            Self::RapidTransactions => "rapidTransactions",
        }
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one rule for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    /// Rule that produced this outcome.
    pub rule: RuleName,
    /// `true` if the rule flagged the transaction.
    pub matched: bool,
}

/// A transaction flagged by at least one rule.
///
/// Serialized flat: the transaction fields plus `reasons` and `detectedAt`.
/// This is also the persisted record layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudVerdict {
    /// The screened transaction (composition).
    #[serde(flatten)]
    pub transaction: Transaction,
    /// Matched rules, in evaluation order. Never empty.
    pub reasons: Vec<RuleName>,
    /// When the verdict was produced.
    pub detected_at: DateTime<Utc>,
}

impl FraudVerdict {
    /// Build a verdict from per-rule outcomes.
    ///
    /// Returns `None` when no rule matched.
    #[must_use]
    pub fn from_matches(
        transaction: Transaction,
        matches: &[RuleMatch],
        detected_at: DateTime<Utc>,
    ) -> Option<Self> {
        let reasons: Vec<RuleName> =
            matches.iter().filter(|m| m.matched).map(|m| m.rule).collect();
        (!reasons.is_empty()).then_some(Self { transaction, reasons, detected_at })
    }

    /// Return the transaction ID, delegating to the wrapped transaction.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.transaction.transaction_id
    }

    /// Comma-joined reasons, as written to the fraud log.
    #[must_use]
    pub fn reasons_joined(&self) -> String {
        self.reasons.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
    }
}

/// Result of a sink write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// A new record was stored.
    Inserted,
    /// A record with the same `transactionId` already existed; nothing written.
    Duplicate,
}

// ---------------------------------------------------------------------------
// Raw messages
// ---------------------------------------------------------------------------

/// One message as delivered by the event source, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: u32,
    /// Position within the partition; strictly increasing.
    pub offset: u64,
    /// Partition key, if the producer set one.
    pub key: Option<String>,
    /// Undecoded body.
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A payload that can never become a transaction. Permanent; never retried.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not valid JSON, or a field is missing or of the wrong type.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    /// Well-formed JSON that violates the data model.
    #[error("invalid transaction: {reason}")]
    Invalid {
        /// Human-readable description.
        reason: String,
    },
}

/// A transient failure while evaluating rules. Eligible for retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// A rule could not reach a decision.
    #[error("rule {rule} failed: {reason}")]
    RuleFailed {
        /// Rule that failed.
        rule: RuleName,
        /// Human-readable description.
        reason: String,
    },
    /// Shared rule state could not be accessed.
    #[error("rule state unavailable: {reason}")]
    StateUnavailable {
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the `FraudSink` port.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The backing store rejected or failed the operation.
    #[error("sink unavailable: {reason}")]
    Unavailable {
        /// Human-readable description.
        reason: String,
    },
    /// A stored row could not be mapped back to a verdict.
    #[error("corrupt record {transaction_id}: {reason}")]
    Corrupt {
        /// Key of the offending row.
        transaction_id: String,
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the `Alarm` port.
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    /// Alarm could not be delivered.
    #[error("delivery failed: {reason}")]
    DeliveryFailed {
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the event source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The requested topic does not exist on the bus.
    #[error("unknown topic: {topic}")]
    UnknownTopic {
        /// Requested topic name.
        topic: String,
    },
    /// The subscription request was rejected.
    #[error("subscription rejected: {reason}")]
    Rejected {
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the event publisher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The target topic does not exist on the bus.
    #[error("unknown topic: {topic}")]
    UnknownTopic {
        /// Requested topic name.
        topic: String,
    },
    /// The bus no longer accepts messages.
    #[error("publisher closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Hexagonal port: an ordered, at-least-once feed for one partition.
///
/// The ingestion loop owns its source exclusively, hence `&mut self`.
/// Futures are `Send` so each partition can run on its own task.
pub trait MessageSource: Send {
    /// Wait for the next message. `None` means the stream has ended.
    fn recv(&mut self) -> impl Future<Output = Option<RawMessage>> + Send;

    /// Mark every message up to and including `offset` as consumed.
    fn commit(&mut self, offset: u64);
}

/// Hexagonal port: durable storage for fraud verdicts.
///
/// Writes are idempotent on `transactionId`.
pub trait FraudSink: Send + Sync {
    /// Store `verdict` unless a record with the same id exists.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] when the store cannot be written.
    fn persist(
        &self,
        verdict: &FraudVerdict,
    ) -> impl Future<Output = Result<PersistOutcome, SinkError>> + Send;

    /// All records, newest `detectedAt` first.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the store cannot be read.
    fn list_all(&self) -> impl Future<Output = Result<Vec<FraudVerdict>, SinkError>> + Send;

    /// Records for one user, newest `detectedAt` first. Empty is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the store cannot be read.
    fn list_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<FraudVerdict>, SinkError>> + Send;
}

/// Hexagonal port: appends messages to a topic.
///
/// Messages sharing a `key` land on the same partition, in publish order.
pub trait Publisher: Send + Sync {
    /// Append `payload` to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the topic is unknown or the bus is closed.
    fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Hexagonal port: per-verdict fraud alert delivery (best-effort).
pub trait Alarm: Send + Sync {
    /// Trigger a fraud alert for `verdict`.
    ///
    /// # Errors
    ///
    /// Returns [`AlarmError::DeliveryFailed`] when the alert cannot be delivered.
    fn trigger(&self, verdict: &FraudVerdict) -> impl Future<Output = Result<(), AlarmError>> + Send;
}
