// Rust guideline compliant 2026-10-18

//! In-memory adapter for the `FraudSink` port.
//!
//! Non-durable; used with `SINK_URL=memory` and in tests.

use std::collections::HashMap;
use std::sync::Arc;

use domain::{FraudSink, FraudVerdict, PersistOutcome, SinkError};
use parking_lot::RwLock;

/// `FraudSink` adapter holding verdicts in a shared map keyed by transaction id.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    rows: Arc<RwLock<HashMap<String, FraudVerdict>>>,
}

impl InMemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(mut rows: Vec<FraudVerdict>) -> Vec<FraudVerdict> {
        rows.sort_by(|a, b| b.detected_at.cmp(&a.detected_at).then_with(|| a.id().cmp(b.id())));
        rows
    }
}

impl FraudSink for InMemorySink {
    async fn persist(&self, verdict: &FraudVerdict) -> Result<PersistOutcome, SinkError> {
        let mut rows = self.rows.write();
        if rows.contains_key(verdict.id()) {
            return Ok(PersistOutcome::Duplicate);
        }
        rows.insert(verdict.id().to_owned(), verdict.clone());
        Ok(PersistOutcome::Inserted)
    }

    async fn list_all(&self) -> Result<Vec<FraudVerdict>, SinkError> {
        Ok(Self::sorted(self.rows.read().values().cloned().collect()))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<FraudVerdict>, SinkError> {
        let rows = self
            .rows
            .read()
            .values()
            .filter(|v| v.transaction.user_id == user_id)
            .cloned()
            .collect();
        Ok(Self::sorted(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::InMemorySink;
    use chrono::{Duration, Utc};
    use domain::{FraudSink as _, FraudVerdict, PersistOutcome, RuleName, Transaction};

    fn verdict(id: &str, user: &str, offset_ms: i64) -> FraudVerdict {
        let now = Utc::now();
        FraudVerdict {
            transaction: Transaction {
                transaction_id: id.to_owned(),
                user_id: user.to_owned(),
                amount: 1000.0,
                location: "USA".to_owned(),
                timestamp: now,
            },
            reasons: vec![RuleName::RoundAmount],
            detected_at: now + Duration::milliseconds(offset_ms),
        }
    }

    #[tokio::test]
    async fn duplicate_is_suppressed() {
        let sink = InMemorySink::new();
        let v = verdict("t1", "u1", 0);
        assert_eq!(sink.persist(&v).await.unwrap(), PersistOutcome::Inserted);
        assert_eq!(sink.persist(&v).await.unwrap(), PersistOutcome::Duplicate);
        assert_eq!(sink.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listings_are_newest_first_and_filtered() {
        let sink = InMemorySink::new();
        sink.persist(&verdict("old", "u1", 0)).await.unwrap();
        sink.persist(&verdict("new", "u1", 50)).await.unwrap();
        sink.persist(&verdict("other", "u2", 100)).await.unwrap();

        let ids = |vs: Vec<FraudVerdict>| {
            vs.into_iter().map(|v| v.transaction.transaction_id).collect::<Vec<_>>()
        };
        assert_eq!(ids(sink.list_all().await.unwrap()), vec!["other", "new", "old"]);
        assert_eq!(ids(sink.list_by_user("u1").await.unwrap()), vec!["new", "old"]);
        assert!(sink.list_by_user("u3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let a = InMemorySink::new();
        let b = a.clone();
        a.persist(&verdict("t", "u", 0)).await.unwrap();
        assert_eq!(b.list_all().await.unwrap().len(), 1);
    }
}
