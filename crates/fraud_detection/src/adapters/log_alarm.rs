// Rust guideline compliant 2026-10-18

//! `Alarm` adapter that emits one `warn` event per fraud verdict.
//!
//! Never fails; `AlarmError::DeliveryFailed` is unreachable here.

use domain::{Alarm, AlarmError, FraudVerdict};

/// `Alarm` adapter writing fraud alerts to the tracing pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlarm;

impl LogAlarm {
    /// Create a new log alarm adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Alarm for LogAlarm {
    async fn trigger(&self, verdict: &FraudVerdict) -> Result<(), AlarmError> {
        tracing::warn!(
            transaction_id = %verdict.id(),
            user_id = %verdict.transaction.user_id,
            amount = verdict.transaction.amount,
            location = %verdict.transaction.location,
            rule = %verdict.reasons_joined(),
            "fraud.detected"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::LogAlarm;
    use chrono::Utc;
    use domain::{Alarm as _, FraudVerdict, RuleName, Transaction};

    #[tokio::test]
    async fn trigger_always_succeeds() {
        let verdict = FraudVerdict {
            transaction: Transaction {
                transaction_id: "txn_f1".to_owned(),
                user_id: "user_1".to_owned(),
                amount: 6000.0,
                location: "Nigeria".to_owned(),
                timestamp: Utc::now(),
            },
            reasons: vec![RuleName::HighAmountForeign],
            detected_at: Utc::now(),
        };
        LogAlarm::new().trigger(&verdict).await.unwrap();
    }
}
