// Rust guideline compliant 2026-10-18

//! Screening pipeline: evaluate -> alarm -> persist, with metrics.
//!
//! Shared by the ingestion loops and the retry loop. Only evaluation errors
//! surface to the caller; alarm and sink failures are logged and absorbed.

use std::sync::Arc;

use domain::{Alarm, EvaluationError, FraudSink, PersistOutcome, RuleName, Transaction};
use rules::RuleEngine;

use crate::metrics::PipelineMetrics;

/// What happened to one successfully evaluated transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No rule matched.
    Clean,
    /// At least one rule matched.
    Fraud {
        /// Matched rules, in evaluation order.
        reasons: Vec<RuleName>,
        /// Sink result; `None` when the write failed and the verdict was lost.
        persisted: Option<PersistOutcome>,
    },
}

/// Rule engine wired to its sink, alarm, and metrics.
///
/// Generic over the `FraudSink` and `Alarm` ports for static dispatch.
#[derive(Debug)]
pub struct Pipeline<S, A> {
    engine: RuleEngine,
    sink: S,
    alarm: A,
    metrics: Arc<PipelineMetrics>,
}

impl<S: FraudSink, A: Alarm> Pipeline<S, A> {
    /// Assemble a pipeline from its collaborators.
    #[must_use]
    pub fn new(engine: RuleEngine, sink: S, alarm: A, metrics: Arc<PipelineMetrics>) -> Self {
        Self { engine, sink, alarm, metrics }
    }

    /// The sink verdicts are written to.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Pipeline instruments.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Screen one transaction.
    ///
    /// On a verdict, triggers the alarm and persists. A failed persist is
    /// logged and the verdict is lost; it is not retried.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError`] when a rule fails; the caller decides
    /// whether to retry.
    pub async fn process(&self, tx: &Transaction) -> Result<Outcome, EvaluationError> {
        let _timer = self.metrics.start_timer();
        self.metrics.received();

        let verdict = self.engine.evaluate(tx).inspect_err(|e| {
            tracing::error!(
                transaction_id = %tx.transaction_id,
                error = %e,
                "pipeline.evaluate.failed"
            );
        })?;

        let Some(verdict) = verdict else {
            self.metrics.clean();
            tracing::debug!(transaction_id = %tx.transaction_id, "pipeline.transaction.clean");
            return Ok(Outcome::Clean);
        };

        self.metrics.fraud(&verdict.reasons);

        if let Err(e) = self.alarm.trigger(&verdict).await {
            tracing::warn!(transaction_id = %verdict.id(), error = %e, "pipeline.alarm.failed");
        }

        let persisted = match self.sink.persist(&verdict).await {
            Ok(PersistOutcome::Inserted) => Some(PersistOutcome::Inserted),
            Ok(PersistOutcome::Duplicate) => {
                tracing::info!(transaction_id = %verdict.id(), "pipeline.persist.duplicate");
                Some(PersistOutcome::Duplicate)
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %verdict.id(),
                    error = %e,
                    "pipeline.persist.failed"
                );
                None
            }
        };

        Ok(Outcome::Fraud { reasons: verdict.reasons, persisted })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
