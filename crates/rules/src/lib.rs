// Rust guideline compliant 2026-10-18

//! Rule evaluation engine for the fraud-screening pipeline.
//!
//! [`RuleEngine`] runs a fixed, ordered list of [`Rule`] implementations
//! against each transaction and turns the matches into a
//! [`FraudVerdict`](domain::FraudVerdict). The only stateful rule,
//! [`RapidTransactions`], reads and writes the shared [`VelocityStore`].

mod velocity;

pub use velocity::VelocityStore;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::{EvaluationError, FraudVerdict, RuleMatch, RuleName, Transaction};
use tokio::time::Instant;

/// Window used by the rapid-succession rule.
pub const VELOCITY_WINDOW: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Rule port
// ---------------------------------------------------------------------------

/// Shared state and clock handed to every rule for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Per-user velocity history.
    pub velocity: &'a VelocityStore,
    /// Evaluation instant; identical for every rule in one pass.
    pub now: Instant,
}

/// One fraud heuristic.
pub trait Rule: Send + Sync + fmt::Debug {
    /// Name reported in verdict reasons.
    fn name(&self) -> RuleName;

    /// Decide whether `tx` matches.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError`] on a transient failure; the caller retries.
    fn evaluate(&self, tx: &Transaction, ctx: &RuleContext<'_>) -> Result<bool, EvaluationError>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Flags `amount > threshold` outside the home country.
#[derive(Debug, Clone)]
pub struct HighAmountForeign {
    threshold: f64,
    home_country: String,
}

impl Default for HighAmountForeign {
    fn default() -> Self {
        Self { threshold: 5000.0, home_country: "USA".to_owned() }
    }
}

impl Rule for HighAmountForeign {
    fn name(&self) -> RuleName {
        RuleName::HighAmountForeign
    }

    fn evaluate(&self, tx: &Transaction, _ctx: &RuleContext<'_>) -> Result<bool, EvaluationError> {
        Ok(tx.amount > self.threshold && tx.location != self.home_country)
    }
}

/// Flags amounts that are a whole multiple of the divisor (zero included).
#[derive(Debug, Clone)]
pub struct RoundAmount {
    divisor: f64,
}

impl Default for RoundAmount {
    fn default() -> Self {
        Self { divisor: 1000.0 }
    }
}

impl Rule for RoundAmount {
    fn name(&self) -> RuleName {
        RuleName::RoundAmount
    }

    #[expect(clippy::float_cmp, reason = "exact remainder of an integer-valued divisor")]
    fn evaluate(&self, tx: &Transaction, _ctx: &RuleContext<'_>) -> Result<bool, EvaluationError> {
        Ok(tx.amount % self.divisor == 0.0)
    }
}

/// Flags a user seen again inside the velocity window.
///
/// Always records the current transaction, whatever the outcome, so it must
/// run on every evaluation.
#[derive(Debug, Clone)]
pub struct RapidTransactions {
    window: Duration,
}

impl RapidTransactions {
    /// Rule with a custom window.
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self { window }
    }
}

impl Default for RapidTransactions {
    fn default() -> Self {
        Self::with_window(VELOCITY_WINDOW)
    }
}

impl Rule for RapidTransactions {
    fn name(&self) -> RuleName {
        RuleName::RapidTransactions
    }

    fn evaluate(&self, tx: &Transaction, ctx: &RuleContext<'_>) -> Result<bool, EvaluationError> {
        let prior = ctx.velocity.observe(&tx.user_id, &tx.transaction_id, ctx.now, self.window);
        Ok(prior > 0)
    }
}

// ---------------------------------------------------------------------------
// RuleEngine
// ---------------------------------------------------------------------------

/// Runs every registered rule, in order, with no short-circuit.
///
/// Cheap to share behind an `Arc`: rules are immutable and the velocity store
/// synchronizes per user.
#[derive(Debug)]
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
    velocity: Arc<VelocityStore>,
}

impl RuleEngine {
    /// Engine with the standard rule set:
    /// `highAmountForeign`, `roundAmount`, `rapidTransactions`.
    #[must_use]
    pub fn new(velocity: Arc<VelocityStore>) -> Self {
        Self::with_rules(
            velocity,
            vec![
                Box::new(HighAmountForeign::default()),
                Box::new(RoundAmount::default()),
                Box::new(RapidTransactions::default()),
            ],
        )
    }

    /// Engine with an explicit, ordered rule list.
    #[must_use]
    pub fn with_rules(velocity: Arc<VelocityStore>, rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules, velocity }
    }

    /// Names of the registered rules, in evaluation order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<RuleName> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Evaluate `tx` against the current clock.
    ///
    /// # Errors
    ///
    /// Returns the first [`EvaluationError`] raised by any rule.
    pub fn evaluate(&self, tx: &Transaction) -> Result<Option<FraudVerdict>, EvaluationError> {
        self.evaluate_at(tx, Instant::now(), Utc::now())
    }

    /// Evaluate `tx` at an explicit instant.
    ///
    /// Every rule runs even after a failure, so the velocity side effect is
    /// never skipped. The verdict is `None` when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns the first [`EvaluationError`] raised by any rule.
    pub fn evaluate_at(
        &self,
        tx: &Transaction,
        now: Instant,
        detected_at: DateTime<Utc>,
    ) -> Result<Option<FraudVerdict>, EvaluationError> {
        let ctx = RuleContext { velocity: &self.velocity, now };
        let mut matches = Vec::with_capacity(self.rules.len());
        let mut first_error = None;

        for rule in &self.rules {
            match rule.evaluate(tx, &ctx) {
                Ok(matched) => matches.push(RuleMatch { rule: rule.name(), matched }),
                Err(e) => {
                    tracing::debug!(
                        transaction_id = %tx.transaction_id,
                        rule = %rule.name(),
                        error = %e,
                        "rules.evaluate.rule_failed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(FraudVerdict::from_matches(tx.clone(), &matches, detected_at))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
