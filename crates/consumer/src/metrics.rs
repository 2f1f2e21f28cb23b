// Rust guideline compliant 2026-10-18

//! Prometheus instruments for the screening pipeline.
//!
//! Owns its `Registry`; nothing is registered globally. On Linux the
//! registry also carries the standard `process_*` families (CPU, memory,
//! open descriptors, start time).

use domain::RuleName;
use prometheus::{
    Encoder as _, Histogram, HistogramOpts, HistogramTimer, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Counters and histogram exported at `/metrics`.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    processed: IntCounterVec,
    fraudulent: IntCounterVec,
    processing_time: Histogram,
}

impl PipelineMetrics {
    /// Create and register all instruments in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns `prometheus::Error` if an instrument cannot be built or registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let processed = IntCounterVec::new(
            Opts::new("transactions_processed_total", "Total number of transactions processed"),
            &["status"],
        )?;
        let fraudulent = IntCounterVec::new(
            Opts::new(
                "fraudulent_transactions_total",
                "Total number of fraudulent transactions detected",
            ),
            &["rule"],
        )?;
        let processing_time = Histogram::with_opts(
            HistogramOpts::new("processing_time_seconds", "Time taken to process a transaction")
                .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0]),
        )?;

        registry.register(Box::new(processed.clone()))?;
        registry.register(Box::new(fraudulent.clone()))?;
        registry.register(Box::new(processing_time.clone()))?;
        #[cfg(target_os = "linux")]
        registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;

        Ok(Self { registry, processed, fraudulent, processing_time })
    }

    /// Count one evaluation attempt.
    pub fn received(&self) {
        self.processed.with_label_values(&["received"]).inc();
    }

    /// Count a transaction no rule matched.
    pub fn clean(&self) {
        self.processed.with_label_values(&["clean"]).inc();
    }

    /// Count a fraud verdict and each rule behind it.
    pub fn fraud(&self, reasons: &[RuleName]) {
        self.processed.with_label_values(&["fraud"]).inc();
        for rule in reasons {
            self.fraudulent.with_label_values(&[rule.as_str()]).inc();
        }
    }

    /// Start timing one evaluation; observed when the timer drops.
    #[must_use]
    pub fn start_timer(&self) -> HistogramTimer {
        self.processing_time.start_timer()
    }

    /// Current value of `transactions_processed_total{status}`.
    #[must_use]
    pub fn processed_count(&self, status: &str) -> u64 {
        self.processed.with_label_values(&[status]).get()
    }

    /// Current value of `fraudulent_transactions_total{rule}`.
    #[must_use]
    pub fn fraud_count(&self, rule: RuleName) -> u64 {
        self.fraudulent.with_label_values(&[rule.as_str()]).get()
    }

    /// Render the registry in Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns `prometheus::Error` if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
