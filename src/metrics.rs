//! Prometheus metrics for the analysis pipeline
//!
//! Tracks:
//! - Analyses by outcome (parsed, repaired, fallback, error)
//! - Provider attempts by result
//! - End-to-end analysis latency
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// How an analysis request finished
///
/// Enum labels keep cardinality fixed at four series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Strict JSON parse succeeded on the first try
    Parsed,
    /// Normalizer had to extract the JSON object from surrounding text
    Repaired,
    /// Retries exhausted, "analysis unavailable" result returned
    Fallback,
    /// Request failed with an error status
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Parsed => "parsed",
            Outcome::Repaired => "repaired",
            Outcome::Fallback => "fallback",
            Outcome::Error => "error",
        }
    }
}

/// Result of a single provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    /// Reply normalized successfully
    Success,
    /// Reply arrived but could not be normalized
    Unparseable,
    /// Connection, timeout, 5xx or unexpected failure (retried)
    Transient,
    /// Credential, rate limit or invalid request (not retried)
    Fatal,
}

impl AttemptResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptResult::Success => "success",
            AttemptResult::Unparseable => "unparseable",
            AttemptResult::Transient => "transient",
            AttemptResult::Fatal => "fatal",
        }
    }
}

/// Metrics collector
///
/// Cloning shares the underlying registry.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    analyses_total: IntCounterVec,
    llm_attempts_total: IntCounterVec,
    analysis_duration: HistogramVec,
    metrics_recording_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance with its own registry
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let analyses_total = IntCounterVec::new(
            Opts::new(
                "myaei_analyses_total",
                "Total number of analysis requests by outcome",
            ),
            &["outcome"],
        )?;

        let llm_attempts_total = IntCounterVec::new(
            Opts::new(
                "myaei_llm_attempts_total",
                "Total number of LLM provider calls by result",
            ),
            &["result"],
        )?;

        // Provider latency dominates; buckets span a fast reply to a full retry budget
        let analysis_duration = HistogramVec::new(
            HistogramOpts::new(
                "myaei_analysis_duration_ms",
                "End-to-end analysis latency in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["outcome"],
        )?;

        let metrics_recording_failures = IntCounterVec::new(
            Opts::new(
                "myaei_metrics_recording_failures_total",
                "Total number of metrics recording failures by operation. \
                Indicates Prometheus internal errors.",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(analyses_total.clone()))?;
        registry.register(Box::new(llm_attempts_total.clone()))?;
        registry.register(Box::new(analysis_duration.clone()))?;
        registry.register(Box::new(metrics_recording_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            analyses_total,
            llm_attempts_total,
            analysis_duration,
            metrics_recording_failures,
        })
    }

    /// Record a finished analysis
    pub fn record_analysis(&self, outcome: Outcome) -> Result<(), prometheus::Error> {
        self.analyses_total
            .get_metric_with_label_values(&[outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record one provider call
    pub fn record_attempt(&self, result: AttemptResult) -> Result<(), prometheus::Error> {
        self.llm_attempts_total
            .get_metric_with_label_values(&[result.as_str()])?
            .inc();
        Ok(())
    }

    /// Record analysis latency
    ///
    /// # Errors
    ///
    /// Rejects NaN, infinite and negative durations; they would corrupt the
    /// histogram's percentiles.
    pub fn record_duration(
        &self,
        outcome: Outcome,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite, got: {}",
                duration_ms
            )));
        }
        if duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be non-negative, got: {}",
                duration_ms
            )));
        }

        self.analysis_duration
            .get_metric_with_label_values(&[outcome.as_str()])?
            .observe(duration_ms);
        Ok(())
    }

    /// Record a failed `record_*` call
    ///
    /// `operation` is the name of the method that failed.
    pub fn metrics_recording_failure(&self, operation: &str) {
        self.metrics_recording_failures
            .with_label_values(&[operation])
            .inc();
    }

    /// Record an attempt, logging instead of failing the request
    pub fn observe_attempt(&self, result: AttemptResult) {
        if let Err(e) = self.record_attempt(result) {
            self.metrics_recording_failure("record_attempt");
            tracing::error!(
                error = %e,
                result = result.as_str(),
                "Metrics recording failed. Observability degraded but request continues."
            );
        }
    }

    /// Record outcome and latency, logging instead of failing the request
    pub fn observe_analysis(&self, outcome: Outcome, duration_ms: f64) {
        if let Err(e) = self.record_analysis(outcome) {
            self.metrics_recording_failure("record_analysis");
            tracing::error!(
                error = %e,
                outcome = outcome.as_str(),
                "Metrics recording failed. Observability degraded but request continues."
            );
        }
        if let Err(e) = self.record_duration(outcome, duration_ms) {
            self.metrics_recording_failure("record_duration");
            tracing::error!(
                error = %e,
                outcome = outcome.as_str(),
                duration_ms,
                "Metrics recording failed. Observability degraded but request continues."
            );
        }
    }

    /// Sum of a counter family across all labels
    fn counter_total(&self, name: &str) -> u64 {
        self.registry
            .gather()
            .iter()
            .find(|mf| mf.name() == name)
            .map(|mf| {
                mf.get_metric()
                    .iter()
                    .map(|m| m.counter.value.unwrap_or(0.0) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Total analyses recorded since startup
    pub fn analyses_count(&self) -> u64 {
        self.counter_total("myaei_analyses_total")
    }

    /// Total metrics recording failures since startup
    pub fn metrics_recording_failures_count(&self) -> u64 {
        self.counter_total("myaei_metrics_recording_failures_total")
    }

    /// Gather all metrics and encode them in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                "Prometheus text encoder failed"
            );
            prometheus::Error::Msg(format!(
                "Failed to encode {} metric families: {}",
                metric_count, e
            ))
        })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            tracing::error!(
                invalid_byte_index = valid_up_to,
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                valid_up_to, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new_creates_registry() {
        let metrics = Metrics::new().expect("Failed to create metrics");

        metrics
            .record_analysis(Outcome::Parsed)
            .expect("Test operation should succeed");
        metrics
            .record_attempt(AttemptResult::Success)
            .expect("Test operation should succeed");
        metrics
            .record_duration(Outcome::Parsed, 12.0)
            .expect("Test operation should succeed");
        metrics.metrics_recording_failure("record_analysis");

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains(&"myaei_analyses_total".to_string()));
        assert!(names.contains(&"myaei_llm_attempts_total".to_string()));
        assert!(names.contains(&"myaei_analysis_duration_ms".to_string()));
        assert!(names.contains(&"myaei_metrics_recording_failures_total".to_string()));
    }

    #[test]
    fn test_gather_produces_prometheus_text_format() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        metrics
            .record_analysis(Outcome::Fallback)
            .expect("Test operation should succeed");

        let output = metrics.gather().expect("Failed to gather test metrics");
        assert!(output.contains("# HELP myaei_analyses_total"));
        assert!(output.contains("# TYPE myaei_analyses_total counter"));
        assert!(output.contains("outcome=\"fallback\""));
    }

    #[test]
    fn test_metrics_is_clonable() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        let cloned = metrics.clone();

        metrics.observe_attempt(AttemptResult::Transient);

        let output = cloned.gather().expect("Failed to gather test metrics");
        assert!(output.contains("result=\"transient\""));
    }

    #[test]
    fn test_record_duration_rejects_invalid_values() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        assert!(metrics.record_duration(Outcome::Parsed, f64::NAN).is_err());
        assert!(
            metrics
                .record_duration(Outcome::Parsed, f64::INFINITY)
                .is_err()
        );
        assert!(metrics.record_duration(Outcome::Parsed, -1.0).is_err());
        assert!(metrics.record_duration(Outcome::Parsed, 0.0).is_ok());
    }

    #[test]
    fn test_observe_analysis_counts_recording_failures() {
        let metrics = Metrics::new().expect("Failed to create test metrics");

        // Counter recorded, histogram rejected
        metrics.observe_analysis(Outcome::Repaired, f64::NAN);

        assert_eq!(metrics.analyses_count(), 1);
        assert_eq!(metrics.metrics_recording_failures_count(), 1);
    }

    #[test]
    fn test_label_enums_as_str() {
        assert_eq!(Outcome::Parsed.as_str(), "parsed");
        assert_eq!(Outcome::Repaired.as_str(), "repaired");
        assert_eq!(Outcome::Fallback.as_str(), "fallback");
        assert_eq!(Outcome::Error.as_str(), "error");
        assert_eq!(AttemptResult::Unparseable.as_str(), "unparseable");
        assert_eq!(AttemptResult::Fatal.as_str(), "fatal");
    }
}
