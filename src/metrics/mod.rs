//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_vec_with_registry, register_histogram_vec_with_registry,
    register_histogram_with_registry, Counter, CounterVec, GaugeVec, Histogram, HistogramVec, Opts,
    Registry,
};
use std::sync::Arc;
use tracing::error;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Budget metrics
    pub budget_calculations: CounterVec,
    pub predicted_quality_impact: Histogram,
    pub budget_context_tokens: HistogramVec,

    // Assembly metrics
    pub assembled_context_tokens: Histogram,
    pub budget_overruns: Counter,
    pub chunks_dropped: Counter,

    // Retrieval metrics
    pub retrieval_requests: CounterVec,
    pub retrieval_duration: Histogram,
    pub degraded_events: CounterVec,

    // Cache metrics
    pub cache_hits: Counter,
    pub cache_misses: Counter,

    // Quality monitoring
    pub quality_recordings: CounterVec,
    pub avg_quality: GaugeVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let budget_calculations = register_counter_vec_with_registry!(
            Opts::new("budget_calculations_total", "Budget calculations by strategy and recommendation"),
            &["strategy", "recommendation"],
            registry
        )?;

        let predicted_quality_impact = register_histogram_with_registry!(
            "budget_predicted_quality_impact",
            "Predicted quality impact per calculation",
            vec![0.005, 0.01, 0.02, 0.03, 0.05, 0.08, 0.12, 0.25, 0.5, 1.0],
            registry
        )?;

        let budget_context_tokens = register_histogram_vec_with_registry!(
            "budget_context_tokens",
            "Context tokens allocated per calculation",
            &["strategy"],
            vec![512.0, 1024.0, 2048.0, 2600.0, 3200.0, 3700.0, 4000.0, 6000.0, 8000.0],
            registry
        )?;

        let assembled_context_tokens = register_histogram_with_registry!(
            "assembled_context_tokens",
            "Tokens in assembled contexts",
            vec![128.0, 512.0, 1024.0, 2048.0, 3000.0, 4000.0, 6000.0, 8000.0],
            registry
        )?;

        let budget_overruns = register_counter_with_registry!(
            Opts::new("budget_overruns_total", "Selections that exceeded the context budget"),
            registry
        )?;

        let chunks_dropped = register_counter_with_registry!(
            Opts::new("assembler_chunks_dropped_total", "Chunks dropped to fit the budget"),
            registry
        )?;

        let retrieval_requests = register_counter_vec_with_registry!(
            Opts::new("retrieval_requests_total", "Retrieval requests by outcome"),
            &["outcome"],
            registry
        )?;

        let retrieval_duration = register_histogram_with_registry!(
            "retrieval_duration_seconds",
            "Retrieval latency in seconds",
            registry
        )?;

        let degraded_events = register_counter_vec_with_registry!(
            Opts::new("retrieval_degraded_total", "Degraded-mode events by reason"),
            &["reason"],
            registry
        )?;

        let cache_hits = register_counter_with_registry!(
            Opts::new("context_cache_hits_total", "Context cache hits"),
            registry
        )?;

        let cache_misses = register_counter_with_registry!(
            Opts::new("context_cache_misses_total", "Context cache misses"),
            registry
        )?;

        let quality_recordings = register_counter_vec_with_registry!(
            Opts::new("quality_recordings_total", "Quality scores recorded by source"),
            &["source"],
            registry
        )?;

        let avg_quality = register_gauge_vec_with_registry!(
            Opts::new("quality_average", "Running average quality score by source"),
            &["source"],
            registry
        )?;

        Ok(Self {
            registry,
            budget_calculations,
            predicted_quality_impact,
            budget_context_tokens,
            assembled_context_tokens,
            budget_overruns,
            chunks_dropped,
            retrieval_requests,
            retrieval_duration,
            degraded_events,
            cache_hits,
            cache_misses,
            quality_recordings,
            avg_quality,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a completed budget calculation
    pub fn record_budget(&self, strategy: &str, recommendation: &str, context_tokens: usize, impact: f64) {
        self.budget_calculations
            .with_label_values(&[strategy, recommendation])
            .inc();
        self.budget_context_tokens
            .with_label_values(&[strategy])
            .observe(context_tokens as f64);
        self.predicted_quality_impact.observe(impact);
    }

    /// Record an assembled context
    pub fn record_assembly(&self, token_count: usize, dropped_chunks: usize, overrun: bool) {
        self.assembled_context_tokens.observe(token_count as f64);
        self.chunks_dropped.inc_by(dropped_chunks as f64);
        if overrun {
            self.budget_overruns.inc();
        }
    }

    /// Record a retrieval attempt
    pub fn record_retrieval(&self, outcome: &str, seconds: f64) {
        self.retrieval_requests.with_label_values(&[outcome]).inc();
        self.retrieval_duration.observe(seconds);
    }

    pub fn record_degraded(&self, reason: &str) {
        self.degraded_events.with_label_values(&[reason]).inc();
    }

    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.inc();
        } else {
            self.cache_misses.inc();
        }
    }

    /// `source` is `predicted` or `measured`
    pub fn record_quality_score(&self, source: &str, running_average: f64) {
        self.quality_recordings.with_label_values(&[source]).inc();
        self.avg_quality.with_label_values(&[source]).set(running_average);
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
        }

        String::from_utf8(buffer).unwrap_or_default()
    }
}
