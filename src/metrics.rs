//! Operational metrics with Prometheus
//!
//! Exposes request rates/latencies, pipeline stage outcomes, degrade
//! counts, and rate-limit rejections.
//!
//! NOTE: agent_id is intentionally absent from metric labels to avoid
//! high-cardinality explosion.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ------------------------------------------------------------------
    // HTTP metrics
    // ------------------------------------------------------------------

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "smriti_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ------------------------------------------------------------------
    // Ingest pipeline metrics
    // ------------------------------------------------------------------

    /// Ingest outcomes: complete / degraded / rejected / storage_failed
    pub static ref INGEST_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_ingest_total", "Ingest pipeline outcomes"),
        &["result"]
    ).unwrap();

    pub static ref INGEST_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "smriti_ingest_duration_seconds",
            "End-to-end ingest pipeline duration"
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    ).unwrap();

    /// Enrichment stages that failed and were degraded to empty output
    pub static ref STAGE_DEGRADED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_stage_degraded_total", "Degraded enrichment stages"),
        &["stage"]
    ).unwrap();

    /// Requests rejected by the per-agent rate limiter
    pub static ref RATE_LIMITED_TOTAL: IntCounter = IntCounter::new(
        "smriti_rate_limited_total",
        "Requests rejected by the per-agent rate limiter"
    ).unwrap();

    // ------------------------------------------------------------------
    // Retrieval metrics
    // ------------------------------------------------------------------

    pub static ref SEARCH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_search_total", "Semantic search outcomes"),
        &["result"]
    ).unwrap();

    pub static ref SEARCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "smriti_search_duration_seconds",
            "Semantic search duration"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5])
    ).unwrap();

    // ------------------------------------------------------------------
    // Lesson mining metrics
    // ------------------------------------------------------------------

    pub static ref LESSONS_MINED_TOTAL: IntCounter = IntCounter::new(
        "smriti_lessons_mined_total",
        "Draft lessons created by the miner"
    ).unwrap();

    pub static ref MINING_RUNS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_mining_runs_total", "Lesson mining run outcomes"),
        &["result"]
    ).unwrap();

    // ------------------------------------------------------------------
    // Audit metrics
    // ------------------------------------------------------------------

    pub static ref AUDIT_ENTRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("smriti_audit_entries_total", "Audit entries appended"),
        &["action"]
    ).unwrap();
}

/// Register all metrics with the global registry. Call once at startup.
pub fn register_metrics() {
    let registry = &METRICS_REGISTRY;
    registry.register(Box::new(HTTP_REQUEST_DURATION.clone())).ok();
    registry.register(Box::new(HTTP_REQUESTS_TOTAL.clone())).ok();
    registry.register(Box::new(INGEST_TOTAL.clone())).ok();
    registry.register(Box::new(INGEST_DURATION.clone())).ok();
    registry.register(Box::new(STAGE_DEGRADED_TOTAL.clone())).ok();
    registry.register(Box::new(RATE_LIMITED_TOTAL.clone())).ok();
    registry.register(Box::new(SEARCH_TOTAL.clone())).ok();
    registry.register(Box::new(SEARCH_DURATION.clone())).ok();
    registry.register(Box::new(LESSONS_MINED_TOTAL.clone())).ok();
    registry.register(Box::new(MINING_RUNS_TOTAL.clone())).ok();
    registry.register(Box::new(AUDIT_ENTRIES_TOTAL.clone())).ok();
}

/// Render the registry in Prometheus text format.
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = METRICS_REGISTRY.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        tracing::error!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_gather() {
        register_metrics();
        INGEST_TOTAL.with_label_values(&["complete"]).inc();
        let text = gather_metrics();
        assert!(text.contains("smriti_ingest_total"));
    }
}
