//! Metrics and telemetry for the dimension engine
//!
//! Prometheus metrics for row writes, reference auto-creation, swallowed
//! uniqueness conflicts and query latency.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};

lazy_static! {
    // === Write Counters ===

    /// Row write operations
    pub static ref ROW_WRITES_TOTAL: CounterVec = register_counter_vec!(
        "minz_row_writes_total",
        "Row write operations",
        &["operation", "status"]
    ).unwrap();

    /// Stub rows created to satisfy a classifier reference
    pub static ref STUB_ROWS_CREATED: CounterVec = register_counter_vec!(
        "minz_stub_rows_created_total",
        "Stub rows auto-created for unresolved classifier references",
        &["dimension"]
    ).unwrap();

    /// Uniqueness conflicts treated as a no-op on idempotent paths
    pub static ref CONFLICTS_SWALLOWED: CounterVec = register_counter_vec!(
        "minz_conflicts_swallowed_total",
        "Duplicate-key conflicts absorbed by idempotent writes",
        &["operation"]
    ).unwrap();

    /// Errors by kind and operation
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "minz_errors_total",
        "Errors by type",
        &["error_type", "operation"]
    ).unwrap();

    // === Latency Histograms ===

    /// Query latency
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "minz_query_duration_seconds",
        "Row query latency in seconds",
        &["operation"],
        vec![0.0005, 0.001, 0.01, 0.1, 0.5, 1.0]
    ).unwrap();

    // === Registry ===

    /// Registry cache reloads
    pub static ref REGISTRY_RELOADS: Counter = register_counter!(
        "minz_registry_reloads_total",
        "Dimension registry cache reloads"
    ).unwrap();

    /// Dimensions currently cached
    pub static ref DIMENSIONS_LOADED: Gauge = register_gauge!(
        "minz_dimensions_loaded",
        "Number of dimensions in the registry cache"
    ).unwrap();
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder.encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer)
        .map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record a row write
#[inline]
pub fn record_row_write(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    ROW_WRITES_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Record an auto-created stub row
#[inline]
pub fn record_stub_row(dimension: &str) {
    STUB_ROWS_CREATED
        .with_label_values(&[dimension])
        .inc();
}

/// Record a swallowed uniqueness conflict
#[inline]
pub fn record_conflict_swallowed(operation: &str) {
    CONFLICTS_SWALLOWED
        .with_label_values(&[operation])
        .inc();
}

/// Record an error
#[inline]
pub fn record_error(error_type: &str, operation: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, operation])
        .inc();
}

/// Record query latency
#[inline]
pub fn record_query(operation: &str, duration_secs: f64) {
    QUERY_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record a registry reload
#[inline]
pub fn record_registry_reload(dimensions: usize) {
    REGISTRY_RELOADS.inc();
    DIMENSIONS_LOADED.set(dimensions as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_row_write() {
        record_row_write("add", true);
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("minz_row_writes_total"));
    }

    #[test]
    fn test_registry_reload_gauge() {
        record_registry_reload(7);
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("minz_dimensions_loaded"));
        assert!(metrics.contains("minz_registry_reloads_total"));
    }

    #[test]
    fn test_conflict_counter() {
        let before = CONFLICTS_SWALLOWED
            .with_label_values(&["test_conflict"])
            .get();
        record_conflict_swallowed("test_conflict");
        let after = CONFLICTS_SWALLOWED
            .with_label_values(&["test_conflict"])
            .get();
        assert_eq!(after, before + 1.0);
    }
}
