use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn describe() {
    describe_gauge!(
        "dashboard_build_info",
        "Build info for the affiliate dashboard backend (value is always 1)."
    );
    describe_counter!(
        "dashboard_upstream_requests_total",
        "Smartico API requests, by endpoint and status."
    );
    describe_counter!(
        "dashboard_upstream_errors_total",
        "Failed Smartico API requests, by endpoint and error kind."
    );
    describe_histogram!(
        "dashboard_upstream_latency_ms",
        "Smartico API request latency in milliseconds."
    );
    describe_counter!(
        "dashboard_aggregations_total",
        "Aggregation runs, by view and outcome."
    );
    describe_histogram!(
        "dashboard_aggregation_rows",
        "Rows returned by an aggregation run, by view."
    );
    describe_counter!(
        "tracing_error_events",
        "ERROR-level tracing events emitted by the process."
    );
}

/// Install the global Prometheus recorder once and return a handle for `/metrics`.
///
/// The recorder is not given an upkeep task; `/metrics` runs upkeep on each scrape.
pub fn init_global() -> Result<PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }

    describe();
    let handle = PrometheusBuilder::new().install_recorder()?;
    let handle = PROM_HANDLE.get_or_init(|| handle).clone();

    ::metrics::gauge!("dashboard_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    Ok(handle)
}

/// Count one aggregation run for `view` and record its output size.
pub fn record_aggregation(view: &'static str, outcome: &'static str, rows: usize) {
    ::metrics::counter!("dashboard_aggregations_total", "view" => view, "outcome" => outcome)
        .increment(1);
    ::metrics::histogram!("dashboard_aggregation_rows", "view" => view).record(rows as f64);
}
