use anyhow::Result;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "profiler_upstream_requests_total",
        "Upstream provider requests by endpoint and status."
    );
    describe_histogram!(
        "profiler_upstream_latency_ms",
        "Upstream provider request latency in milliseconds."
    );
    describe_counter!(
        "profiler_upstream_errors_total",
        "Failed upstream requests by endpoint and error kind."
    );
    describe_counter!(
        "profiler_source_retries_total",
        "Source client attempts that were retried."
    );
    describe_counter!(
        "profiler_source_degraded_total",
        "Source clients that gave up and returned their default."
    );
    describe_counter!(
        "profiler_wallets_scored_total",
        "Wallet evaluations that produced a persona."
    );
    describe_counter!(
        "profiler_reference_stats_computed_total",
        "Reference statistics computations over the stored population."
    );
    describe_histogram!(
        "profiler_db_query_latency_ms",
        "SQLite call latency in milliseconds, by op and status."
    );
    describe_counter!(
        "profiler_db_query_errors_total",
        "Failed SQLite calls by op."
    );
    describe_counter!("tracing_error_events", "ERROR level log events.");
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}
