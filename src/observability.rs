//! Metrics recording
//!
//! The metric identifiers below are the public interface consumed by an
//! external scraping collaborator. The core only calls the recording
//! helpers at well-defined moments: tool-call start/end, sandbox execution,
//! authentication attempts, and session-count changes.

use serde_json::Value;
use telemetry_metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use tracing::debug;

/// Total number of tool calls, labeled by tool and status
pub const TOOL_CALLS_TOTAL: &str = "mcp_tool_calls_total";
/// Tool execution duration in seconds, labeled by tool
pub const TOOL_DURATION_SECONDS: &str = "mcp_tool_duration_seconds";
/// Sandbox execution duration in seconds, labeled by backend
pub const SANDBOX_DURATION_SECONDS: &str = "mcp_sandbox_duration_seconds";
/// Number of sandbox containers currently running
pub const SANDBOX_CONTAINERS_RUNNING: &str = "mcp_sandbox_containers_running";
/// Queries issued from inside the sandbox, labeled by cluster and network
pub const SANDBOX_QUERIES_TOTAL: &str = "mcp_sandbox_queries_total";
/// Sandbox query duration in seconds, labeled by cluster and network
pub const SANDBOX_QUERY_DURATION_SECONDS: &str = "mcp_sandbox_query_duration_seconds";
/// Authentication attempts, labeled by result
pub const AUTH_ATTEMPTS_TOTAL: &str = "mcp_auth_attempts_total";
/// Number of active sessions
pub const ACTIVE_SESSIONS: &str = "mcp_active_sessions";

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(TOOL_CALLS_TOTAL, "Total number of tool calls");
    describe_histogram!(TOOL_DURATION_SECONDS, "Tool execution duration in seconds");
    describe_histogram!(
        SANDBOX_DURATION_SECONDS,
        "Sandbox execution duration in seconds"
    );
    describe_gauge!(
        SANDBOX_CONTAINERS_RUNNING,
        "Number of sandbox containers currently running"
    );
    describe_counter!(SANDBOX_QUERIES_TOTAL, "Total number of queries from sandbox");
    describe_histogram!(
        SANDBOX_QUERY_DURATION_SECONDS,
        "Query duration in sandbox"
    );
    describe_counter!(AUTH_ATTEMPTS_TOTAL, "Total authentication attempts");
    describe_gauge!(ACTIVE_SESSIONS, "Number of active sessions");
}

/// Record a completed tool call
pub fn record_tool_call(tool: &str, status: &str, duration_seconds: f64) {
    counter!(TOOL_CALLS_TOTAL, "tool" => tool.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(TOOL_DURATION_SECONDS, "tool" => tool.to_string()).record(duration_seconds);
}

/// Record a sandbox execution
pub fn record_sandbox_execution(backend: &str, duration_seconds: f64) {
    histogram!(SANDBOX_DURATION_SECONDS, "backend" => backend.to_string())
        .record(duration_seconds);
}

/// Forward the machine-readable metrics blob a sandbox run left in
/// `output/.metrics.json`. Entries that don't look like query records are
/// skipped.
pub fn record_sandbox_metrics(metrics: &Value) {
    let Some(queries) = metrics.get("queries").and_then(Value::as_array) else {
        return;
    };

    for query in queries {
        let cluster = query
            .get("cluster")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let network = query
            .get("network")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let duration = query
            .get("duration_seconds")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        counter!(
            SANDBOX_QUERIES_TOTAL,
            "cluster" => cluster.to_string(),
            "network" => network.to_string()
        )
        .increment(1);
        histogram!(
            SANDBOX_QUERY_DURATION_SECONDS,
            "cluster" => cluster.to_string(),
            "network" => network.to_string()
        )
        .record(duration);
    }

    debug!(queries = queries.len(), "Forwarded sandbox query metrics");
}

/// Record an authentication attempt outcome
/// (`success`, `failure`, or `invalid_org`)
pub fn record_auth_attempt(result: &str) {
    counter!(AUTH_ATTEMPTS_TOTAL, "result" => result.to_string()).increment(1);
}

/// Update the active-session gauge
pub fn set_active_sessions(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!(ACTIVE_SESSIONS).set(count as f64);
}

/// Update the running-container gauge
pub fn set_running_containers(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!(SANDBOX_CONTAINERS_RUNNING).set(count as f64);
}

/// Install the Prometheus exporter on its own scrape listener
///
/// # Errors
///
/// Returns a configuration error if the exporter cannot bind or a recorder
/// is already installed.
#[cfg(feature = "metrics")]
pub fn install_exporter(port: u16) -> crate::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| crate::Error::Config(format!("Failed to install metrics exporter: {e}")))?;

    describe_metrics();
    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}
