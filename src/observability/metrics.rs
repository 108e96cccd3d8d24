//! Metrics collection and exposition.
//!
//! # Metrics
//! - `commlink_connections_accepted_total` (counter): sockets admitted by a server
//! - `commlink_connections_rejected_total` (counter): sockets refused at capacity
//! - `commlink_request_duration_seconds` (histogram): handler latency
//! - `commlink_client_connections_total` (counter): client connections opened, by scheme
//!
//! # Design Decisions
//! - The `metrics` facade is used directly at the call sites; this module
//!   only names the metrics and installs the Prometheus exporter

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const CONNECTIONS_ACCEPTED: &str = "commlink_connections_accepted_total";
pub const CONNECTIONS_REJECTED: &str = "commlink_connections_rejected_total";
pub const REQUEST_DURATION: &str = "commlink_request_duration_seconds";
pub const CLIENT_CONNECTIONS: &str = "commlink_client_connections_total";

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe() {
    describe_counter!(CONNECTIONS_ACCEPTED, "Connections admitted by the server");
    describe_counter!(CONNECTIONS_REJECTED, "Connections refused because the server was at capacity");
    describe_histogram!(REQUEST_DURATION, "Request handler duration in seconds");
    describe_counter!(CLIENT_CONNECTIONS, "Client connections opened by endpoints");
}

pub fn record_accepted() {
    counter!(CONNECTIONS_ACCEPTED).increment(1);
}

pub fn record_rejected() {
    counter!(CONNECTIONS_REJECTED).increment(1);
}

pub fn record_request(duration: Duration) {
    histogram!(REQUEST_DURATION).record(duration.as_secs_f64());
}

pub fn record_client_connection(scheme: &str) {
    counter!(CLIENT_CONNECTIONS, "scheme" => scheme.to_string()).increment(1);
}
