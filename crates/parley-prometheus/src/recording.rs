// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. The transport and session crates record
//! through the same metric names.

use metrics::{describe_counter, describe_gauge, describe_histogram};

pub const TRANSPORT_STATE: &str = "parley_transport_state";
pub const RECONNECT_ATTEMPTS: &str = "parley_reconnect_attempts_total";
pub const DELIVERIES_DROPPED: &str = "parley_deliveries_dropped_total";
pub const DELIVERIES_MALFORMED: &str = "parley_deliveries_malformed_total";
pub const DUPLICATES_SUPPRESSED: &str = "parley_duplicates_suppressed_total";
pub const SEND_TOTAL: &str = "parley_send_total";
pub const FALLBACK_REQUESTS: &str = "parley_fallback_requests_total";
pub const FALLBACK_FAILURES: &str = "parley_fallback_failures_total";
pub const FALLBACK_LATENCY: &str = "parley_fallback_request_seconds";
pub const UNREAD_MESSAGES: &str = "parley_unread_messages";

/// Register all Parley metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_gauge!(
        TRANSPORT_STATE,
        "Transport state: 0 disconnected, 1 connecting, 2 connected, 3 unavailable, 4 unsupported"
    );
    describe_counter!(RECONNECT_ATTEMPTS, "Scheduled reconnect attempts");
    describe_counter!(
        DELIVERIES_DROPPED,
        "Deliveries dropped because a topic queue was full"
    );
    describe_counter!(
        DELIVERIES_MALFORMED,
        "Deliveries whose body was not a valid envelope"
    );
    describe_counter!(
        DUPLICATES_SUPPRESSED,
        "Deliveries rejected by the deduplication window"
    );
    describe_counter!(SEND_TOTAL, "Messages sent, by delivery path");
    describe_counter!(FALLBACK_REQUESTS, "REST fallback requests, by endpoint");
    describe_counter!(
        FALLBACK_FAILURES,
        "REST fallback requests rejected by the service, by endpoint"
    );
    describe_histogram!(FALLBACK_LATENCY, "REST fallback request latency in seconds");
    describe_gauge!(UNREAD_MESSAGES, "Unread messages for the signed-in user");
}

/// Record a completed send on `path` (`realtime` or `fallback`).
pub fn record_send(path: &'static str) {
    metrics::counter!(SEND_TOTAL, "path" => path).increment(1);
}

/// Record a delivery rejected as a duplicate.
pub fn record_duplicate() {
    metrics::counter!(DUPLICATES_SUPPRESSED).increment(1);
}

/// Set the unread counter gauge.
pub fn set_unread(count: u64) {
    metrics::gauge!(UNREAD_MESSAGES).set(count as f64);
}
