// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Durations are stored as milliseconds and exposed
//! as [`Duration`] through accessor methods.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Signed-in user and logging.
    #[serde(default)]
    pub session: SessionConfig,

    /// Realtime broker connection.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Synchronous REST fallback service.
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Delivery deduplication window.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Metrics recorder.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Session identity.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Identifier of the signed-in user. Required by commands that send or listen.
    #[serde(default)]
    pub user_id: Option<i64>,

    /// Bearer token issued by the auth service. Prefer `PARLEY_SESSION_BEARER_TOKEN`.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            bearer_token: None,
            log_level: default_log_level(),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("user_id", &self.user_id)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[redacted]"))
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Realtime transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// STOMP-over-WebSocket endpoint (`ws://` or `wss://`).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Destination that accepts outgoing envelopes.
    #[serde(default = "default_send_destination")]
    pub send_destination: String,

    /// Reconnect attempts after a failure before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnect; attempt `n` waits `n` times this.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound on a single reconnect delay.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Time allowed for the socket handshake plus the STOMP CONNECTED frame.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Time a publish may wait for the driver before the fallback path is used.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    /// Outgoing STOMP heart-beat interval; 0 disables heart-beats.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Bounded queue length between the driver and each topic callback.
    #[serde(default = "default_delivery_queue_capacity")]
    pub delivery_queue_capacity: usize,

    /// Run the compatibility probe before the first connection.
    #[serde(default = "default_probe")]
    pub probe: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            send_destination: default_send_destination(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            delivery_queue_capacity: default_delivery_queue_capacity(),
            probe: default_probe(),
        }
    }
}

impl TransportConfig {
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// `None` when heart-beats are disabled.
    pub fn heartbeat(&self) -> Option<Duration> {
        (self.heartbeat_ms > 0).then(|| Duration::from_millis(self.heartbeat_ms))
    }
}

fn default_endpoint() -> String {
    "ws://localhost:8080/ws/websocket".to_string()
}

fn default_send_destination() -> String {
    "/app/sendMessage".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    3000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

fn default_heartbeat_ms() -> u64 {
    4000
}

fn default_delivery_queue_capacity() -> usize {
    64
}

fn default_probe() -> bool {
    true
}

/// REST fallback service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackConfig {
    /// Base URL of the message API, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl FallbackConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

/// Deduplication window settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// Number of recent envelopes remembered per open conversation.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Maximum timestamp distance for content-based duplicate matching.
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            tolerance_ms: default_tolerance_ms(),
        }
    }
}

impl DedupConfig {
    pub fn tolerance(&self) -> Duration {
        Duration::from_millis(self.tolerance_ms)
    }
}

fn default_window_size() -> usize {
    200
}

fn default_tolerance_ms() -> u64 {
    5000
}

/// Metrics recorder settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder at startup.
    #[serde(default)]
    pub enabled: bool,
}
