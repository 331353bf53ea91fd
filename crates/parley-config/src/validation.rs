// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let transport = &config.transport;

    let endpoint = transport.endpoint.trim();
    if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
        errors.push(ConfigError::validation(format!(
            "transport.endpoint `{endpoint}` must start with ws:// or wss://"
        )));
    }

    if !transport.send_destination.starts_with('/') {
        errors.push(ConfigError::validation(format!(
            "transport.send_destination `{}` must be an absolute destination",
            transport.send_destination
        )));
    }

    if transport.reconnect_base_delay_ms == 0 {
        errors.push(ConfigError::validation(
            "transport.reconnect_base_delay_ms must be greater than zero",
        ));
    }

    if transport.reconnect_base_delay_ms > transport.reconnect_max_delay_ms {
        errors.push(ConfigError::validation(format!(
            "transport.reconnect_base_delay_ms ({}) exceeds reconnect_max_delay_ms ({})",
            transport.reconnect_base_delay_ms, transport.reconnect_max_delay_ms
        )));
    }

    if transport.connect_timeout_ms == 0 || transport.publish_timeout_ms == 0 {
        errors.push(ConfigError::validation(
            "transport.connect_timeout_ms and transport.publish_timeout_ms must be greater than zero",
        ));
    }

    if transport.delivery_queue_capacity == 0 {
        errors.push(ConfigError::validation(
            "transport.delivery_queue_capacity must be at least 1",
        ));
    }

    let base_url = config.fallback.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::validation(format!(
            "fallback.base_url `{base_url}` must start with http:// or https://"
        )));
    }

    if config.dedup.window_size == 0 {
        errors.push(ConfigError::validation("dedup.window_size must be at least 1"));
    }

    if !LOG_LEVELS.contains(&config.session.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "session.log_level `{}` is not one of {}",
            config.session.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
