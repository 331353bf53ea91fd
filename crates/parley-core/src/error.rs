// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the Parley workspace.

use thiserror::Error;

/// The primary error type used by collaborator traits and core operations.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, bad URLs, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Realtime transport errors (connect failure, protocol violation, closed link).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Synchronous fallback service errors (HTTP failure, bad status, bad body).
    #[error("fallback service error: {message}")]
    Fallback {
        message: String,
        /// HTTP status returned by the service, when one was received.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The envelope violates the dispatch invariant and was not transmitted.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// No bearer credential is available for an authenticated call.
    #[error("no authentication token available")]
    Unauthenticated,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Shorthand for a fallback error without an HTTP status or source.
    pub fn fallback(message: impl Into<String>) -> Self {
        ParleyError::Fallback {
            message: message.into(),
            status: None,
            source: None,
        }
    }
}
