// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport error taxonomy.

use std::time::Duration;

use parley_core::ParleyError;
use thiserror::Error;

/// Errors raised by the transport client and its connectors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The environment cannot use the transport at all. Terminal for the session.
    #[error("realtime transport unsupported: {0}")]
    Unsupported(String),

    /// The operation requires a live connection.
    #[error("not connected")]
    NotConnected,

    /// The socket could not be opened or the handshake did not complete.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The broker answered the handshake with an ERROR frame.
    #[error("broker rejected the connection: {0}")]
    Rejected(String),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The link closed while the operation was in flight.
    #[error("connection closed")]
    Closed,

    /// The driver did not confirm a publish in time.
    #[error("publish not confirmed within {0:?}")]
    Timeout(Duration),

    /// The driver task is gone.
    #[error("transport client has shut down")]
    Shutdown,
}

impl TransportError {
    /// Whether the failure says anything about the environment rather than
    /// the current network conditions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::Unsupported(_) | TransportError::Shutdown)
    }
}

impl From<TransportError> for ParleyError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(duration) => ParleyError::Timeout { duration },
            other => ParleyError::Transport {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}
