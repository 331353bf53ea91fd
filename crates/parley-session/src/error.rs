// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use parley_core::ParleyError;
use parley_transport::TransportError;
use thiserror::Error;

/// Failure of a single send.
#[derive(Debug, Error)]
pub enum SendError {
    /// Rejected before any delivery attempt.
    #[error("invalid envelope: {0}")]
    Invalid(String),

    /// Both paths were tried and the REST service failed.
    #[error("fallback delivery failed: {0}")]
    Fallback(#[source] ParleyError),
}

/// Failure to open or run a session component.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Service(#[from] ParleyError),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl From<SendError> for ParleyError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Invalid(reason) => ParleyError::InvalidEnvelope(reason),
            SendError::Fallback(inner) => inner,
        }
    }
}

impl From<SessionError> for ParleyError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Transport(e) => e.into(),
            SessionError::Service(e) => e,
            SessionError::Send(e) => e.into(),
        }
    }
}
