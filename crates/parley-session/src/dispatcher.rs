// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime-first send with REST fallback.

use std::sync::Arc;

use parley_core::{Envelope, FallbackService};
use parley_transport::TransportClient;
use tracing::{debug, warn};

use crate::error::SendError;

/// How a send was delivered. Exactly one is produced per call.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Handed to the broker. The stored message arrives through the subscription.
    Realtime,
    /// Stored through the REST service. The envelope is authoritative and no
    /// echo will follow.
    Fallback(Envelope),
}

/// Chooses the realtime or fallback path for each send.
#[derive(Clone)]
pub struct FallbackDispatcher {
    transport: TransportClient,
    fallback: Arc<dyn FallbackService>,
}

impl std::fmt::Debug for FallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackDispatcher")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl FallbackDispatcher {
    pub fn new(transport: TransportClient, fallback: Arc<dyn FallbackService>) -> Self {
        Self {
            transport,
            fallback,
        }
    }

    /// Deliver `envelope` once.
    ///
    /// Connection state is read fresh on every call. Any realtime failure,
    /// including a link that drops before the write is confirmed, falls
    /// through to the REST service. Fallback failures are returned as-is and
    /// never retried.
    pub async fn send(&self, envelope: &Envelope) -> Result<SendOutcome, SendError> {
        envelope
            .validate()
            .map_err(|e| SendError::Invalid(e.to_string()))?;

        if self.transport.is_connected() {
            match self.transport.send(envelope).await {
                Ok(()) => {
                    parley_prometheus::record_send("realtime");
                    debug!(sender = %envelope.sender_id, "message published");
                    return Ok(SendOutcome::Realtime);
                }
                Err(e) => warn!(error = %e, "realtime publish failed, using fallback"),
            }
        }

        let stored = self
            .fallback
            .send_message(envelope)
            .await
            .map_err(SendError::Fallback)?;
        parley_prometheus::record_send("fallback");
        debug!(id = ?stored.id, "message stored through fallback");
        Ok(SendOutcome::Fallback(stored))
    }
}
