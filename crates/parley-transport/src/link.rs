// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The seam between the connection driver and a concrete broker link.
//!
//! The driver only ever talks to a [`Connector`] and the [`Link`] it
//! produces, so tests can swap the WebSocket implementation for an
//! in-memory broker.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Something that arrived from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A MESSAGE frame for one of our subscriptions.
    Message {
        destination: String,
        subscription: Option<String>,
        body: String,
    },
    /// An ERROR frame. The broker closes the link after sending one.
    Error(String),
    /// A bare end-of-line from the broker.
    Heartbeat,
}

/// An established, authenticated broker session.
///
/// The link is considered dropped once `inbound` yields `None`, or when
/// nothing arrives for twice the agreed `inbound_heartbeat` interval.
pub struct Link {
    pub writer: Box<dyn LinkWriter>,
    pub inbound: mpsc::Receiver<Inbound>,
    pub inbound_heartbeat: Option<Duration>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Outbound half of a [`Link`].
#[async_trait]
pub trait LinkWriter: Send {
    async fn subscribe(&mut self, id: &str, topic: &str) -> Result<(), TransportError>;

    async fn unsubscribe(&mut self, id: &str) -> Result<(), TransportError>;

    /// Hand a JSON body to the broker for `destination`.
    async fn send(&mut self, destination: &str, body: &str) -> Result<(), TransportError>;

    async fn heartbeat(&mut self) -> Result<(), TransportError>;

    /// Graceful close. Errors are swallowed; the link is gone either way.
    async fn close(&mut self);
}

/// Opens links to a broker.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Cheap compatibility check run before the first connection of a session.
    ///
    /// Returns [`TransportError::Unsupported`] when the environment can never
    /// use this transport. Any other error is a transient connect failure.
    async fn probe(&self) -> Result<(), TransportError>;

    /// Open and authenticate a new link.
    async fn open(&self, bearer: Option<SecretString>) -> Result<Link, TransportError>;
}
