// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime transport for Parley.
//!
//! A [`TransportClient`] keeps one STOMP session open over WebSocket,
//! reconnects with a bounded linear backoff, and fans broker messages out to
//! per-topic callbacks held in a [`SubscriptionRegistry`].

pub mod backoff;
pub mod client;
pub mod error;
pub mod link;
pub mod registry;
pub mod stomp;
pub mod ws;

pub use backoff::ReconnectPolicy;
pub use client::{ConnectionState, TransportClient, TransportEvent};
pub use error::TransportError;
pub use link::{Connector, Inbound, Link, LinkWriter};
pub use registry::{Callback, SubscriptionRegistry};
pub use ws::StompConnector;
