// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley probe`: check that the broker endpoint accepts WebSocket upgrades.

use parley_config::model::TransportConfig;
use parley_core::ParleyError;
use parley_transport::{Connector, StompConnector, TransportError};
use tracing::debug;

pub async fn run_probe(config: &TransportConfig) -> Result<(), ParleyError> {
    let connector = StompConnector::new(config);
    debug!(endpoint = %config.endpoint, "probing realtime endpoint");
    match connector.probe().await {
        Ok(()) => {
            println!("realtime transport supported at {}", config.endpoint);
            Ok(())
        }
        Err(TransportError::Unsupported(reason)) => {
            println!("realtime transport unsupported: {reason}");
            println!("messages will be delivered through the fallback service instead");
            Err(TransportError::Unsupported(reason).into())
        }
        Err(e) => Err(e.into()),
    }
}
