// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end transport and session tests.
//!
//! `TestHarness` spawns a [`TransportClient`] against a [`MockBroker`] with
//! short timings and pairs it with a [`MockFallback`].

use std::sync::Arc;

use parley_config::model::ParleyConfig;
use parley_core::{CredentialProvider, StaticToken};
use parley_transport::{ConnectionState, TransportClient, TransportError};

use crate::mock_broker::MockBroker;
use crate::mock_fallback::MockFallback;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: ParleyConfig,
    token: Option<String>,
    echo: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ParleyConfig::default();
        config.session.user_id = Some(1);
        config.transport.reconnect_base_delay_ms = 100;
        config.transport.reconnect_max_delay_ms = 1_000;
        config.transport.connect_timeout_ms = 1_000;
        config.transport.publish_timeout_ms = 500;
        config.transport.heartbeat_ms = 0;
        config.transport.delivery_queue_capacity = 16;
        Self {
            config,
            token: Some("test-token".into()),
            echo: false,
        }
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.transport.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }

    /// Have the broker echo published messages back with server ids.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Adjust the configuration directly.
    pub fn configure(mut self, f: impl FnOnce(&mut ParleyConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Spawn the transport. It starts disconnected.
    pub async fn build(self) -> TestHarness {
        let broker = MockBroker::new();
        broker.set_echo(self.echo).await;
        let credentials: Arc<dyn CredentialProvider> = match &self.token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(StaticToken::anonymous()),
        };
        let transport = TransportClient::spawn(
            &self.config.transport,
            broker.connector(),
            Arc::clone(&credentials),
        );
        TestHarness {
            broker,
            fallback: Arc::new(MockFallback::new()),
            transport,
            credentials,
            config: self.config,
        }
    }
}

/// Transport plus mocks, ready for assertions.
pub struct TestHarness {
    pub broker: MockBroker,
    pub fallback: Arc<MockFallback>,
    pub transport: TransportClient,
    pub credentials: Arc<dyn CredentialProvider>,
    pub config: ParleyConfig,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default test settings.
    pub async fn new() -> Self {
        Self::builder().build().await
    }

    /// Connect and wait until the link is up.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.connect().await?;
        self.transport.wait_for(ConnectionState::Connected).await
    }
}
