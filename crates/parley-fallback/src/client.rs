// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the messaging REST API.
//!
//! Every request carries `Authorization: Bearer <token>` taken from the
//! credential provider at call time. A missing token fails before any
//! request is made.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parley_config::model::FallbackConfig;
use parley_core::{
    ConversationId, ConversationSummary, CredentialProvider, Envelope, FallbackService, MessageId,
    ParleyError, UserId,
};
use reqwest::{RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::SendMessageRequest;

/// REST client for message delivery and history.
#[derive(Clone)]
pub struct FallbackClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for FallbackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl FallbackClient {
    pub fn new(
        config: &FallbackConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ParleyError> {
        let timeout = config.request_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Fallback {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Attach the bearer token, failing if there is none.
    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ParleyError> {
        let token = self
            .credentials
            .bearer_token()
            .ok_or(ParleyError::Unauthenticated)?;
        Ok(request.bearer_auth(token.expose_secret()))
    }

    async fn execute(&self, endpoint: &'static str, request: RequestBuilder) -> Result<Response, ParleyError> {
        let request = self.authorized(request)?;
        metrics::counter!("parley_fallback_requests_total", "endpoint" => endpoint).increment(1);

        let started = Instant::now();
        let sent = request.send().await;
        metrics::histogram!("parley_fallback_request_seconds", "endpoint" => endpoint)
            .record(started.elapsed().as_secs_f64());
        let response = sent.map_err(|e| {
            if e.is_timeout() {
                ParleyError::Timeout {
                    duration: self.timeout,
                }
            } else {
                ParleyError::Fallback {
                    message: format!("HTTP request failed: {e}"),
                    status: None,
                    source: Some(Box::new(e)),
                }
            }
        })?;

        let status = response.status();
        debug!(endpoint, status = %status, "fallback response received");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(endpoint, status = %status, body = %body, "fallback request rejected");
        metrics::counter!("parley_fallback_failures_total", "endpoint" => endpoint).increment(1);
        Err(ParleyError::Fallback {
            message: format!("service returned {status}: {body}"),
            status: Some(status.as_u16()),
            source: None,
        })
    }

    async fn json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ParleyError> {
        let response = self.execute(endpoint, request).await?;
        let body = response.text().await.map_err(|e| ParleyError::Fallback {
            message: format!("failed to read response body: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&body).map_err(|e| ParleyError::Fallback {
            message: format!("failed to parse response: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })
    }

    async fn text(&self, endpoint: &'static str, request: RequestBuilder) -> Result<String, ParleyError> {
        let response = self.execute(endpoint, request).await?;
        response.text().await.map_err(|e| ParleyError::Fallback {
            message: format!("failed to read response body: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })
    }
}

#[async_trait]
impl FallbackService for FallbackClient {
    async fn send_message(&self, envelope: &Envelope) -> Result<Envelope, ParleyError> {
        envelope.validate()?;
        let body = SendMessageRequest::from(envelope);
        let request = self.client.post(self.url("/messages")).json(&body);
        let mut stored: Envelope = self.json("send_message", request).await?;
        // The service echoes only the stored fields; keep routing context.
        stored.conversation_id = stored.conversation_id.or(envelope.conversation_id);
        stored.receiver_id = stored.receiver_id.or(envelope.receiver_id);
        stored.timestamp = stored.timestamp.or(envelope.timestamp);
        Ok(stored)
    }

    async fn conversation_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<Envelope>, ParleyError> {
        let request = self
            .client
            .get(self.url(&format!("/messages/conversation/{conversation}")));
        self.json("conversation_messages", request).await
    }

    async fn messages_between(&self, a: UserId, b: UserId) -> Result<Vec<Envelope>, ParleyError> {
        let request = self
            .client
            .get(self.url(&format!("/messages/between?user1Id={a}&user2Id={b}")));
        self.json("messages_between", request).await
    }

    async fn delete_message(&self, id: MessageId) -> Result<String, ParleyError> {
        let request = self.client.delete(self.url(&format!("/messages/{id}")));
        self.text("delete_message", request).await
    }

    async fn conversations(&self, user: UserId) -> Result<Vec<ConversationSummary>, ParleyError> {
        let request = self.client.get(self.url(&format!("/conversations/{user}")));
        self.json("conversations", request).await
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<String, ParleyError> {
        let request = self.client.delete(self.url(&format!("/conversations/{id}")));
        self.text("delete_conversation", request).await
    }
}
