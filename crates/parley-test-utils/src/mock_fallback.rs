// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock REST fallback service for deterministic testing.
//!
//! `MockFallback` implements `FallbackService` over in-memory history,
//! captures every sent envelope, and can be told to fail.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parley_core::{
    ConversationId, ConversationSummary, Envelope, FallbackService, MessageId, ParleyError, UserId,
};
use tokio::sync::Mutex;

#[derive(Default)]
struct FallbackState {
    sent: Vec<Envelope>,
    conversations: HashMap<ConversationId, Vec<Envelope>>,
    direct: Vec<Envelope>,
    summaries: Vec<ConversationSummary>,
    deleted: Vec<MessageId>,
    deleted_conversations: Vec<ConversationId>,
    failure: Option<(String, Option<u16>)>,
    next_id: i64,
}

/// A mock fallback service.
pub struct MockFallback {
    state: Mutex<FallbackState>,
}

impl MockFallback {
    /// Create an empty service. Assigned ids start at 1001.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FallbackState {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    /// Fail every subsequent call with `message` and an optional HTTP status.
    pub async fn fail_with(&self, message: impl Into<String>, status: Option<u16>) {
        self.state.lock().await.failure = Some((message.into(), status));
    }

    pub async fn recover(&self) {
        self.state.lock().await.failure = None;
    }

    /// Envelopes accepted by `send_message`, as stored.
    pub async fn sent(&self) -> Vec<Envelope> {
        self.state.lock().await.sent.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.state.lock().await.sent.len()
    }

    pub async fn deleted(&self) -> Vec<MessageId> {
        self.state.lock().await.deleted.clone()
    }

    pub async fn deleted_conversations(&self) -> Vec<ConversationId> {
        self.state.lock().await.deleted_conversations.clone()
    }

    /// Seed the history of a conversation.
    pub async fn seed_conversation(&self, id: ConversationId, history: Vec<Envelope>) {
        self.state.lock().await.conversations.insert(id, history);
    }

    /// Seed direct messages; filtered by sender/receiver pair on read.
    pub async fn seed_direct(&self, history: Vec<Envelope>) {
        self.state.lock().await.direct.extend(history);
    }

    pub async fn seed_summaries(&self, summaries: Vec<ConversationSummary>) {
        self.state.lock().await.summaries = summaries;
    }

    fn check(state: &FallbackState) -> Result<(), ParleyError> {
        match &state.failure {
            Some((message, status)) => Err(ParleyError::Fallback {
                message: message.clone(),
                status: *status,
                source: None,
            }),
            None => Ok(()),
        }
    }
}

impl Default for MockFallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FallbackService for MockFallback {
    async fn send_message(&self, envelope: &Envelope) -> Result<Envelope, ParleyError> {
        let mut state = self.state.lock().await;
        Self::check(&state)?;
        state.next_id += 1;
        let mut stored = envelope.clone();
        stored.id = Some(MessageId(state.next_id));
        stored.timestamp = Some(stored.timestamp.unwrap_or_else(Utc::now));
        match stored.conversation_id {
            Some(id) => state
                .conversations
                .entry(id)
                .or_default()
                .push(stored.clone()),
            None => state.direct.push(stored.clone()),
        }
        state.sent.push(stored.clone());
        Ok(stored)
    }

    async fn conversation_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<Envelope>, ParleyError> {
        let state = self.state.lock().await;
        Self::check(&state)?;
        Ok(state
            .conversations
            .get(&conversation)
            .cloned()
            .unwrap_or_default())
    }

    async fn messages_between(&self, a: UserId, b: UserId) -> Result<Vec<Envelope>, ParleyError> {
        let state = self.state.lock().await;
        Self::check(&state)?;
        Ok(state
            .direct
            .iter()
            .filter(|e| {
                let receiver = e.receiver_id;
                (e.sender_id == a && receiver == Some(b)) || (e.sender_id == b && receiver == Some(a))
            })
            .cloned()
            .collect())
    }

    async fn delete_message(&self, id: MessageId) -> Result<String, ParleyError> {
        let mut state = self.state.lock().await;
        Self::check(&state)?;
        for history in state.conversations.values_mut() {
            history.retain(|e| e.id != Some(id));
        }
        state.direct.retain(|e| e.id != Some(id));
        state.deleted.push(id);
        Ok("Message deleted successfully".into())
    }

    async fn conversations(&self, user: UserId) -> Result<Vec<ConversationSummary>, ParleyError> {
        let state = self.state.lock().await;
        Self::check(&state)?;
        let _ = user;
        Ok(state.summaries.clone())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<String, ParleyError> {
        let mut state = self.state.lock().await;
        Self::check(&state)?;
        state.conversations.remove(&id);
        state.summaries.retain(|s| s.id != id);
        state.deleted_conversations.push(id);
        Ok("Conversation deleted successfully".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_assigns_ids_and_stores_history() {
        let fallback = MockFallback::new();
        let draft = Envelope::draft(UserId(1), "hi").in_conversation(ConversationId(9));
        let stored = fallback.send_message(&draft).await.unwrap();
        assert_eq!(stored.id, Some(MessageId(1001)));
        let history = fallback
            .conversation_messages(ConversationId(9))
            .await
            .unwrap();
        assert_eq!(history, vec![stored]);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_status() {
        let fallback = MockFallback::new();
        fallback.fail_with("service down", Some(503)).await;
        let err = fallback
            .send_message(&Envelope::draft(UserId(1), "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Fallback { status: Some(503), .. }));
        assert_eq!(fallback.sent_count().await, 0);
    }

    #[tokio::test]
    async fn between_filters_by_pair() {
        let fallback = MockFallback::new();
        fallback
            .seed_direct(vec![
                Envelope::draft(UserId(1), "a").to(UserId(2)),
                Envelope::draft(UserId(2), "b").to(UserId(1)),
                Envelope::draft(UserId(1), "c").to(UserId(3)),
            ])
            .await;
        let pair = fallback.messages_between(UserId(2), UserId(1)).await.unwrap();
        assert_eq!(pair.len(), 2);
    }
}
