// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous request/response message service.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::{ConversationId, ConversationSummary, Envelope, MessageId, UserId};

/// The REST service used when the realtime transport cannot deliver.
///
/// Every call takes and returns [`Envelope`] shapes compatible with the
/// realtime path so results can be fed to the same deduplicator.
#[async_trait]
pub trait FallbackService: Send + Sync + 'static {
    /// Delivers a message and returns the stored, authoritative envelope.
    async fn send_message(&self, envelope: &Envelope) -> Result<Envelope, ParleyError>;

    /// Lists the messages of a conversation, oldest first.
    async fn conversation_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<Envelope>, ParleyError>;

    /// Lists the direct messages exchanged between two users, oldest first.
    async fn messages_between(&self, a: UserId, b: UserId) -> Result<Vec<Envelope>, ParleyError>;

    /// Deletes a message, returning the service's confirmation text.
    async fn delete_message(&self, id: MessageId) -> Result<String, ParleyError>;

    /// Lists the conversations a user takes part in.
    async fn conversations(&self, user: UserId) -> Result<Vec<ConversationSummary>, ParleyError>;

    /// Deletes a whole conversation.
    async fn delete_conversation(&self, id: ConversationId) -> Result<String, ParleyError>;
}
