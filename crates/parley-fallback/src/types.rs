// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request bodies for the messaging REST API.

use parley_core::{ConversationId, Envelope, UserId};
use serde::Serialize;

/// Body of `POST /messages`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub sender_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

impl From<&Envelope> for SendMessageRequest {
    fn from(envelope: &Envelope) -> Self {
        Self {
            sender_id: envelope.sender_id,
            receiver_id: envelope.receiver_id,
            content: envelope.content.clone().unwrap_or_default(),
            media_urls: envelope.media_urls.clone(),
            conversation_id: envelope.conversation_id,
        }
    }
}
