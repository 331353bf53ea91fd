// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types exchanged over the realtime and fallback paths.
//!
//! The JSON form of [`Envelope`] is identical on both paths (camelCase keys),
//! which lets the deduplicator compare envelopes regardless of how they
//! arrived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;

/// Identifier of a user account on the remote service.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Identifier of a conversation on the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

/// Server-assigned message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distinguishes ordinary deliveries from out-of-band control events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeKind {
    /// A chat message.
    Message,
    /// Removal of a previously delivered message (see [`Envelope::message_id`]).
    Delete,
    /// Any kind this client does not understand. Ignored by consumers.
    #[serde(other)]
    Unknown,
}

/// The unit exchanged over the transport and the fallback path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Server-assigned identifier, absent on locally composed drafts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Zero when absent, as on notices that are not chat messages.
    #[serde(default)]
    pub sender_id: UserId,

    /// Text body; `None` for media-only messages.
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub media_urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,

    /// Send time. Servers emit either RFC 3339 or zone-less ISO timestamps;
    /// anything unparseable is treated as absent.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,

    /// Target of a control event such as [`EnvelopeKind::Delete`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<EnvelopeKind>,
}

impl Envelope {
    /// A locally composed text message with no server identifier yet.
    pub fn draft(sender_id: UserId, content: impl Into<String>) -> Self {
        Self {
            id: None,
            sender_id,
            content: Some(content.into()),
            media_urls: Vec::new(),
            conversation_id: None,
            receiver_id: None,
            timestamp: Some(Utc::now()),
            message_id: None,
            kind: None,
        }
    }

    /// A control event announcing that `target` was deleted.
    pub fn deletion(sender_id: UserId, target: MessageId) -> Self {
        Self {
            id: None,
            sender_id,
            content: None,
            media_urls: Vec::new(),
            conversation_id: None,
            receiver_id: None,
            timestamp: Some(Utc::now()),
            message_id: Some(target),
            kind: Some(EnvelopeKind::Delete),
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn in_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn to(mut self, receiver: UserId) -> Self {
        self.receiver_id = Some(receiver);
        self
    }

    pub fn with_media(mut self, urls: impl IntoIterator<Item = String>) -> Self {
        self.media_urls.extend(urls);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Resolved kind; envelopes without a `type` field are ordinary messages.
    pub fn kind(&self) -> EnvelopeKind {
        self.kind.unwrap_or(EnvelopeKind::Message)
    }

    /// Whether the envelope carries any text or media.
    pub fn has_body(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty()) || !self.media_urls.is_empty()
    }

    /// Checks the dispatch invariant.
    ///
    /// A message needs either a server identifier or a body. A delete event
    /// needs the identifier of the message it removes.
    pub fn validate(&self) -> Result<(), ParleyError> {
        match self.kind() {
            EnvelopeKind::Delete if self.message_id.is_none() => Err(
                ParleyError::InvalidEnvelope("delete event without a target message_id".into()),
            ),
            EnvelopeKind::Delete => Ok(()),
            _ if self.id.is_none() && !self.has_body() => Err(ParleyError::InvalidEnvelope(
                "envelope has neither a server id nor content or media".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// One row of the conversation list returned by the fallback service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub receiver_id: UserId,
    pub receiver_name: String,
    #[serde(default)]
    pub receiver_avatar: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Parses RFC 3339, falling back to a zone-less ISO timestamp taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
