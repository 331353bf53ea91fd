// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker topic names and the publish destination.

use crate::types::{ConversationId, UserId};

/// Destination that accepts an [`Envelope`](crate::Envelope) body for fan-out.
pub const SEND_DESTINATION: &str = "/app/sendMessage";

/// Deliveries for every participant of a conversation.
pub fn conversation(id: ConversationId) -> String {
    format!("/topic/messages/{id}")
}

/// Deliveries from `from` to `to` outside of a known conversation.
pub fn direct(from: UserId, to: UserId) -> String {
    format!("/topic/messages/direct/{from}/{to}")
}

/// Both directions of a user pair, in `(me -> peer, peer -> me)` order.
pub fn direct_pair(me: UserId, peer: UserId) -> [String; 2] {
    [direct(me, peer), direct(peer, me)]
}

/// Per-user feed used only for unread notifications.
pub fn personal(user: UserId) -> String {
    format!("/topic/messages/user/{user}")
}

/// Signal that the user's conversation list changed.
pub fn conversation_updates(user: UserId) -> String {
    format!("/topic/conversations/{user}")
}
