// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session layer on top of the realtime transport.
//!
//! Provides delivery deduplication, realtime-first sends with REST fallback,
//! the unread counter, and per-conversation views.

pub mod conversation;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod notifications;
pub mod session;

pub use conversation::{ConversationTarget, ConversationView, ViewContext};
pub use dedup::DeliveryRecord;
pub use dispatcher::{FallbackDispatcher, SendOutcome};
pub use error::{SendError, SessionError};
pub use notifications::{Notifications, Presence};
pub use session::MessagingSession;
