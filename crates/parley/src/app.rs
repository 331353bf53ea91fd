// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring shared by the subcommands.

use std::sync::Arc;

use parley_config::model::ParleyConfig;
use parley_core::{
    ConversationId, CredentialProvider, Envelope, FallbackService, ParleyError, StaticToken, UserId,
};
use parley_fallback::FallbackClient;
use parley_session::{ConversationTarget, MessagingSession};
use parley_transport::TransportClient;
use tracing::info;

/// Resolved identity and collaborators for one run of the CLI.
pub struct App {
    pub config: ParleyConfig,
    pub credentials: Arc<dyn CredentialProvider>,
    pub fallback: Arc<FallbackClient>,
}

impl App {
    pub fn new(config: ParleyConfig) -> Result<Self, ParleyError> {
        let credentials: Arc<dyn CredentialProvider> = match &config.session.bearer_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(StaticToken::anonymous()),
        };
        let fallback = Arc::new(FallbackClient::new(
            &config.fallback,
            Arc::clone(&credentials),
        )?);
        Ok(Self {
            config,
            credentials,
            fallback,
        })
    }

    /// The signed-in user, required by every command that talks as someone.
    pub fn me(&self) -> Result<UserId, ParleyError> {
        self.config
            .session
            .user_id
            .map(UserId)
            .ok_or_else(|| {
                ParleyError::Config(
                    "session.user_id is not set (use --user or PARLEY_SESSION_USER_ID)".into(),
                )
            })
    }

    /// Spawn the WebSocket transport and start a session on it.
    pub async fn session(&self) -> Result<MessagingSession, ParleyError> {
        let me = self.me()?;
        let transport =
            TransportClient::websocket(&self.config.transport, Arc::clone(&self.credentials));
        let fallback: Arc<dyn FallbackService> = self.fallback.clone();
        let session =
            MessagingSession::start(me, transport, fallback, self.config.dedup.clone()).await?;
        info!(user = %me, endpoint = %self.config.transport.endpoint, "session ready");
        Ok(session)
    }
}

/// Map `--conversation` / `--peer` flags onto a view target.
pub fn target(conversation: Option<i64>, peer: Option<i64>) -> Option<ConversationTarget> {
    match (conversation, peer) {
        (Some(id), peer) => Some(ConversationTarget::Conversation {
            id: ConversationId(id),
            peer: peer.map(UserId),
        }),
        (None, Some(peer)) => Some(ConversationTarget::Direct { peer: UserId(peer) }),
        (None, None) => None,
    }
}

/// One line per message: `[HH:MM:SS] #id user N: text (+k media)`.
pub fn format_envelope(envelope: &Envelope) -> String {
    let time = envelope
        .timestamp
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    let id = envelope
        .id
        .map(|id| format!("#{id}"))
        .unwrap_or_else(|| "#-".to_string());
    let mut line = format!(
        "[{time}] {id} user {}: {}",
        envelope.sender_id,
        envelope.content.as_deref().unwrap_or("")
    );
    if !envelope.media_urls.is_empty() {
        line.push_str(&format!(" (+{} media)", envelope.media_urls.len()));
    }
    line
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use parley_core::MessageId;

    use super::*;

    #[test]
    fn conversation_flag_wins_and_keeps_peer() {
        assert_eq!(
            target(Some(4), Some(2)),
            Some(ConversationTarget::Conversation {
                id: ConversationId(4),
                peer: Some(UserId(2)),
            })
        );
        assert_eq!(
            target(None, Some(2)),
            Some(ConversationTarget::Direct { peer: UserId(2) })
        );
        assert_eq!(target(None, None), None);
    }

    #[test]
    fn formats_stored_message() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 7).unwrap();
        let envelope = Envelope::draft(UserId(2), "hello")
            .with_id(MessageId(12))
            .at(at)
            .with_media(["https://cdn/a.png".to_string()]);
        assert_eq!(
            format_envelope(&envelope),
            "[09:05:07] #12 user 2: hello (+1 media)"
        );
    }

    #[test]
    fn formats_draft_without_id_or_time() {
        let mut envelope = Envelope::draft(UserId(1), "hi");
        envelope.timestamp = None;
        assert_eq!(format_envelope(&envelope), "[--:--:--] #- user 1: hi");
    }

    #[test]
    fn missing_user_is_a_config_error() {
        let app = App::new(ParleyConfig::default()).unwrap();
        assert!(matches!(app.me(), Err(ParleyError::Config(_))));
    }
}
