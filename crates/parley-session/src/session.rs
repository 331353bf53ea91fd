// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One authenticated user's messaging session.

use std::sync::Arc;

use parley_config::model::DedupConfig;
use parley_core::{
    ConversationId, ConversationSummary, Envelope, FallbackService, ParleyError, UserId, topics,
};
use parley_transport::{TransportClient, TransportError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::conversation::{ConversationTarget, ConversationView, ViewContext};
use crate::dedup::DeliveryRecord;
use crate::dispatcher::FallbackDispatcher;
use crate::error::SessionError;
use crate::notifications::Notifications;

/// Transport, dispatcher and notification state for a signed-in user.
///
/// Starting a session subscribes the user's personal topic, whose deliveries
/// pass through a dedicated [`DeliveryRecord`] into [`Notifications`], and
/// the conversation-update topic, exposed as a change counter.
pub struct MessagingSession {
    me: UserId,
    transport: TransportClient,
    fallback: Arc<dyn FallbackService>,
    dispatcher: FallbackDispatcher,
    notifications: Arc<Notifications>,
    dedup: DedupConfig,
    updates: watch::Receiver<u64>,
    personal: JoinHandle<()>,
}

impl std::fmt::Debug for MessagingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingSession")
            .field("me", &self.me)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl MessagingSession {
    /// Wire the session and register its subscriptions.
    ///
    /// Does not connect; call [`connect`](Self::connect). Subscriptions made
    /// while offline are issued once the link comes up.
    pub async fn start(
        me: UserId,
        transport: TransportClient,
        fallback: Arc<dyn FallbackService>,
        dedup: DedupConfig,
    ) -> Result<Self, SessionError> {
        let notifications = Arc::new(Notifications::new(me));
        let dispatcher = FallbackDispatcher::new(transport.clone(), Arc::clone(&fallback));

        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let mut record = DeliveryRecord::from_config(&dedup);
        let counter = Arc::clone(&notifications);
        let personal = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if envelope.validate().is_err() {
                    continue;
                }
                match record.accept(envelope) {
                    Some(accepted) => {
                        counter.record_delivery(&accepted);
                    }
                    None => parley_prometheus::record_duplicate(),
                }
            }
        });
        transport
            .subscribe(topics::personal(me), move |envelope| {
                let _ = tx.send(envelope);
            })
            .await?;

        let (updates_tx, updates) = watch::channel(0u64);
        transport
            .subscribe(topics::conversation_updates(me), move |summary| {
                debug!(notice = ?summary.id, "conversation list changed");
                updates_tx.send_modify(|n| *n += 1);
            })
            .await?;

        info!(user = %me, "messaging session started");
        Ok(Self {
            me,
            transport,
            fallback,
            dispatcher,
            notifications,
            dedup,
            updates,
            personal,
        })
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    pub fn dispatcher(&self) -> &FallbackDispatcher {
        &self.dispatcher
    }

    pub fn notifications(&self) -> &Arc<Notifications> {
        &self.notifications
    }

    /// Number of conversation-list change notices seen so far.
    pub fn conversation_updates(&self) -> watch::Receiver<u64> {
        self.updates.clone()
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.connect().await
    }

    /// Open a view on an existing conversation.
    pub async fn open_conversation(
        &self,
        id: ConversationId,
        peer: Option<UserId>,
    ) -> Result<ConversationView, SessionError> {
        self.open(ConversationTarget::Conversation { id, peer }).await
    }

    /// Open a direct-message view with `peer`.
    pub async fn open_direct(&self, peer: UserId) -> Result<ConversationView, SessionError> {
        self.open(ConversationTarget::Direct { peer }).await
    }

    pub async fn open(&self, target: ConversationTarget) -> Result<ConversationView, SessionError> {
        let ctx = ViewContext {
            me: self.me,
            transport: self.transport.clone(),
            dispatcher: self.dispatcher.clone(),
            fallback: Arc::clone(&self.fallback),
            notifications: Arc::clone(&self.notifications),
            dedup: self.dedup.clone(),
        };
        ConversationView::open(ctx, target).await
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ParleyError> {
        self.fallback.conversations(self.me).await
    }

    pub async fn delete_conversation(&self, id: ConversationId) -> Result<String, ParleyError> {
        self.fallback.delete_conversation(id).await
    }

    /// Drop the session's subscriptions and tear the connection down.
    pub async fn logout(self) {
        for topic in [topics::personal(self.me), topics::conversation_updates(self.me)] {
            if let Err(e) = self.transport.unsubscribe(topic).await {
                debug!(error = %e, "unsubscribe on logout failed");
            }
        }
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "disconnect on logout failed");
        }
        self.notifications.reset();
        self.personal.abort();
        self.transport.shutdown();
        info!(user = %self.me, "messaging session ended");
    }
}
