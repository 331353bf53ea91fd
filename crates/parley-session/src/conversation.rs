// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An open chat with one conversation or peer.
//!
//! All inputs to a view (broker deliveries, fallback results, history,
//! local deletions) funnel into one consumer task, which owns the
//! [`DeliveryRecord`]. Two near-simultaneous deliveries can therefore never
//! both be judged novel.

use std::sync::Arc;

use parley_config::model::DedupConfig;
use parley_core::{
    ConversationId, Envelope, EnvelopeKind, FallbackService, MessageId, ParleyError, UserId,
    topics,
};
use parley_transport::TransportClient;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dedup::DeliveryRecord;
use crate::dispatcher::{FallbackDispatcher, SendOutcome};
use crate::error::{SendError, SessionError};
use crate::notifications::Notifications;

/// Who a view talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationTarget {
    /// A known conversation. `peer` is set on outgoing messages when known.
    Conversation {
        id: ConversationId,
        peer: Option<UserId>,
    },
    /// Direct messages with a user, before a conversation exists.
    Direct { peer: UserId },
}

impl ConversationTarget {
    /// Broker topics carrying this target's deliveries.
    pub fn topics(&self, me: UserId) -> Vec<String> {
        match *self {
            ConversationTarget::Conversation { id, .. } => vec![topics::conversation(id)],
            ConversationTarget::Direct { peer } => topics::direct_pair(me, peer).to_vec(),
        }
    }

    /// A draft from `me` addressed to this target.
    pub fn draft(&self, me: UserId, content: impl Into<String>) -> Envelope {
        let envelope = Envelope::draft(me, content);
        match *self {
            ConversationTarget::Conversation { id, peer } => {
                let envelope = envelope.in_conversation(id);
                match peer {
                    Some(peer) => envelope.to(peer),
                    None => envelope,
                }
            }
            ConversationTarget::Direct { peer } => envelope.to(peer),
        }
    }
}

enum ViewInput {
    Delivered(Envelope),
    Stored(Envelope),
    History(Vec<Envelope>),
    Removed(MessageId),
}

/// Shared collaborators a view needs.
#[derive(Clone)]
pub struct ViewContext {
    pub me: UserId,
    pub transport: TransportClient,
    pub dispatcher: FallbackDispatcher,
    pub fallback: Arc<dyn FallbackService>,
    pub notifications: Arc<Notifications>,
    pub dedup: DedupConfig,
}

/// A live conversation view.
pub struct ConversationView {
    target: ConversationTarget,
    topics: Vec<String>,
    ctx: ViewContext,
    inbox: mpsc::UnboundedSender<ViewInput>,
    messages: watch::Receiver<Vec<Envelope>>,
    consumer: JoinHandle<()>,
    closed: bool,
}

impl std::fmt::Debug for ConversationView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationView")
            .field("target", &self.target)
            .field("topics", &self.topics)
            .finish_non_exhaustive()
    }
}

impl ConversationView {
    /// Open a view: mark the editor open, subscribe the target's topics and
    /// load history through the fallback service.
    ///
    /// A failed history load is logged; the view still receives live
    /// deliveries.
    pub async fn open(ctx: ViewContext, target: ConversationTarget) -> Result<Self, SessionError> {
        ctx.notifications.set_editor_open(true);

        let (inbox, rx) = mpsc::unbounded_channel();
        let (messages_tx, messages) = watch::channel(Vec::new());
        let consumer = tokio::spawn(consume(
            rx,
            DeliveryRecord::from_config(&ctx.dedup),
            messages_tx,
            Arc::clone(&ctx.notifications),
        ));

        let topics = target.topics(ctx.me);
        let view = Self {
            target,
            topics,
            ctx,
            inbox,
            messages,
            consumer,
            closed: false,
        };

        for topic in &view.topics {
            let tx = view.inbox.clone();
            view.ctx
                .transport
                .subscribe(topic.clone(), move |envelope| {
                    let _ = tx.send(ViewInput::Delivered(envelope));
                })
                .await?;
        }

        let history = match target {
            ConversationTarget::Conversation { id, .. } => {
                view.ctx.fallback.conversation_messages(id).await
            }
            ConversationTarget::Direct { peer } => {
                view.ctx.fallback.messages_between(view.ctx.me, peer).await
            }
        };
        match history {
            Ok(history) => {
                debug!(count = history.len(), "conversation history loaded");
                let _ = view.inbox.send(ViewInput::History(history));
            }
            Err(e) => warn!(error = %e, target = ?target, "failed to load conversation history"),
        }

        Ok(view)
    }

    pub fn target(&self) -> ConversationTarget {
        self.target
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Messages currently visible, in arrival order.
    pub fn messages(&self) -> Vec<Envelope> {
        self.messages.borrow().clone()
    }

    /// Observe the visible message list.
    pub fn watch(&self) -> watch::Receiver<Vec<Envelope>> {
        self.messages.clone()
    }

    /// Wait until at least `count` messages are visible.
    pub async fn wait_for_len(&self, count: usize) -> Vec<Envelope> {
        let mut rx = self.messages.clone();
        match rx.wait_for(|m| m.len() >= count).await {
            Ok(messages) => messages.clone(),
            Err(_) => self.messages(),
        }
    }

    /// Send a text message to this view's target.
    pub async fn send_text(&self, content: impl Into<String>) -> Result<SendOutcome, SendError> {
        let envelope = self.target.draft(self.ctx.me, content);
        self.send(envelope).await
    }

    /// Send `envelope` through the dispatcher.
    ///
    /// A realtime send is not shown until the broker echoes it back on a
    /// subscribed topic. A fallback result is authoritative and shown as
    /// returned.
    pub async fn send(&self, envelope: Envelope) -> Result<SendOutcome, SendError> {
        let outcome = self.ctx.dispatcher.send(&envelope).await?;
        if let SendOutcome::Fallback(stored) = &outcome {
            let _ = self.inbox.send(ViewInput::Stored(stored.clone()));
        }
        Ok(outcome)
    }

    /// Delete a message through the REST service and drop it from the view.
    pub async fn delete(&self, id: MessageId) -> Result<String, ParleyError> {
        let confirmation = self.ctx.fallback.delete_message(id).await?;
        let _ = self.inbox.send(ViewInput::Removed(id));
        Ok(confirmation)
    }

    /// Unsubscribe, stop the consumer and mark the editor closed.
    pub async fn close(mut self) {
        self.closed = true;
        for topic in &self.topics {
            if let Err(e) = self.ctx.transport.unsubscribe(topic.clone()).await {
                debug!(topic = %topic, error = %e, "unsubscribe on close failed");
            }
        }
        self.ctx.notifications.set_editor_open(false);
        self.consumer.abort();
    }
}

impl Drop for ConversationView {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.ctx.notifications.set_editor_open(false);
        self.consumer.abort();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let transport = self.ctx.transport.clone();
            let topics = std::mem::take(&mut self.topics);
            handle.spawn(async move {
                for topic in topics {
                    let _ = transport.unsubscribe(topic).await;
                }
            });
        }
    }
}

async fn consume(
    mut rx: mpsc::UnboundedReceiver<ViewInput>,
    mut record: DeliveryRecord,
    messages: watch::Sender<Vec<Envelope>>,
    notifications: Arc<Notifications>,
) {
    while let Some(input) = rx.recv().await {
        match input {
            ViewInput::Delivered(envelope) => match envelope.kind() {
                EnvelopeKind::Delete => {
                    if let Some(target) = envelope.message_id {
                        remove(&mut record, &messages, target);
                    }
                }
                EnvelopeKind::Unknown => debug!("ignoring envelope of unknown type"),
                EnvelopeKind::Message => {
                    if envelope.validate().is_err() {
                        debug!("ignoring delivery without id or body");
                        continue;
                    }
                    match record.accept(envelope) {
                        Some(accepted) => {
                            notifications.record_delivery(&accepted);
                            messages.send_modify(|m| m.push(accepted));
                        }
                        None => parley_prometheus::record_duplicate(),
                    }
                }
            },
            ViewInput::Stored(envelope) => match record.accept(envelope) {
                Some(accepted) => messages.send_modify(|m| m.push(accepted)),
                None => parley_prometheus::record_duplicate(),
            },
            ViewInput::History(history) => {
                let accepted: Vec<Envelope> =
                    history.into_iter().filter_map(|e| record.accept(e)).collect();
                messages.send_modify(|m| {
                    m.extend(accepted);
                    m.sort_by_key(|e| e.timestamp);
                });
            }
            ViewInput::Removed(id) => remove(&mut record, &messages, id),
        }
    }
}

fn remove(record: &mut DeliveryRecord, messages: &watch::Sender<Vec<Envelope>>, id: MessageId) {
    record.forget(id);
    messages.send_if_modified(|m| {
        let before = m.len();
        m.retain(|e| e.id != Some(id));
        m.len() != before
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_target_uses_conversation_topic() {
        let target = ConversationTarget::Conversation {
            id: ConversationId(4),
            peer: Some(UserId(2)),
        };
        assert_eq!(target.topics(UserId(1)), vec!["/topic/messages/4".to_string()]);
        let draft = target.draft(UserId(1), "hi");
        assert_eq!(draft.conversation_id, Some(ConversationId(4)));
        assert_eq!(draft.receiver_id, Some(UserId(2)));
    }

    #[test]
    fn direct_target_uses_both_directions() {
        let target = ConversationTarget::Direct { peer: UserId(2) };
        assert_eq!(
            target.topics(UserId(1)),
            vec![
                "/topic/messages/direct/1/2".to_string(),
                "/topic/messages/direct/2/1".to_string()
            ]
        );
        let draft = target.draft(UserId(1), "hi");
        assert_eq!(draft.conversation_id, None);
        assert_eq!(draft.receiver_id, Some(UserId(2)));
    }
}
