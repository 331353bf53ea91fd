// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic subscription registry.
//!
//! Holds exactly one callback per topic (last writer wins) and remembers
//! which topics currently have a live subscription on the broker link. Each
//! topic gets its own dispatch task fed by a bounded queue, so a slow
//! callback can only ever lose its own deliveries.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parley_core::Envelope;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::link::LinkWriter;

/// Callback invoked for every envelope delivered on a topic.
///
/// Runs on the topic's dispatch task. It must not block.
pub type Callback = Box<dyn Fn(Envelope) + Send + Sync>;

/// Outcome of [`SubscriptionRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// New topic; a remote subscription is needed.
    Added,
    /// Existing topic; only the callback changed.
    Replaced { remote_live: bool },
}

/// Outcome of routing one inbound body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Queued,
    /// The topic's queue was full.
    Dropped,
    /// No registered topic matched.
    Unroutable,
    /// The body was not a valid envelope.
    Malformed,
}

struct TopicEntry {
    topic: String,
    callback: Arc<ArcSwap<Callback>>,
    queue: mpsc::Sender<Envelope>,
    remote_id: Option<String>,
}

/// Registry of topic subscriptions, owned by the connection driver.
pub struct SubscriptionRegistry {
    entries: Vec<TopicEntry>,
    queue_capacity: usize,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            queue_capacity: queue_capacity.max(1),
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered topics in registration order.
    pub fn topics(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.topic.clone()).collect()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.position(topic).is_some()
    }

    /// Whether `topic` has a live subscription on the current link.
    pub fn is_live(&self, topic: &str) -> bool {
        self.position(topic)
            .is_some_and(|i| self.entries[i].remote_id.is_some())
    }

    /// Install or replace the callback for `topic`.
    pub fn register(&mut self, topic: &str, callback: Callback) -> Registration {
        if let Some(i) = self.position(topic) {
            let entry = &self.entries[i];
            entry.callback.store(Arc::new(callback));
            debug!(topic, "replaced subscription callback");
            return Registration::Replaced {
                remote_live: entry.remote_id.is_some(),
            };
        }

        let callback = Arc::new(ArcSwap::from_pointee(callback));
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        tokio::spawn(dispatch(topic.to_string(), rx, Arc::clone(&callback)));
        self.entries.push(TopicEntry {
            topic: topic.to_string(),
            callback,
            queue: tx,
            remote_id: None,
        });
        debug!(topic, "registered subscription");
        Registration::Added
    }

    /// Remove `topic`, returning its live remote subscription id if any.
    ///
    /// `None` both for unknown topics and for topics without a live remote
    /// subscription; callers only need the id to send UNSUBSCRIBE.
    pub fn remove(&mut self, topic: &str) -> Option<String> {
        let i = self.position(topic)?;
        let entry = self.entries.remove(i);
        debug!(topic, "removed subscription");
        entry.remote_id
    }

    /// Issue a remote subscription for one registered topic.
    pub async fn activate(
        &mut self,
        topic: &str,
        writer: &mut dyn LinkWriter,
    ) -> Result<(), crate::TransportError> {
        let Some(i) = self.position(topic) else {
            return Ok(());
        };
        let id = self.allocate_id();
        writer.subscribe(&id, topic).await?;
        self.entries[i].remote_id = Some(id);
        Ok(())
    }

    /// Re-issue a remote subscription for every entry, in registration order.
    ///
    /// A failure for one topic is logged and does not stop the rest.
    /// Returns the number of topics that failed.
    pub async fn replay(&mut self, writer: &mut dyn LinkWriter) -> usize {
        let mut failed = 0;
        for i in 0..self.entries.len() {
            let id = self.allocate_id();
            let topic = self.entries[i].topic.clone();
            match writer.subscribe(&id, &topic).await {
                Ok(()) => self.entries[i].remote_id = Some(id),
                Err(e) => {
                    failed += 1;
                    self.entries[i].remote_id = None;
                    warn!(topic = %topic, error = %e, "failed to restore subscription");
                }
            }
        }
        failed
    }

    /// Forget every remote subscription id after the link went away.
    pub fn mark_all_stale(&mut self) {
        for entry in &mut self.entries {
            entry.remote_id = None;
        }
    }

    /// Route a message body to its topic's dispatch queue.
    ///
    /// Matches on the subscription id first and the destination second.
    pub fn route(&self, subscription: Option<&str>, destination: &str, body: &str) -> Routed {
        let entry = subscription
            .and_then(|sub| {
                self.entries
                    .iter()
                    .find(|e| e.remote_id.as_deref() == Some(sub))
            })
            .or_else(|| self.entries.iter().find(|e| e.topic == destination));
        let Some(entry) = entry else {
            debug!(destination, "no subscription for inbound message");
            return Routed::Unroutable;
        };

        let envelope: Envelope = match serde_json::from_str(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(topic = %entry.topic, error = %e, "dropping malformed envelope");
                return Routed::Malformed;
            }
        };

        match entry.queue.try_send(envelope) {
            Ok(()) => Routed::Queued,
            Err(TrySendError::Full(_)) => {
                warn!(topic = %entry.topic, "delivery queue full, dropping envelope");
                Routed::Dropped
            }
            Err(TrySendError::Closed(_)) => Routed::Dropped,
        }
    }

    fn position(&self, topic: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.topic == topic)
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("sub-{}", self.next_id)
    }
}

async fn dispatch(topic: String, mut rx: mpsc::Receiver<Envelope>, callback: Arc<ArcSwap<Callback>>) {
    while let Some(envelope) = rx.recv().await {
        let current = callback.load_full();
        (**current)(envelope);
    }
    debug!(topic = %topic, "dispatch task finished");
}
