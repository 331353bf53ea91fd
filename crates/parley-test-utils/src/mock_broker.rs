// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory broker for deterministic transport tests.
//!
//! `MockBroker` records every connect, subscribe and publish made through its
//! [`Connector`], lets tests push deliveries into subscribed topics, and can
//! inject failures (probe, connect, publish, subscribe, dropped link) or
//! slow writes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parley_core::{Envelope, MessageId, UserId, topics};
use parley_transport::{Connector, Inbound, Link, LinkWriter, TransportError};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, mpsc};

const LINK_CAPACITY: usize = 64;

struct LinkState {
    id: u64,
    tx: mpsc::Sender<Inbound>,
    subscriptions: Vec<(String, String)>,
}

#[derive(Default)]
struct BrokerState {
    probe_error: Option<TransportError>,
    refuse: bool,
    fail_next_opens: u32,
    fail_publish: bool,
    publish_delay: Option<Duration>,
    heartbeat: Option<Duration>,
    fail_subscribe: HashSet<String>,
    echo: bool,
    probes: u32,
    opens: u32,
    tokens: Vec<Option<String>>,
    next_link: u64,
    next_message_id: i64,
    links: Vec<LinkState>,
    subscribe_log: Vec<String>,
    unsubscribe_log: Vec<String>,
    published: Vec<(String, String)>,
}

impl BrokerState {
    fn link_mut(&mut self, id: u64) -> Result<&mut LinkState, TransportError> {
        self.links
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(TransportError::Closed)
    }

    fn fan_out(&self, topic: &str, body: &str) -> usize {
        let mut delivered = 0;
        for link in &self.links {
            for (sub_id, subscribed) in &link.subscriptions {
                if subscribed == topic {
                    let inbound = Inbound::Message {
                        destination: topic.to_string(),
                        subscription: Some(sub_id.clone()),
                        body: body.to_string(),
                    };
                    if link.tx.try_send(inbound).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    /// Assign an id and timestamp like the server would, then fan out.
    fn echo_published(&mut self, body: &str) {
        let Ok(mut envelope) = serde_json::from_str::<Envelope>(body) else {
            return;
        };
        if envelope.id.is_none() {
            self.next_message_id += 1;
            envelope.id = Some(MessageId(self.next_message_id));
        }
        if envelope.timestamp.is_none() {
            envelope.timestamp = Some(Utc::now());
        }
        let Ok(stored) = serde_json::to_string(&envelope) else {
            return;
        };
        let mut targets = Vec::new();
        if let Some(conversation) = envelope.conversation_id {
            targets.push(topics::conversation(conversation));
        }
        if let Some(receiver) = envelope.receiver_id {
            if envelope.conversation_id.is_none() {
                targets.push(topics::direct(envelope.sender_id, receiver));
            }
            targets.push(topics::personal(receiver));
        }
        for topic in targets {
            self.fan_out(&topic, &stored);
        }
    }
}

/// An in-memory broker. Clones share the same state.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector that opens links to this broker.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            state: Arc::clone(&self.state),
        })
    }

    /// Make the compatibility probe fail with `error`.
    pub async fn set_probe_error(&self, error: Option<TransportError>) {
        self.state.lock().await.probe_error = error;
    }

    /// Refuse every connection attempt while `refuse` is set.
    pub async fn refuse_connections(&self, refuse: bool) {
        self.state.lock().await.refuse = refuse;
    }

    /// Refuse only the next `count` connection attempts.
    pub async fn fail_next_opens(&self, count: u32) {
        self.state.lock().await.fail_next_opens = count;
    }

    /// Make every publish fail as if the link dropped mid-send.
    pub async fn fail_publishes(&self, fail: bool) {
        self.state.lock().await.fail_publish = fail;
    }

    /// Hold every publish write for `delay` before the broker takes it.
    pub async fn delay_publishes(&self, delay: Option<Duration>) {
        self.state.lock().await.publish_delay = delay;
    }

    /// Promise heart-beats every `interval` on links opened from now on.
    pub async fn set_heartbeat(&self, interval: Option<Duration>) {
        self.state.lock().await.heartbeat = interval;
    }

    /// Send one heart-beat on every open link.
    pub async fn send_heartbeat(&self) {
        let state = self.state.lock().await;
        for link in &state.links {
            let _ = link.tx.try_send(Inbound::Heartbeat);
        }
    }

    /// Reject SUBSCRIBE for `topic`.
    pub async fn fail_subscribe(&self, topic: impl Into<String>) {
        self.state.lock().await.fail_subscribe.insert(topic.into());
    }

    /// Echo published chat messages to their topics, as the real service does.
    pub async fn set_echo(&self, echo: bool) {
        self.state.lock().await.echo = echo;
    }

    pub async fn probe_count(&self) -> u32 {
        self.state.lock().await.probes
    }

    /// Number of connection attempts, including failed ones.
    pub async fn open_count(&self) -> u32 {
        self.state.lock().await.opens
    }

    /// Bearer token presented on each connection attempt.
    pub async fn tokens(&self) -> Vec<Option<String>> {
        self.state.lock().await.tokens.clone()
    }

    pub async fn is_connected(&self) -> bool {
        !self.state.lock().await.links.is_empty()
    }

    /// Every topic ever subscribed, in order, across all links.
    pub async fn subscribe_log(&self) -> Vec<String> {
        self.state.lock().await.subscribe_log.clone()
    }

    pub async fn unsubscribe_log(&self) -> Vec<String> {
        self.state.lock().await.unsubscribe_log.clone()
    }

    /// Topics subscribed on the currently open links.
    pub async fn active_topics(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .links
            .iter()
            .flat_map(|l| l.subscriptions.iter().map(|(_, t)| t.clone()))
            .collect()
    }

    /// Published `(destination, envelope)` pairs.
    pub async fn published(&self) -> Vec<(String, Envelope)> {
        let state = self.state.lock().await;
        state
            .published
            .iter()
            .filter_map(|(d, b)| serde_json::from_str(b).ok().map(|e| (d.clone(), e)))
            .collect()
    }

    pub async fn published_count(&self) -> usize {
        self.state.lock().await.published.len()
    }

    /// Deliver `envelope` to every subscription on `topic`. Returns the fan-out count.
    pub async fn deliver(&self, topic: &str, envelope: &Envelope) -> usize {
        let body = serde_json::to_string(envelope).unwrap_or_default();
        self.state.lock().await.fan_out(topic, &body)
    }

    /// Deliver a raw body, for malformed-payload tests.
    pub async fn deliver_raw(&self, topic: &str, body: &str) -> usize {
        self.state.lock().await.fan_out(topic, body)
    }

    /// Deliver a message envelope from `sender` on `topic`.
    pub async fn deliver_text(&self, topic: &str, id: i64, sender: i64, content: &str) -> usize {
        let envelope = Envelope::draft(UserId(sender), content).with_id(MessageId(id));
        self.deliver(topic, &envelope).await
    }

    /// Drop every open link without a goodbye, as a network failure would.
    pub async fn drop_connection(&self) {
        self.state.lock().await.links.clear();
    }

    /// Send an ERROR frame on every open link.
    pub async fn send_error(&self, message: &str) {
        let state = self.state.lock().await;
        for link in &state.links {
            let _ = link.tx.try_send(Inbound::Error(message.to_string()));
        }
    }
}

struct MockConnector {
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn probe(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.probes += 1;
        match state.probe_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn open(&self, bearer: Option<SecretString>) -> Result<Link, TransportError> {
        let mut state = self.state.lock().await;
        state.opens += 1;
        state
            .tokens
            .push(bearer.map(|t| t.expose_secret().to_string()));
        if state.refuse {
            return Err(TransportError::Connect("connection refused".into()));
        }
        if state.fail_next_opens > 0 {
            state.fail_next_opens -= 1;
            return Err(TransportError::Connect("connection refused".into()));
        }

        state.next_link += 1;
        let id = state.next_link;
        let (tx, rx) = mpsc::channel(LINK_CAPACITY);
        state.links.push(LinkState {
            id,
            tx,
            subscriptions: Vec::new(),
        });
        tracing::debug!(link = id, "mock broker accepted connection");
        Ok(Link {
            writer: Box::new(MockWriter {
                state: Arc::clone(&self.state),
                link: id,
            }),
            inbound: rx,
            inbound_heartbeat: state.heartbeat,
        })
    }
}

struct MockWriter {
    state: Arc<Mutex<BrokerState>>,
    link: u64,
}

#[async_trait]
impl LinkWriter for MockWriter {
    async fn subscribe(&mut self, id: &str, topic: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.fail_subscribe.contains(topic) {
            return Err(TransportError::Protocol(format!("subscribe to {topic} rejected")));
        }
        state
            .link_mut(self.link)?
            .subscriptions
            .push((id.to_string(), topic.to_string()));
        state.subscribe_log.push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, id: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let link = state.link_mut(self.link)?;
        let Some(pos) = link.subscriptions.iter().position(|(sub, _)| sub == id) else {
            return Ok(());
        };
        let (_, topic) = link.subscriptions.remove(pos);
        state.unsubscribe_log.push(topic);
        Ok(())
    }

    async fn send(&mut self, destination: &str, body: &str) -> Result<(), TransportError> {
        let delay = self.state.lock().await.publish_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        state.link_mut(self.link)?;
        if state.fail_publish {
            return Err(TransportError::Closed);
        }
        state
            .published
            .push((destination.to_string(), body.to_string()));
        if state.echo && destination == topics::SEND_DESTINATION {
            state.echo_published(body);
        }
        Ok(())
    }

    async fn heartbeat(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.link_mut(self.link).map(|_| ())
    }

    async fn close(&mut self) {
        let mut state = self.state.lock().await;
        let link = self.link;
        state.links.retain(|l| l.id != link);
    }
}
