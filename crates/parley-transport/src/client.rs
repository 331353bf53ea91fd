// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection driver and its cloneable handle.
//!
//! A single driver task owns the link, the subscription registry and the
//! reconnect timer. Every state transition happens inside its select loop,
//! so connect, reconnect, probe and disconnect can never interleave.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parley_config::model::TransportConfig;
use parley_core::{CredentialProvider, Envelope};
use strum::Display;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::error::TransportError;
use crate::link::{Connector, Inbound, Link};
use crate::registry::{Callback, Registration, Routed, SubscriptionRegistry};
use crate::ws::StompConnector;

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 64;

/// Lifecycle of the single session connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect budget exhausted. Only an explicit `connect()` tries again.
    Unavailable,
    /// The compatibility probe failed. Terminal for the session.
    Unsupported,
}

impl ConnectionState {
    fn gauge_value(self) -> f64 {
        match self {
            ConnectionState::Disconnected => 0.0,
            ConnectionState::Connecting => 1.0,
            ConnectionState::Connected => 2.0,
            ConnectionState::Unavailable => 3.0,
            ConnectionState::Unsupported => 4.0,
        }
    }
}

/// Asynchronous lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connecting { attempt: u32 },
    Connected,
    Disconnected { reason: String },
    ReconnectScheduled { attempt: u32, delay: Duration },
    Unavailable { attempts: u32 },
    Unsupported { reason: String },
    Error { message: String },
}

enum Command {
    Connect,
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Subscribe {
        topic: String,
        callback: Callback,
        done: oneshot::Sender<()>,
    },
    Unsubscribe {
        topic: String,
        done: oneshot::Sender<()>,
    },
    Publish {
        destination: String,
        body: String,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Topics {
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Handle to the connection driver. Cheap to clone.
///
/// The driver stops when [`TransportClient::shutdown`] is called or when the
/// last handle is dropped.
#[derive(Clone)]
pub struct TransportClient {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<TransportEvent>,
    cancel: CancellationToken,
    publish_timeout: Duration,
    send_destination: String,
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("state", &*self.state.borrow())
            .field("send_destination", &self.send_destination)
            .finish_non_exhaustive()
    }
}

impl TransportClient {
    /// Spawn a driver using the STOMP-over-WebSocket connector.
    pub fn websocket(config: &TransportConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::spawn(config, Arc::new(StompConnector::new(config)), credentials)
    }

    /// Spawn a driver on the current runtime. Starts disconnected.
    pub fn spawn(
        config: &TransportConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cancel = CancellationToken::new();

        let driver = Driver {
            connector,
            credentials,
            policy: ReconnectPolicy::from_config(config),
            connect_timeout: config.connect_timeout(),
            heartbeat: config.heartbeat(),
            probe_required: config.probe,
            registry: SubscriptionRegistry::new(config.delivery_queue_capacity),
            state_tx,
            events: events.clone(),
            link: None,
            pending: None,
            reconnect_at: None,
            attempts: 0,
            last_inbound: Instant::now(),
        };
        tokio::spawn(driver.run(command_rx, cancel.clone()));

        Self {
            commands,
            state,
            events,
            cancel,
            publish_timeout: config.publish_timeout(),
            send_destination: config.send_destination.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for(&self, target: ConnectionState) -> Result<(), TransportError> {
        let mut rx = self.state.clone();
        rx.wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| TransportError::Shutdown)
    }

    pub fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Run `handler` for every lifecycle event until the driver stops.
    pub fn on_event<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(TransportEvent) + Send + 'static,
    {
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Start connecting. No-op while connecting or connected.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.state() == ConnectionState::Unsupported {
            return Err(TransportError::Unsupported(
                "compatibility probe failed earlier in this session".into(),
            ));
        }
        self.command(Command::Connect).await
    }

    /// Close the link and cancel any pending reconnect. Idempotent.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        let (done, rx) = oneshot::channel();
        self.command(Command::Disconnect { done }).await?;
        rx.await.map_err(|_| TransportError::Shutdown)
    }

    /// Register `callback` for `topic`, replacing any previous callback.
    pub async fn subscribe<F>(&self, topic: impl Into<String>, callback: F) -> Result<(), TransportError>
    where
        F: Fn(Envelope) + Send + Sync + 'static,
    {
        let (done, rx) = oneshot::channel();
        self.command(Command::Subscribe {
            topic: topic.into(),
            callback: Box::new(callback),
            done,
        })
        .await?;
        rx.await.map_err(|_| TransportError::Shutdown)
    }

    /// Drop the subscription for `topic`. Unknown topics are ignored.
    pub async fn unsubscribe(&self, topic: impl Into<String>) -> Result<(), TransportError> {
        let (done, rx) = oneshot::channel();
        self.command(Command::Unsubscribe {
            topic: topic.into(),
            done,
        })
        .await?;
        rx.await.map_err(|_| TransportError::Shutdown)
    }

    /// Registered topics in registration order.
    pub async fn topics(&self) -> Result<Vec<String>, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Topics { reply }).await?;
        rx.await.map_err(|_| TransportError::Shutdown)
    }

    /// Hand `envelope` to the broker for `destination`.
    ///
    /// Success only means the frame was written; delivery is confirmed by
    /// the echo on a subscribed topic.
    pub async fn publish(&self, destination: &str, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let body =
            serde_json::to_string(envelope).map_err(|e| TransportError::Protocol(e.to_string()))?;
        let (reply, rx) = oneshot::channel();
        let request = async {
            self.command(Command::Publish {
                destination: destination.to_string(),
                body,
                reply,
            })
            .await?;
            rx.await.map_err(|_| TransportError::Shutdown)?
        };
        match tokio::time::timeout(self.publish_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.publish_timeout)),
        }
    }

    /// Publish to the configured chat send destination.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.publish(&self.send_destination, envelope).await
    }

    pub fn send_destination(&self) -> &str {
        &self.send_destination
    }

    /// Stop the driver. The link is closed and all timers are cancelled.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn command(&self, command: Command) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TransportError::Shutdown)
    }
}

struct Attempt {
    probed: bool,
    result: Result<Link, TransportError>,
}

struct Driver {
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    heartbeat: Option<Duration>,
    probe_required: bool,
    registry: SubscriptionRegistry,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<TransportEvent>,
    link: Option<Link>,
    pending: Option<BoxFuture<'static, Attempt>>,
    reconnect_at: Option<Instant>,
    attempts: u32,
    last_inbound: Instant,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        let mut heartbeat = self.heartbeat.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let silence = self.silence_deadline();
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                attempt = next_attempt(&mut self.pending) => {
                    self.pending = None;
                    self.on_attempt(attempt).await;
                }
                inbound = next_inbound(&mut self.link) => self.on_inbound(inbound).await,
                _ = deadline(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.start_attempt();
                }
                _ = deadline(silence) => {
                    self.link_lost("no heart-beat from broker".into()).await;
                }
                _ = tick(&mut heartbeat), if self.link.is_some() => self.send_heartbeat().await,
            }
        }

        self.disconnect("client shut down").await;
        debug!("transport driver stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect { done } => {
                self.disconnect("client disconnect").await;
                let _ = done.send(());
            }
            Command::Subscribe {
                topic,
                callback,
                done,
            } => {
                let needs_remote = match self.registry.register(&topic, callback) {
                    Registration::Added => true,
                    Registration::Replaced { remote_live } => !remote_live,
                };
                if needs_remote && let Some(link) = self.link.as_mut() {
                    if let Err(e) = self.registry.activate(&topic, link.writer.as_mut()).await {
                        warn!(topic = %topic, error = %e, "remote subscribe failed");
                    }
                }
                let _ = done.send(());
            }
            Command::Unsubscribe { topic, done } => {
                if let Some(id) = self.registry.remove(&topic)
                    && let Some(link) = self.link.as_mut()
                    && let Err(e) = link.writer.unsubscribe(&id).await
                {
                    warn!(topic = %topic, error = %e, "remote unsubscribe failed");
                }
                let _ = done.send(());
            }
            Command::Publish {
                destination,
                body,
                reply,
            } => {
                // The caller timed out and has already taken another path.
                if reply.is_closed() {
                    debug!(destination = %destination, "publish abandoned by caller, not written");
                    return;
                }
                let Some(link) = self.link.as_mut() else {
                    let _ = reply.send(Err(TransportError::NotConnected));
                    return;
                };
                match link.writer.send(&destination, &body).await {
                    Ok(()) => {
                        debug!(destination = %destination, "published envelope");
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.clone()));
                        self.link_lost(format!("publish failed: {e}")).await;
                    }
                }
            }
            Command::Topics { reply } => {
                let _ = reply.send(self.registry.topics());
            }
        }
    }

    fn connect(&mut self) {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!("connect ignored, already {}", self.state());
            }
            ConnectionState::Unsupported => {
                self.emit(TransportEvent::Unsupported {
                    reason: "compatibility probe failed earlier in this session".into(),
                });
            }
            ConnectionState::Unavailable => {
                self.attempts = 0;
                self.start_attempt();
            }
            ConnectionState::Disconnected => {
                self.reconnect_at = None;
                self.start_attempt();
            }
        }
    }

    fn start_attempt(&mut self) {
        self.set_state(ConnectionState::Connecting);
        self.emit(TransportEvent::Connecting {
            attempt: self.attempts,
        });

        let connector = Arc::clone(&self.connector);
        let bearer = self.credentials.bearer_token();
        let probe = self.probe_required;
        let timeout = self.connect_timeout;
        self.pending = Some(Box::pin(async move {
            let mut probed = false;
            if probe {
                let result = tokio::time::timeout(timeout, connector.probe())
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Connect("probe timed out".into())));
                if let Err(e) = result {
                    return Attempt {
                        probed,
                        result: Err(e),
                    };
                }
                probed = true;
            }
            let result = tokio::time::timeout(timeout, connector.open(bearer))
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::Connect(format!("timed out after {timeout:?}")))
                });
            Attempt { probed, result }
        }));
    }

    async fn on_attempt(&mut self, attempt: Attempt) {
        if attempt.probed {
            self.probe_required = false;
        }
        match attempt.result {
            Ok(link) => {
                self.attempts = 0;
                self.last_inbound = Instant::now();
                self.link = Some(link);
                self.set_state(ConnectionState::Connected);
                info!(topics = self.registry.len(), "transport connected");
                if let Some(link) = self.link.as_mut() {
                    let failed = self.registry.replay(link.writer.as_mut()).await;
                    if failed > 0 {
                        warn!(failed, "some subscriptions were not restored");
                    }
                }
                self.emit(TransportEvent::Connected);
            }
            Err(TransportError::Unsupported(reason)) => {
                error!(reason = %reason, "realtime transport unsupported, staying on fallback");
                self.set_state(ConnectionState::Unsupported);
                self.emit(TransportEvent::Unsupported { reason });
            }
            Err(e) => {
                warn!(attempt = self.attempts, error = %e, "connect attempt failed");
                self.set_state(ConnectionState::Disconnected);
                self.emit(TransportEvent::Error {
                    message: e.to_string(),
                });
                self.schedule_reconnect();
            }
        }
    }

    async fn on_inbound(&mut self, inbound: Option<Inbound>) {
        if inbound.is_some() {
            self.last_inbound = Instant::now();
        }
        match inbound {
            Some(Inbound::Message {
                destination,
                subscription,
                body,
            }) => match self
                .registry
                .route(subscription.as_deref(), &destination, &body)
            {
                Routed::Queued => {}
                Routed::Dropped => {
                    metrics::counter!("parley_deliveries_dropped_total").increment(1);
                }
                Routed::Malformed => {
                    metrics::counter!("parley_deliveries_malformed_total").increment(1);
                }
                Routed::Unroutable => {}
            },
            Some(Inbound::Error(message)) => {
                warn!(message = %message, "broker sent ERROR frame");
                self.emit(TransportEvent::Error {
                    message: message.clone(),
                });
                self.link_lost(format!("broker error: {message}")).await;
            }
            Some(Inbound::Heartbeat) => {}
            None => self.link_lost("connection closed".into()).await,
        }
    }

    /// When the link counts as dead if the broker stays silent.
    fn silence_deadline(&self) -> Option<Instant> {
        let interval = self.link.as_ref()?.inbound_heartbeat?;
        Some(self.last_inbound + interval * 2)
    }

    async fn send_heartbeat(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if let Err(e) = link.writer.heartbeat().await {
            self.link_lost(format!("heartbeat failed: {e}")).await;
        }
    }

    async fn link_lost(&mut self, reason: String) {
        if let Some(mut link) = self.link.take() {
            link.writer.close().await;
        }
        self.registry.mark_all_stale();
        warn!(reason = %reason, "transport disconnected");
        self.set_state(ConnectionState::Disconnected);
        self.emit(TransportEvent::Disconnected { reason });
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.policy.exhausted(self.attempts) {
            error!(
                attempts = self.attempts,
                "reconnect attempts exhausted, realtime transport unavailable"
            );
            self.set_state(ConnectionState::Unavailable);
            self.emit(TransportEvent::Unavailable {
                attempts: self.attempts,
            });
            return;
        }
        self.attempts += 1;
        let delay = self.policy.delay(self.attempts);
        self.reconnect_at = Some(Instant::now() + delay);
        metrics::counter!("parley_reconnect_attempts_total").increment(1);
        info!(attempt = self.attempts, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.emit(TransportEvent::ReconnectScheduled {
            attempt: self.attempts,
            delay,
        });
    }

    async fn disconnect(&mut self, reason: &str) {
        self.reconnect_at = None;
        self.pending = None;
        self.attempts = 0;
        self.registry.mark_all_stale();
        if let Some(mut link) = self.link.take() {
            link.writer.close().await;
        }
        match self.state() {
            ConnectionState::Connected | ConnectionState::Connecting => {
                info!(reason, "transport disconnected");
                self.set_state(ConnectionState::Disconnected);
                self.emit(TransportEvent::Disconnected {
                    reason: reason.to_string(),
                });
            }
            ConnectionState::Unavailable => self.set_state(ConnectionState::Disconnected),
            ConnectionState::Disconnected | ConnectionState::Unsupported => {}
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        metrics::gauge!("parley_transport_state").set(state.gauge_value());
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

async fn next_attempt(pending: &mut Option<BoxFuture<'static, Attempt>>) -> Attempt {
    match pending {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

async fn next_inbound(link: &mut Option<Link>) -> Option<Inbound> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
