// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! STOMP over WebSocket connector backed by tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parley_config::model::TransportConfig;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::link::{Connector, Inbound, Link, LinkWriter};
use crate::stomp::{Frame, StompCommand, inbound_heartbeat, parse_frames};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a STOMP broker over a raw WebSocket.
#[derive(Debug, Clone)]
pub struct StompConnector {
    endpoint: String,
    host: String,
    heartbeat: Option<Duration>,
    connect_timeout: Duration,
    inbound_capacity: usize,
}

impl StompConnector {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            host: host_of(&config.endpoint),
            endpoint: config.endpoint.clone(),
            heartbeat: config.heartbeat(),
            connect_timeout: config.connect_timeout(),
            inbound_capacity: config.delivery_queue_capacity.max(1) * 4,
        }
    }

    async fn dial(&self) -> Result<Socket, TransportError> {
        match tokio::time::timeout(self.connect_timeout, connect_async(self.endpoint.as_str())).await
        {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(err)) => Err(classify(err)),
            Err(_) => Err(TransportError::Connect(format!(
                "timed out after {:?} connecting to {}",
                self.connect_timeout, self.endpoint
            ))),
        }
    }
}

#[async_trait]
impl Connector for StompConnector {
    async fn probe(&self) -> Result<(), TransportError> {
        let mut socket = self.dial().await?;
        // Only the upgrade matters; a failed close is irrelevant.
        let _ = socket.close(None).await;
        debug!(endpoint = %self.endpoint, "transport probe succeeded");
        Ok(())
    }

    async fn open(&self, bearer: Option<SecretString>) -> Result<Link, TransportError> {
        let socket = self.dial().await?;
        let (mut sink, mut stream) = socket.split();

        let heartbeat_ms = self.heartbeat.map(|d| d.as_millis() as u64).unwrap_or(0);
        let connect = Frame::connect(
            &self.host,
            heartbeat_ms,
            bearer.as_ref().map(|t| t.expose_secret()),
        );
        sink.send(Message::Text(connect.encode().into()))
            .await
            .map_err(|e| TransportError::Connect(format!("failed to send CONNECT: {e}")))?;

        let server_heartbeat =
            match tokio::time::timeout(self.connect_timeout, await_connected(&mut stream)).await {
                Ok(Ok(server_heartbeat)) => server_heartbeat,
                Ok(Err(err)) => {
                    let _ = sink.close().await;
                    return Err(err);
                }
                Err(_) => {
                    let _ = sink.close().await;
                    return Err(TransportError::Connect(format!(
                        "no CONNECTED frame within {:?}",
                        self.connect_timeout
                    )));
                }
            };
        let negotiated = inbound_heartbeat(heartbeat_ms, server_heartbeat.as_deref());
        debug!(inbound = ?negotiated, "heart-beats negotiated");

        let (tx, rx) = mpsc::channel(self.inbound_capacity);
        let reader = tokio::spawn(read_loop(stream, tx));
        Ok(Link {
            writer: Box::new(StompWriter { sink, reader }),
            inbound: rx,
            inbound_heartbeat: negotiated,
        })
    }
}

/// Wait for the broker to accept the CONNECT frame.
///
/// Returns the CONNECTED frame's `heart-beat` header.
async fn await_connected(
    stream: &mut SplitStream<Socket>,
) -> Result<Option<String>, TransportError> {
    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| TransportError::Connect(e.to_string()))?;
        let Some(text) = message_text(&message) else {
            if matches!(message, Message::Close(_)) {
                return Err(TransportError::Closed);
            }
            continue;
        };
        for frame in parse_frames(&text)? {
            match frame.command {
                StompCommand::Connected => {
                    debug!(version = ?frame.get("version"), "STOMP session established");
                    return Ok(frame.get("heart-beat").map(str::to_string));
                }
                StompCommand::Error => {
                    let reason = frame.get("message").unwrap_or(&frame.body).to_string();
                    return Err(TransportError::Rejected(reason));
                }
                other => debug!(command = %other, "ignoring frame before CONNECTED"),
            }
        }
    }
    Err(TransportError::Closed)
}

/// Forward broker frames into the link's inbound channel until the socket ends.
async fn read_loop(mut stream: SplitStream<Socket>, tx: mpsc::Sender<Inbound>) {
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "websocket receive failed");
                break;
            }
        };
        if matches!(message, Message::Close(_)) {
            debug!("broker closed the websocket");
            break;
        }
        let Some(text) = message_text(&message) else {
            continue;
        };
        let frames = match parse_frames(&text) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "dropping unparseable STOMP payload");
                continue;
            }
        };
        if frames.is_empty() {
            if tx.send(Inbound::Heartbeat).await.is_err() {
                return;
            }
            continue;
        }
        for frame in frames {
            let inbound = match frame.command {
                StompCommand::Message => Inbound::Message {
                    destination: frame.get("destination").unwrap_or_default().to_string(),
                    subscription: frame.get("subscription").map(str::to_string),
                    body: frame.body,
                },
                StompCommand::Error => {
                    Inbound::Error(frame.get("message").unwrap_or(&frame.body).to_string())
                }
                other => {
                    debug!(command = %other, "ignoring frame");
                    continue;
                }
            };
            if tx.send(inbound).await.is_err() {
                return;
            }
        }
    }
}

fn message_text(message: &Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.as_str().to_string()),
        Message::Binary(data) => std::str::from_utf8(data).ok().map(str::to_string),
        _ => None,
    }
}

struct StompWriter {
    sink: SplitSink<Socket, Message>,
    reader: JoinHandle<()>,
}

impl StompWriter {
    async fn write(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(frame.encode().into()))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
                other => TransportError::Protocol(other.to_string()),
            })
    }
}

#[async_trait]
impl LinkWriter for StompWriter {
    async fn subscribe(&mut self, id: &str, topic: &str) -> Result<(), TransportError> {
        self.write(Frame::subscribe(id, topic)).await
    }

    async fn unsubscribe(&mut self, id: &str) -> Result<(), TransportError> {
        self.write(Frame::unsubscribe(id)).await
    }

    async fn send(&mut self, destination: &str, body: &str) -> Result<(), TransportError> {
        self.write(Frame::send(destination, body)).await
    }

    async fn heartbeat(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text("\n".into()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {
        let _ = self.write(Frame::disconnect()).await;
        let _ = self.sink.close().await;
        self.reader.abort();
    }
}

impl Drop for StompWriter {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Sort handshake failures into "this environment cannot do it" and
/// "try again later".
fn classify(err: WsError) -> TransportError {
    match err {
        WsError::Url(e) => TransportError::Unsupported(format!("invalid endpoint: {e}")),
        WsError::Http(response) => TransportError::Unsupported(format!(
            "endpoint refused the websocket upgrade (HTTP {})",
            response.status()
        )),
        WsError::HttpFormat(e) => TransportError::Unsupported(format!("bad upgrade request: {e}")),
        other => TransportError::Connect(other.to_string()),
    }
}

/// Host component of a ws(s) URL, used for the STOMP `host` header.
fn host_of(endpoint: &str) -> String {
    let without_scheme = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    let host = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    if host.starts_with('[') {
        return host
            .split_once(']')
            .map(|(h, _)| format!("{h}]"))
            .unwrap_or_else(|| host.to_string());
    }
    host.split(':').next().unwrap_or(host).to_string()
}
