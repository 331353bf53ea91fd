// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal STOMP 1.2 frame codec.
//!
//! Frames travel as WebSocket text messages. A message may carry several
//! frames back to back, and a lone end-of-line is a broker heart-beat.

use std::str::FromStr;
use std::time::Duration;

use strum::{Display, EnumString};

use crate::error::TransportError;

/// STOMP commands the client sends or expects to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum StompCommand {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `name`. Repeated headers keep the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame carrying the negotiated heart-beat and an optional bearer token.
    pub fn connect(host: &str, heartbeat_ms: u64, bearer: Option<&str>) -> Self {
        let mut frame = Frame::new(StompCommand::Connect)
            .header("accept-version", "1.2,1.1")
            .header("host", host)
            .header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"));
        if let Some(token) = bearer {
            frame = frame.header("Authorization", format!("Bearer {token}"));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(StompCommand::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, json: &str) -> Self {
        Frame::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", json.len().to_string())
            .body(json)
    }

    pub fn disconnect() -> Self {
        Frame::new(StompCommand::Disconnect)
    }

    /// Serialize to the text representation, including the trailing NUL.
    pub fn encode(&self) -> String {
        // CONNECT and CONNECTED headers are never escaped.
        let escape_headers = !matches!(
            self.command,
            StompCommand::Connect | StompCommand::Connected
        );
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(&self.command.to_string());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape_headers {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Parse every frame contained in one transport message.
///
/// Returns an empty vector for pure heart-beats.
pub fn parse_frames(input: &str) -> Result<Vec<Frame>, TransportError> {
    let mut frames = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches(['\n', '\r']);
        if rest.is_empty() {
            break;
        }
        let (frame, remaining) = parse_one(rest)?;
        frames.push(frame);
        rest = remaining;
    }
    Ok(frames)
}

/// Interval at which the broker promised to send heart-beats.
///
/// `requested_ms` is what we asked for in CONNECT and `header` is the
/// CONNECTED frame's `heart-beat` value (`sx,sy`). Either side being zero
/// disables inbound heart-beats; otherwise the slower of the two applies.
pub fn inbound_heartbeat(requested_ms: u64, header: Option<&str>) -> Option<Duration> {
    let server_ms = header
        .and_then(|h| h.split(',').next())
        .and_then(|sx| sx.trim().parse::<u64>().ok())
        .unwrap_or(0);
    if requested_ms == 0 || server_ms == 0 {
        return None;
    }
    Some(Duration::from_millis(requested_ms.max(server_ms)))
}

/// Split at the first blank line. Each EOL may carry an optional CR.
fn split_head(input: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in input.split_inclusive('\n') {
        if !line.ends_with('\n') {
            return None;
        }
        if offset > 0 && (line == "\n" || line == "\r\n") {
            return Some((&input[..offset], &input[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_one(input: &str) -> Result<(Frame, &str), TransportError> {
    let (head, after_head) = split_head(input)
        .ok_or_else(|| TransportError::Protocol("frame missing header terminator".into()))?;

    let mut lines = head.lines();
    let command_line = lines
        .next()
        .map(|l| l.trim_end_matches('\r'))
        .unwrap_or_default();
    let command = StompCommand::from_str(command_line)
        .map_err(|_| TransportError::Protocol(format!("unknown STOMP command '{command_line}'")))?;
    let unescape_headers = !matches!(command, StompCommand::Connect | StompCommand::Connected);

    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| TransportError::Protocol(format!("malformed header '{line}'")))?;
        if unescape_headers {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let mut frame = Frame {
        command,
        headers,
        body: String::new(),
    };

    let content_length = frame
        .get("content-length")
        .and_then(|v| v.trim().parse::<usize>().ok());

    let (body, remaining) = match content_length {
        Some(len) if after_head.len() > len && after_head.is_char_boundary(len) => {
            let (body, tail) = after_head.split_at(len);
            let tail = tail
                .strip_prefix('\0')
                .ok_or_else(|| TransportError::Protocol("body exceeds content-length".into()))?;
            (body, tail)
        }
        Some(_) => {
            return Err(TransportError::Protocol(
                "frame shorter than content-length".into(),
            ));
        }
        None => after_head
            .split_once('\0')
            .ok_or_else(|| TransportError::Protocol("frame missing NUL terminator".into()))?,
    };
    frame.body = body.to_string();
    Ok((frame, remaining))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, TransportError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(TransportError::Protocol(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}
