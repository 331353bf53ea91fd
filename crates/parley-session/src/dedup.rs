// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery deduplication.
//!
//! The same logical message can reach a view several times: the broker echo,
//! a fallback response, a history load, or a replay after reconnect. [`DeliveryRecord`] keeps a bounded window of what
//! was already accepted and rejects anything it has seen.
//!
//! Precedence:
//! 1. Both envelopes carry a server id and the ids are equal.
//! 2. Otherwise, sender, content and media are equal with timestamps no
//!    further apart than the tolerance. This also catches one send stored
//!    twice under two server ids.
//! 3. Otherwise the envelope is novel and is appended, evicting the oldest
//!    entry when the window is full.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parley_config::model::DedupConfig;
use parley_core::{Envelope, MessageId};

/// Bounded window of recently accepted envelopes.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    entries: VecDeque<Envelope>,
    capacity: usize,
    tolerance: chrono::Duration,
}

impl DeliveryRecord {
    pub fn new(capacity: usize, tolerance: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            tolerance: chrono::Duration::from_std(tolerance).unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.window_size, config.tolerance())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.entries.iter()
    }

    /// Whether `incoming` matches something already accepted.
    pub fn is_duplicate(&self, incoming: &Envelope) -> bool {
        let stamp = incoming.timestamp.unwrap_or_else(Utc::now);
        self.entries
            .iter()
            .any(|seen| self.matches(seen, incoming, stamp))
    }

    /// Accept `incoming` unless it is a duplicate.
    ///
    /// Returns the accepted envelope, stamped with the current time if it
    /// arrived without a timestamp, or `None` for a duplicate.
    pub fn accept(&mut self, mut incoming: Envelope) -> Option<Envelope> {
        let stamp = incoming.timestamp.unwrap_or_else(Utc::now);
        if self
            .entries
            .iter()
            .any(|seen| self.matches(seen, &incoming, stamp))
        {
            return None;
        }
        incoming.timestamp = Some(stamp);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(incoming.clone());
        Some(incoming)
    }

    /// Forget a deleted message so a later re-send is not suppressed.
    pub fn forget(&mut self, id: MessageId) {
        self.entries.retain(|e| e.id != Some(id));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn matches(&self, seen: &Envelope, incoming: &Envelope, stamp: DateTime<Utc>) -> bool {
        if let (Some(a), Some(b)) = (seen.id, incoming.id)
            && a == b
        {
            return true;
        }
        seen.sender_id == incoming.sender_id
            && seen.content == incoming.content
            && seen.media_urls == incoming.media_urls
            && seen
                .timestamp
                .is_some_and(|t| (t - stamp).abs() <= self.tolerance)
    }
}
