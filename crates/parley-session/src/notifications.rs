// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unread counter and editor-open flag.

use parley_core::{Envelope, EnvelopeKind, UserId};
use tokio::sync::watch;
use tracing::debug;

/// Snapshot of the notification state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Presence {
    pub unread: u64,
    pub editor_open: bool,
}

/// Session-wide unread counter.
///
/// Counts deliveries from other users that arrive while no messaging surface
/// is open. Opening one acknowledges everything. The counter is global, not
/// per conversation.
#[derive(Debug)]
pub struct Notifications {
    me: UserId,
    state: watch::Sender<Presence>,
}

impl Notifications {
    pub fn new(me: UserId) -> Self {
        let (state, _) = watch::channel(Presence::default());
        Self { me, state }
    }

    /// Count a post-dedup delivery. Returns whether the counter moved.
    pub fn record_delivery(&self, envelope: &Envelope) -> bool {
        if envelope.kind() != EnvelopeKind::Message || envelope.sender_id == self.me {
            return false;
        }
        let counted = self.state.send_if_modified(|p| {
            if p.editor_open {
                return false;
            }
            p.unread += 1;
            true
        });
        if counted {
            let unread = self.unread();
            parley_prometheus::set_unread(unread);
            debug!(unread, sender = %envelope.sender_id, "unread message counted");
        }
        counted
    }

    /// Mark the messaging surface open or closed. Opening resets the counter.
    pub fn set_editor_open(&self, open: bool) {
        self.state.send_modify(|p| {
            p.editor_open = open;
            if open {
                p.unread = 0;
            }
        });
        if open {
            parley_prometheus::set_unread(0);
        }
    }

    pub fn reset(&self) {
        self.state.send_modify(|p| p.unread = 0);
        parley_prometheus::set_unread(0);
    }

    pub fn unread(&self) -> u64 {
        self.state.borrow().unread
    }

    pub fn editor_open(&self) -> bool {
        self.state.borrow().editor_open
    }

    pub fn snapshot(&self) -> Presence {
        *self.state.borrow()
    }

    /// Observe changes to the counter and flag.
    pub fn watch(&self) -> watch::Receiver<Presence> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use parley_core::MessageId;

    use super::*;

    fn from(sender: i64) -> Envelope {
        Envelope::draft(UserId(sender), "hi").with_id(MessageId(1))
    }

    #[test]
    fn counts_foreign_messages_while_closed() {
        let n = Notifications::new(UserId(1));
        assert!(n.record_delivery(&from(2)));
        assert!(n.record_delivery(&from(3)));
        assert_eq!(n.unread(), 2);
    }

    #[test]
    fn own_messages_never_count() {
        let n = Notifications::new(UserId(1));
        assert!(!n.record_delivery(&from(1)));
        assert_eq!(n.unread(), 0);
    }

    #[test]
    fn opening_editor_resets_and_suppresses() {
        let n = Notifications::new(UserId(1));
        for _ in 0..7 {
            n.record_delivery(&from(2));
        }
        n.set_editor_open(true);
        assert_eq!(n.unread(), 0);
        assert!(!n.record_delivery(&from(2)));
        assert_eq!(n.unread(), 0);

        n.set_editor_open(false);
        assert!(n.record_delivery(&from(2)));
        assert_eq!(n.unread(), 1);
    }

    #[test]
    fn control_events_are_not_counted() {
        let n = Notifications::new(UserId(1));
        let delete = Envelope::deletion(UserId(2), MessageId(5));
        assert!(!n.record_delivery(&delete));
    }

    #[test]
    fn watchers_see_updates() {
        let n = Notifications::new(UserId(1));
        let rx = n.watch();
        n.record_delivery(&from(2));
        assert_eq!(rx.borrow().unread, 1);
        n.set_editor_open(true);
        assert_eq!(
            *rx.borrow(),
            Presence {
                unread: 0,
                editor_open: true
            }
        );
    }

    #[test]
    fn reset_keeps_editor_flag() {
        let n = Notifications::new(UserId(1));
        n.record_delivery(&from(2));
        n.reset();
        assert_eq!(n.snapshot(), Presence::default());
    }
}
