// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley listen`: stay connected and print what arrives.
//!
//! With a target, a conversation view is opened and its messages are
//! printed as they become visible. Without one, only the unread counter and
//! conversation-list notices are shown.

use parley_core::{Envelope, ParleyError};
use parley_session::ConversationTarget;
use parley_transport::TransportEvent;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::{App, format_envelope};

pub async fn run_listen(
    app: &App,
    target: Option<ConversationTarget>,
    cancel: CancellationToken,
) -> Result<(), ParleyError> {
    let session = app.session().await?;

    let lifecycle = session.transport().on_event(|event| match event {
        TransportEvent::Unavailable { attempts } => {
            error!(attempts, "realtime transport unavailable, sends will use the fallback service");
        }
        TransportEvent::Unsupported { reason } => {
            error!(%reason, "realtime transport unsupported, sends will use the fallback service");
        }
        TransportEvent::Error { message } => warn!(%message, "transport error"),
        other => info!(event = ?other, "transport event"),
    });

    if let Err(e) = session.connect().await {
        warn!(error = %e, "could not start realtime transport");
    }

    let view = match target {
        Some(target) => Some(session.open(target).await?),
        None => None,
    };
    let mut messages = view.as_ref().map(|v| v.watch());
    let mut presence = session.notifications().watch();
    let mut updates = session.conversation_updates();
    let mut shown = 0;

    println!("listening, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = presence.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = *presence.borrow_and_update();
                if !now.editor_open && now.unread > 0 {
                    println!("unread messages: {}", now.unread);
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                updates.borrow_and_update();
                println!("conversation list changed");
            }
            visible = next_snapshot(&mut messages) => {
                let Some(visible) = visible else {
                    break;
                };
                shown = print_new(&visible, shown);
            }
        }
    }

    info!("shutting down listener");
    if let Some(view) = view {
        view.close().await;
    }
    session.logout().await;
    lifecycle.abort();
    Ok(())
}

/// Next snapshot of the visible list; pends forever without a view.
async fn next_snapshot(rx: &mut Option<watch::Receiver<Vec<Envelope>>>) -> Option<Vec<Envelope>> {
    match rx {
        Some(rx) => {
            rx.changed().await.ok()?;
            Some(rx.borrow_and_update().clone())
        }
        None => std::future::pending().await,
    }
}

/// Print entries past `shown`. Returns the new watermark.
fn print_new(visible: &[Envelope], shown: usize) -> usize {
    if visible.len() < shown {
        println!("({} message(s) removed)", shown - visible.len());
        return visible.len();
    }
    for envelope in &visible[shown..] {
        println!("{}", format_envelope(envelope));
    }
    visible.len()
}
