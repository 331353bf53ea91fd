// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley send`: deliver one message, realtime first.

use parley_core::ParleyError;
use parley_session::{ConversationTarget, SendOutcome};
use parley_transport::ConnectionState;
use tracing::{debug, warn};

use crate::app::{App, format_envelope};

pub async fn run_send(app: &App, target: ConversationTarget, text: String) -> Result<(), ParleyError> {
    let session = app.session().await?;
    let me = session.me();

    // Give the realtime path one connection window; the dispatcher reads the
    // state fresh and falls back on its own if the link is not up.
    if let Err(e) = session.connect().await {
        warn!(error = %e, "realtime transport unavailable");
    } else {
        let timeout = app.config.transport.connect_timeout();
        let connected = tokio::time::timeout(
            timeout,
            session.transport().wait_for(ConnectionState::Connected),
        )
        .await;
        debug!(connected = matches!(connected, Ok(Ok(()))), "connection window closed");
    }

    let result = session.dispatcher().send(&target.draft(me, text)).await;
    session.logout().await;

    match result? {
        SendOutcome::Realtime => println!("sent via realtime broker"),
        SendOutcome::Fallback(stored) => {
            println!("sent via fallback service");
            println!("{}", format_envelope(&stored));
        }
    }
    Ok(())
}
