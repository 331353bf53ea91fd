// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley history` and `parley delete`: REST-only commands.

use parley_core::{ConversationId, ConversationSummary, FallbackService, MessageId, ParleyError};
use parley_session::ConversationTarget;

use crate::app::{App, format_envelope};

/// Print a conversation's messages, or the conversation list without a target.
pub async fn run_history(app: &App, target: Option<ConversationTarget>) -> Result<(), ParleyError> {
    let me = app.me()?;
    let Some(target) = target else {
        let conversations = app.fallback.conversations(me).await?;
        if conversations.is_empty() {
            println!("no conversations");
        }
        for summary in &conversations {
            println!("{}", format_summary(summary));
        }
        return Ok(());
    };

    let messages = match target {
        ConversationTarget::Conversation { id, .. } => app.fallback.conversation_messages(id).await?,
        ConversationTarget::Direct { peer } => app.fallback.messages_between(me, peer).await?,
    };
    if messages.is_empty() {
        println!("no messages");
    }
    for envelope in &messages {
        println!("{}", format_envelope(envelope));
    }
    Ok(())
}

pub async fn run_delete_message(app: &App, id: i64) -> Result<(), ParleyError> {
    let confirmation = app.fallback.delete_message(MessageId(id)).await?;
    println!("{confirmation}");
    Ok(())
}

pub async fn run_delete_conversation(app: &App, id: i64) -> Result<(), ParleyError> {
    let confirmation = app.fallback.delete_conversation(ConversationId(id)).await?;
    println!("{confirmation}");
    Ok(())
}

fn format_summary(summary: &ConversationSummary) -> String {
    format!(
        "conversation {} with {} (user {}): {}",
        summary.id,
        summary.receiver_name,
        summary.receiver_id,
        summary.last_message.as_deref().unwrap_or("")
    )
}
