// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session, view and dispatcher behaviour against the in-memory broker and
//! fallback service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_core::{ConversationId, Envelope, FallbackService, MessageId, UserId, topics};
use parley_session::{ConversationView, MessagingSession, SendError, SendOutcome};
use parley_test_utils::{TestHarness, TestHarnessBuilder};
use tokio::sync::watch;

const ME: UserId = UserId(1);
const PEER: UserId = UserId(2);
const CONVERSATION: ConversationId = ConversationId(7);

async fn start(harness: &TestHarness) -> MessagingSession {
    let fallback: Arc<dyn FallbackService> = harness.fallback.clone();
    MessagingSession::start(
        ME,
        harness.transport.clone(),
        fallback,
        harness.config.dedup.clone(),
    )
    .await
    .unwrap()
}

async fn connected(builder: TestHarnessBuilder) -> (TestHarness, MessagingSession) {
    let harness = builder.build().await;
    let session = start(&harness).await;
    harness.connect().await.unwrap();
    settle().await;
    (harness, session)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn until<T: Clone>(rx: &watch::Receiver<T>, check: impl FnMut(&T) -> bool) -> T {
    let mut rx = rx.clone();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(check))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed")
        .clone()
}

async fn visible(view: &ConversationView, count: usize) -> Vec<Envelope> {
    until(&view.watch(), |m| m.len() >= count).await
}

#[tokio::test(start_paused = true)]
async fn send_while_disconnected_uses_fallback_response() {
    let harness = TestHarness::new().await;
    let session = start(&harness).await;
    let view = session
        .open_conversation(CONVERSATION, Some(PEER))
        .await
        .unwrap();

    let outcome = view.send_text("offline hello").await.unwrap();
    let SendOutcome::Fallback(stored) = outcome else {
        panic!("expected fallback delivery");
    };
    assert_eq!(stored.id, Some(MessageId(1001)));
    assert_eq!(stored.conversation_id, Some(CONVERSATION));

    let messages = visible(&view, 1).await;
    assert_eq!(messages, vec![stored]);
    assert_eq!(harness.broker.published_count().await, 0);
    assert_eq!(harness.fallback.sent_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn connection_drop_mid_send_yields_one_fallback_confirmation() {
    let (harness, session) = connected(TestHarness::builder().with_echo()).await;
    let view = session
        .open_conversation(CONVERSATION, Some(PEER))
        .await
        .unwrap();
    harness.broker.fail_publishes(true).await;

    let outcome = view.send_text("are you there").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Fallback(_)));

    // Let the transport reconnect and any stray echo arrive.
    harness.broker.fail_publishes(false).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let messages = view.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, Some(MessageId(1001)));
    assert_eq!(harness.fallback.sent_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn realtime_send_appears_once_through_its_echo() {
    let (harness, session) = connected(TestHarness::builder().with_echo()).await;
    let view = session
        .open_conversation(CONVERSATION, Some(PEER))
        .await
        .unwrap();

    let outcome = view.send_text("on my way").await.unwrap();
    assert_eq!(outcome, SendOutcome::Realtime);

    let messages = until(&view.watch(), |m| m.len() == 1 && m[0].id.is_some()).await;
    assert_eq!(messages[0].content.as_deref(), Some("on my way"));
    assert_eq!(messages[0].id, Some(MessageId(1)));

    settle().await;
    assert_eq!(view.messages().len(), 1);
    assert_eq!(harness.fallback.sent_count().await, 0);
    // Own messages never count as unread.
    assert_eq!(session.notifications().unread(), 0);
}

#[tokio::test(start_paused = true)]
async fn realtime_send_without_echo_is_not_shown() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let view = session
        .open_conversation(CONVERSATION, Some(PEER))
        .await
        .unwrap();

    let outcome = view.send_text("never stored").await.unwrap();
    assert_eq!(outcome, SendOutcome::Realtime);

    settle().await;
    assert!(view.messages().is_empty());
    assert_eq!(harness.broker.published_count().await, 1);
    assert_eq!(harness.fallback.sent_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn lost_publish_acknowledgment_yields_one_copy_per_send() {
    let (harness, session) = connected(TestHarness::builder().with_echo()).await;
    let view = session
        .open_conversation(CONVERSATION, Some(PEER))
        .await
        .unwrap();
    settle().await;
    // Writes outlast the 500 ms publish timeout.
    harness
        .broker
        .delay_publishes(Some(Duration::from_secs(2)))
        .await;

    let (first, second) = tokio::join!(view.send_text("first"), view.send_text("second"));
    assert!(matches!(first.unwrap(), SendOutcome::Fallback(_)));
    assert!(matches!(second.unwrap(), SendOutcome::Fallback(_)));

    // The slow write completes and is echoed; the queued one is never written.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.broker.published_count().await, 1);
    assert_eq!(harness.fallback.sent_count().await, 2);

    let mut contents: Vec<_> = view
        .messages()
        .into_iter()
        .filter_map(|m| m.content)
        .collect();
    contents.sort();
    assert_eq!(contents, ["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn rapid_duplicate_deliveries_leave_two_visible() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let view = session.open_conversation(CONVERSATION, None).await.unwrap();
    settle().await;

    let topic = topics::conversation(CONVERSATION);
    harness.broker.deliver_text(&topic, 1, 2, "first").await;
    harness.broker.deliver_text(&topic, 1, 2, "first").await;
    harness.broker.deliver_text(&topic, 2, 2, "second").await;

    visible(&view, 2).await;
    settle().await;
    let ids: Vec<_> = view.messages().iter().filter_map(|m| m.id).collect();
    assert_eq!(ids, vec![MessageId(1), MessageId(2)]);
}

#[tokio::test(start_paused = true)]
async fn personal_deliveries_count_until_editor_opens() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let presence = session.notifications().watch();
    let personal = topics::personal(ME);

    harness.broker.deliver_text(&personal, 5, 2, "hey").await;
    harness.broker.deliver_text(&personal, 5, 2, "hey").await;
    harness.broker.deliver_text(&personal, 6, 3, "yo").await;
    until(&presence, |p| p.unread == 2).await;
    settle().await;
    assert_eq!(session.notifications().unread(), 2);

    let view = session.open_direct(PEER).await.unwrap();
    assert_eq!(session.notifications().unread(), 0);
    assert!(session.notifications().editor_open());

    harness.broker.deliver_text(&personal, 7, 2, "while open").await;
    settle().await;
    assert_eq!(session.notifications().unread(), 0);

    view.close().await;
    assert!(!session.notifications().editor_open());
    harness.broker.deliver_text(&personal, 8, 2, "after close").await;
    until(&presence, |p| p.unread == 1).await;
}

#[tokio::test(start_paused = true)]
async fn own_personal_deliveries_are_not_unread() {
    let (harness, session) = connected(TestHarness::builder()).await;
    harness
        .broker
        .deliver_text(&topics::personal(ME), 9, ME.0, "note to self")
        .await;
    settle().await;
    assert_eq!(session.notifications().unread(), 0);
}

#[tokio::test(start_paused = true)]
async fn delete_event_removes_message() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let view = session.open_conversation(CONVERSATION, None).await.unwrap();
    settle().await;

    let topic = topics::conversation(CONVERSATION);
    harness.broker.deliver_text(&topic, 3, 2, "oops").await;
    harness.broker.deliver_text(&topic, 4, 2, "kept").await;
    visible(&view, 2).await;

    harness
        .broker
        .deliver(&topic, &Envelope::deletion(PEER, MessageId(3)))
        .await;
    let messages = until(&view.watch(), |m| m.len() == 1).await;
    assert_eq!(messages[0].id, Some(MessageId(4)));
}

#[tokio::test(start_paused = true)]
async fn local_delete_goes_through_fallback() {
    let harness = TestHarness::new().await;
    harness
        .fallback
        .seed_conversation(
            CONVERSATION,
            vec![Envelope::draft(PEER, "old").with_id(MessageId(11))],
        )
        .await;
    let session = start(&harness).await;
    let view = session.open_conversation(CONVERSATION, None).await.unwrap();
    visible(&view, 1).await;

    view.delete(MessageId(11)).await.unwrap();
    until(&view.watch(), |m| m.is_empty()).await;
    assert_eq!(harness.fallback.deleted().await, vec![MessageId(11)]);
}

#[tokio::test(start_paused = true)]
async fn history_seeds_the_delivery_record() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let earlier = Utc::now() - chrono::Duration::minutes(5);
    harness
        .fallback
        .seed_conversation(
            CONVERSATION,
            vec![
                Envelope::draft(PEER, "second")
                    .with_id(MessageId(12))
                    .at(earlier + chrono::Duration::seconds(1)),
                Envelope::draft(PEER, "first")
                    .with_id(MessageId(11))
                    .at(earlier),
            ],
        )
        .await;
    let view = session.open_conversation(CONVERSATION, None).await.unwrap();
    let messages = visible(&view, 2).await;
    let ids: Vec<_> = messages.iter().filter_map(|m| m.id).collect();
    assert_eq!(ids, vec![MessageId(11), MessageId(12)]);

    let topic = topics::conversation(CONVERSATION);
    harness.broker.deliver_text(&topic, 12, 2, "second").await;
    settle().await;
    assert_eq!(view.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_history_load_still_opens_view() {
    let (harness, session) = connected(TestHarness::builder()).await;
    harness.fallback.fail_with("history unavailable", Some(503)).await;

    let view = session.open_direct(PEER).await.unwrap();
    settle().await;
    harness
        .broker
        .deliver_text(&topics::direct(PEER, ME), 20, 2, "live")
        .await;
    visible(&view, 1).await;
}

#[tokio::test(start_paused = true)]
async fn direct_view_listens_both_ways() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let view = session.open_direct(PEER).await.unwrap();
    settle().await;

    let active = harness.broker.active_topics().await;
    assert!(active.contains(&topics::direct(ME, PEER)));
    assert!(active.contains(&topics::direct(PEER, ME)));

    harness
        .broker
        .deliver_text(&topics::direct(ME, PEER), 30, 1, "mine")
        .await;
    harness
        .broker
        .deliver_text(&topics::direct(PEER, ME), 31, 2, "theirs")
        .await;
    visible(&view, 2).await;
}

#[tokio::test(start_paused = true)]
async fn closing_a_view_unsubscribes_its_topics() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let view = session.open_conversation(CONVERSATION, None).await.unwrap();
    settle().await;

    view.close().await;
    settle().await;

    let topic = topics::conversation(CONVERSATION);
    assert_eq!(harness.broker.unsubscribe_log().await, vec![topic.clone()]);
    assert!(!harness.broker.active_topics().await.contains(&topic));
    assert!(!session.notifications().editor_open());
}

#[tokio::test(start_paused = true)]
async fn conversation_updates_are_counted() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let updates = session.conversation_updates();

    let topic = topics::conversation_updates(ME);
    harness
        .broker
        .deliver_raw(&topic, r#"{"id":7,"receiverId":2,"receiverName":"Bao"}"#)
        .await;
    harness
        .broker
        .deliver_raw(&topic, r#"{"id":8,"receiverId":3,"receiverName":"Chi"}"#)
        .await;
    until(&updates, |n| *n == 2).await;
}

#[tokio::test(start_paused = true)]
async fn fallback_failure_is_reported_once() {
    let harness = TestHarness::new().await;
    let session = start(&harness).await;
    harness.fallback.fail_with("service down", Some(500)).await;

    let draft = Envelope::draft(ME, "lost").in_conversation(CONVERSATION);
    let err = session.dispatcher().send(&draft).await.unwrap_err();
    assert!(matches!(err, SendError::Fallback(_)));
    assert_eq!(harness.fallback.sent_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn empty_message_is_rejected_before_delivery() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let err = session
        .dispatcher()
        .send(&Envelope::draft(ME, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Invalid(_)));
    assert_eq!(harness.broker.published_count().await, 0);
    assert_eq!(harness.fallback.sent_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn subscriptions_survive_reconnect() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let view = session.open_conversation(CONVERSATION, None).await.unwrap();
    settle().await;

    harness.broker.drop_connection().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(session.transport().is_connected());

    harness
        .broker
        .deliver_text(&topics::conversation(CONVERSATION), 40, 2, "back")
        .await;
    visible(&view, 1).await;
}

#[tokio::test(start_paused = true)]
async fn logout_tears_down_the_connection() {
    let (harness, session) = connected(TestHarness::builder()).await;
    let transport = session.transport().clone();

    session.logout().await;
    settle().await;

    assert!(!transport.is_connected());
    assert!(!harness.broker.is_connected().await);
    let unsubscribed = harness.broker.unsubscribe_log().await;
    assert!(unsubscribed.contains(&topics::personal(ME)));
    assert!(unsubscribed.contains(&topics::conversation_updates(ME)));
}
