// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport client behaviour against the in-memory broker.

use std::time::Duration;

use parley_core::{Envelope, MessageId, UserId};
use parley_test_utils::TestHarness;
use parley_transport::{ConnectionState, TransportError, TransportEvent};
use tokio::sync::{broadcast, mpsc};

const TOPIC: &str = "/topic/messages/7";

async fn next_event(
    events: &mut broadcast::Receiver<TransportEvent>,
    matches: impl Fn(&TransportEvent) -> bool,
) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn channel_callback() -> (
    impl Fn(Envelope) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Envelope>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |e| drop(tx.send(e)), rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("callback channel closed")
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent() {
    let harness = TestHarness::new().await;
    harness.connect().await.unwrap();
    harness.transport.connect().await.unwrap();
    harness.transport.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.broker.open_count().await, 1);
    assert_eq!(harness.broker.probe_count().await, 1);
    assert!(harness.transport.is_connected());
}

#[tokio::test(start_paused = true)]
async fn second_subscribe_replaces_callback_without_new_remote_subscription() {
    let harness = TestHarness::new().await;
    harness.connect().await.unwrap();

    let (cb1, mut rx1) = channel_callback();
    let (cb2, mut rx2) = channel_callback();
    harness.transport.subscribe(TOPIC, cb1).await.unwrap();
    harness.transport.subscribe(TOPIC, cb2).await.unwrap();

    assert_eq!(harness.broker.subscribe_log().await, vec![TOPIC.to_string()]);
    assert_eq!(harness.transport.topics().await.unwrap(), vec![TOPIC.to_string()]);

    assert_eq!(harness.broker.deliver_text(TOPIC, 1, 2, "hello").await, 1);
    let delivered = recv(&mut rx2).await;
    assert_eq!(delivered.id, Some(MessageId(1)));
    assert!(rx1.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn subscriptions_registered_offline_are_issued_on_connect() {
    let harness = TestHarness::new().await;
    let (cb, mut rx) = channel_callback();
    harness.transport.subscribe(TOPIC, cb).await.unwrap();
    assert!(harness.broker.subscribe_log().await.is_empty());

    harness.connect().await.unwrap();
    assert_eq!(harness.broker.active_topics().await, vec![TOPIC.to_string()]);

    harness.broker.deliver_text(TOPIC, 5, 2, "late").await;
    assert_eq!(recv(&mut rx).await.content.as_deref(), Some("late"));
}

#[tokio::test(start_paused = true)]
async fn reconnect_replays_every_subscription_in_order() {
    let harness = TestHarness::new().await;
    for topic in ["/topic/a", "/topic/b", "/topic/c"] {
        harness.transport.subscribe(topic, |_| {}).await.unwrap();
    }
    harness.connect().await.unwrap();
    let mut events = harness.transport.events();

    harness.broker.drop_connection().await;
    next_event(&mut events, |e| matches!(e, TransportEvent::Disconnected { .. })).await;
    next_event(&mut events, |e| matches!(e, TransportEvent::Connected)).await;

    assert_eq!(
        harness.broker.subscribe_log().await,
        ["/topic/a", "/topic/b", "/topic/c", "/topic/a", "/topic/b", "/topic/c"]
    );
    assert_eq!(
        harness.broker.active_topics().await,
        ["/topic/a", "/topic/b", "/topic/c"]
    );
    assert_eq!(harness.broker.open_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_topic_does_not_block_replay_of_others() {
    let harness = TestHarness::new().await;
    harness.broker.fail_subscribe("/topic/b").await;
    for topic in ["/topic/a", "/topic/b", "/topic/c"] {
        harness.transport.subscribe(topic, |_| {}).await.unwrap();
    }
    harness.connect().await.unwrap();

    assert_eq!(
        harness.broker.active_topics().await,
        ["/topic/a", "/topic/c"]
    );
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_configured_attempts() {
    let harness = TestHarness::builder()
        .with_max_reconnect_attempts(5)
        .build()
        .await;
    harness.broker.refuse_connections(true).await;
    let mut events = harness.transport.events();

    harness.transport.connect().await.unwrap();

    let mut delays = Vec::new();
    loop {
        match next_event(&mut events, |e| {
            matches!(
                e,
                TransportEvent::ReconnectScheduled { .. } | TransportEvent::Unavailable { .. }
            )
        })
        .await
        {
            TransportEvent::ReconnectScheduled { delay, .. } => delays.push(delay),
            TransportEvent::Unavailable { attempts } => {
                assert_eq!(attempts, 5);
                break;
            }
            _ => unreachable!(),
        }
    }

    let ms: Vec<u64> = delays.iter().map(|d| d.as_millis() as u64).collect();
    assert_eq!(ms, [100, 200, 300, 400, 500]);
    assert_eq!(harness.broker.open_count().await, 6);
    assert_eq!(harness.transport.state(), ConnectionState::Unavailable);

    // Nothing else is attempted afterwards.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.broker.open_count().await, 6);
}

#[tokio::test(start_paused = true)]
async fn explicit_connect_restarts_after_unavailable() {
    let harness = TestHarness::builder()
        .with_max_reconnect_attempts(1)
        .build()
        .await;
    harness.broker.refuse_connections(true).await;
    harness.transport.connect().await.unwrap();
    harness
        .transport
        .wait_for(ConnectionState::Unavailable)
        .await
        .unwrap();

    harness.broker.refuse_connections(false).await;
    harness.connect().await.unwrap();
    assert_eq!(harness.broker.open_count().await, 3);
}

#[tokio::test(start_paused = true)]
async fn successful_connect_resets_attempt_counter() {
    let harness = TestHarness::builder()
        .with_max_reconnect_attempts(2)
        .build()
        .await;
    let mut events = harness.transport.events();
    harness.broker.fail_next_opens(2).await;
    harness.connect().await.unwrap();
    assert_eq!(harness.broker.open_count().await, 3);

    // Without a reset the budget would already be spent.
    harness.broker.fail_next_opens(1).await;
    harness.broker.drop_connection().await;
    next_event(&mut events, |e| matches!(e, TransportEvent::Disconnected { .. })).await;
    next_event(&mut events, |e| matches!(e, TransportEvent::Connected)).await;
    assert_eq!(harness.broker.open_count().await, 5);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let harness = TestHarness::new().await;
    harness.broker.refuse_connections(true).await;
    let mut events = harness.transport.events();

    harness.transport.connect().await.unwrap();
    next_event(&mut events, |e| matches!(e, TransportEvent::ReconnectScheduled { .. })).await;
    harness.transport.disconnect().await.unwrap();
    harness.transport.disconnect().await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.broker.open_count().await, 1);
    assert_eq!(harness.transport.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_live_link() {
    let harness = TestHarness::new().await;
    harness.transport.subscribe(TOPIC, |_| {}).await.unwrap();
    harness.connect().await.unwrap();

    harness.transport.disconnect().await.unwrap();
    assert_eq!(harness.transport.state(), ConnectionState::Disconnected);
    assert!(!harness.broker.is_connected().await);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.broker.open_count().await, 1);
    // The registry survives a disconnect.
    assert_eq!(harness.transport.topics().await.unwrap(), vec![TOPIC.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn failed_probe_marks_session_unsupported() {
    let harness = TestHarness::new().await;
    harness
        .broker
        .set_probe_error(Some(TransportError::Unsupported("no websockets".into())))
        .await;
    let mut events = harness.transport.events();

    harness.transport.connect().await.unwrap();
    let event = next_event(&mut events, |e| matches!(e, TransportEvent::Unsupported { .. })).await;
    assert_eq!(
        event,
        TransportEvent::Unsupported {
            reason: "no websockets".into()
        }
    );

    assert_eq!(harness.transport.state(), ConnectionState::Unsupported);
    assert_eq!(harness.broker.open_count().await, 0);
    assert!(matches!(
        harness.transport.connect().await,
        Err(TransportError::Unsupported(_))
    ));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.broker.probe_count().await, 1);
    assert_eq!(harness.broker.open_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn transient_probe_failure_is_retried_until_it_passes() {
    let harness = TestHarness::new().await;
    harness
        .broker
        .set_probe_error(Some(TransportError::Connect("refused".into())))
        .await;
    let mut events = harness.transport.events();

    harness.transport.connect().await.unwrap();
    next_event(&mut events, |e| matches!(e, TransportEvent::ReconnectScheduled { .. })).await;
    harness.broker.set_probe_error(None).await;
    next_event(&mut events, |e| matches!(e, TransportEvent::Connected)).await;
    assert_eq!(harness.broker.probe_count().await, 2);

    // Once passed, the probe is not repeated on reconnect.
    harness.broker.drop_connection().await;
    next_event(&mut events, |e| matches!(e, TransportEvent::Connected)).await;
    assert_eq!(harness.broker.probe_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn probe_can_be_disabled() {
    let harness = TestHarness::builder()
        .configure(|c| c.transport.probe = false)
        .build()
        .await;
    harness.connect().await.unwrap();
    assert_eq!(harness.broker.probe_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn token_is_fetched_for_every_attempt() {
    let harness = TestHarness::new().await;
    harness.broker.fail_next_opens(1).await;
    harness.connect().await.unwrap();
    assert_eq!(
        harness.broker.tokens().await,
        vec![Some("test-token".to_string()), Some("test-token".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn anonymous_session_connects_without_token() {
    let harness = TestHarness::builder().with_token(None).build().await;
    harness.connect().await.unwrap();
    assert_eq!(harness.broker.tokens().await, vec![None]);
}

#[tokio::test(start_paused = true)]
async fn publish_requires_connection() {
    let harness = TestHarness::new().await;
    let envelope = Envelope::draft(UserId(1), "hi");
    assert_eq!(
        harness.transport.send(&envelope).await,
        Err(TransportError::NotConnected)
    );
    assert_eq!(harness.broker.published_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn publish_hands_envelope_to_broker() {
    let harness = TestHarness::new().await;
    harness.connect().await.unwrap();
    let envelope = Envelope::draft(UserId(1), "hi");
    harness.transport.send(&envelope).await.unwrap();

    let published = harness.broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "/app/sendMessage");
    assert_eq!(published[0].1.content.as_deref(), Some("hi"));
}

#[tokio::test(start_paused = true)]
async fn publish_failure_drops_link_and_reconnects() {
    let harness = TestHarness::new().await;
    harness.connect().await.unwrap();
    let mut events = harness.transport.events();
    harness.broker.fail_publishes(true).await;

    let result = harness.transport.send(&Envelope::draft(UserId(1), "hi")).await;
    assert_eq!(result, Err(TransportError::Closed));
    next_event(&mut events, |e| matches!(e, TransportEvent::Disconnected { .. })).await;

    harness.broker.fail_publishes(false).await;
    next_event(&mut events, |e| matches!(e, TransportEvent::Connected)).await;
    assert!(harness.transport.is_connected());
}

#[tokio::test(start_paused = true)]
async fn timed_out_publish_is_never_written() {
    let harness = TestHarness::new().await;
    harness.connect().await.unwrap();
    harness
        .broker
        .delay_publishes(Some(Duration::from_secs(2)))
        .await;

    let slow = Envelope::draft(UserId(1), "slow");
    let queued = Envelope::draft(UserId(1), "queued");
    let (first, second) = tokio::join!(
        harness.transport.send(&slow),
        harness.transport.send(&queued)
    );
    let timeout = Duration::from_millis(500);
    assert_eq!(first, Err(TransportError::Timeout(timeout)));
    assert_eq!(second, Err(TransportError::Timeout(timeout)));

    tokio::time::sleep(Duration::from_secs(3)).await;
    let published = harness.broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1.content.as_deref(), Some("slow"));
    assert!(harness.transport.is_connected());
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_releases_remote_subscription() {
    let harness = TestHarness::new().await;
    harness.connect().await.unwrap();
    harness.transport.subscribe(TOPIC, |_| {}).await.unwrap();

    harness.transport.unsubscribe(TOPIC).await.unwrap();
    harness.transport.unsubscribe("/topic/never").await.unwrap();

    assert_eq!(harness.broker.unsubscribe_log().await, vec![TOPIC.to_string()]);
    assert!(harness.broker.active_topics().await.is_empty());
    assert!(harness.transport.topics().await.unwrap().is_empty());
    assert_eq!(harness.broker.deliver_text(TOPIC, 1, 2, "gone").await, 0);
}

#[tokio::test(start_paused = true)]
async fn broker_error_frame_triggers_reconnect() {
    let harness = TestHarness::new().await;
    harness.connect().await.unwrap();
    let mut events = harness.transport.events();

    harness.broker.send_error("session expired").await;
    let event = next_event(&mut events, |e| matches!(e, TransportEvent::Error { .. })).await;
    assert_eq!(
        event,
        TransportEvent::Error {
            message: "session expired".into()
        }
    );
    next_event(&mut events, |e| matches!(e, TransportEvent::Connected)).await;
    assert_eq!(harness.broker.open_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn silent_broker_link_is_dropped_and_reconnected() {
    let harness = TestHarness::new().await;
    harness
        .broker
        .set_heartbeat(Some(Duration::from_secs(1)))
        .await;
    harness.connect().await.unwrap();
    let mut events = harness.transport.events();

    // Heart-beats inside the two-interval window keep the link up.
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        harness.broker.send_heartbeat().await;
    }
    assert!(harness.transport.is_connected());
    assert_eq!(harness.broker.open_count().await, 1);

    let event = next_event(&mut events, |e| {
        matches!(e, TransportEvent::Disconnected { .. })
    })
    .await;
    assert_eq!(
        event,
        TransportEvent::Disconnected {
            reason: "no heart-beat from broker".into()
        }
    );
    next_event(&mut events, |e| matches!(e, TransportEvent::Connected)).await;
    assert_eq!(harness.broker.open_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_delivery_is_skipped() {
    let harness = TestHarness::new().await;
    let (cb, mut rx) = channel_callback();
    harness.transport.subscribe(TOPIC, cb).await.unwrap();
    harness.connect().await.unwrap();

    harness.broker.deliver_raw(TOPIC, "{not json").await;
    harness.broker.deliver_text(TOPIC, 2, 3, "fine").await;
    assert_eq!(recv(&mut rx).await.id, Some(MessageId(2)));
    assert!(harness.transport.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_topic_does_not_stall_other_topics() {
    let harness = TestHarness::new().await;
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let release_rx = std::sync::Mutex::new(release_rx);
    harness
        .transport
        .subscribe("/topic/slow", move |_| {
            let _ = release_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5));
        })
        .await
        .unwrap();
    let (cb, mut rx) = channel_callback();
    harness.transport.subscribe("/topic/fast", cb).await.unwrap();
    harness.connect().await.unwrap();

    for id in 0..40 {
        harness.broker.deliver_text("/topic/slow", id, 2, "x").await;
    }
    harness.broker.deliver_text("/topic/fast", 99, 2, "quick").await;
    assert_eq!(recv(&mut rx).await.id, Some(MessageId(99)));
    drop(release_tx);
}

#[tokio::test(start_paused = true)]
async fn on_event_observes_lifecycle() {
    let harness = TestHarness::new().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _listener = harness.transport.on_event(move |e| drop(tx.send(e)));

    harness.connect().await.unwrap();
    let mut seen = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(10), rx.recv()).await {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![TransportEvent::Connecting { attempt: 0 }, TransportEvent::Connected]
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_driver() {
    let harness = TestHarness::new().await;
    harness.connect().await.unwrap();
    harness.transport.shutdown();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!harness.broker.is_connected().await);
    assert_eq!(
        harness.transport.subscribe(TOPIC, |_| {}).await,
        Err(TransportError::Shutdown)
    );
}
