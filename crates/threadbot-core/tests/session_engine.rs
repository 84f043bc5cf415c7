//! Cross-component scenarios for sessions, the registry and the idle timer.

mod common;

use std::time::Duration;

use threadbot_types::event::SessionEvent;
use threadbot_types::llm::MessageRole;
use threadbot_types::message::{ConversationId, Trigger};
use threadbot_types::session::{SessionState, TerminationReason};
use uuid::Uuid;

use common::{DROPPED_NOTICE, FALLBACK, Harness, IDLE_NOTICE, ScriptedProvider};

const LONG_IDLE: Duration = Duration::from_secs(3600);

fn conv(id: &str) -> ConversationId {
    ConversationId::new(id)
}

#[tokio::test]
async fn trigger_produces_reply_with_history_context() {
    let h = Harness::new(ScriptedProvider::default(), LONG_IDLE);
    let c = conv("t1");
    let session = h.registry.get_or_create(&c);

    let msg = h.transport.user_says(&c, "hello");
    session.submit(Trigger::from(msg)).unwrap();
    h.transport.wait_for_posts(1).await;

    assert_eq!(h.transport.posts_in(&c), vec!["reply to: hello".to_string()]);
    assert_eq!(h.transport.typing_calls(), 1);

    // The fetched log contained the trigger itself; it appears once, last.
    let requests = h.provider.requests();
    let request = &requests[0];
    assert_eq!(request.messages.first().unwrap().role, MessageRole::System);
    assert_eq!(request.messages.first().unwrap().content, "test directive");
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[1].content, "hello");
}

#[tokio::test]
async fn triggers_in_flight_are_serialized_in_arrival_order() {
    let h = Harness::new(ScriptedProvider::gated(), LONG_IDLE);
    let c = conv("t1");
    let session = h.registry.get_or_create(&c);

    let first = h.transport.user_says(&c, "first");
    session.submit(Trigger::from(first)).unwrap();
    h.provider.wait_for_started(1).await;
    assert!(session.in_flight());

    let second = h.transport.user_says(&c, "second");
    session.submit(Trigger::from(second)).unwrap();
    assert_eq!(session.pending(), 1);

    // T2 must not start while T1 is in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.provider.started(), 1);
    assert!(h.transport.posts().is_empty());

    h.provider.release(1);
    h.transport.wait_for_posts(1).await;
    h.provider.wait_for_started(2).await;

    // T2's context was built after T1's reply had been posted.
    let requests = h.provider.requests();
    let second_request = &requests[1];
    assert!(
        second_request
            .messages
            .iter()
            .any(|m| m.role == MessageRole::Assistant && m.content == "reply to: first")
    );

    h.provider.release(1);
    h.transport.wait_for_posts(2).await;
    assert_eq!(
        h.transport.posts_in(&c),
        vec!["reply to: first".to_string(), "reply to: second".to_string()]
    );
    assert!(!session.in_flight());
    assert_eq!(session.pending(), 0);
}

#[tokio::test]
async fn conversations_run_independently() {
    let h = Harness::new(ScriptedProvider::default(), LONG_IDLE);
    let a = conv("a");
    let b = conv("b");

    let sa = h.registry.get_or_create(&a);
    let sb = h.registry.get_or_create(&b);
    assert_ne!(sa.session_id(), sb.session_id());

    sa.submit(Trigger::from(h.transport.user_says(&a, "to a"))).unwrap();
    sb.submit(Trigger::from(h.transport.user_says(&b, "to b"))).unwrap();
    h.transport.wait_for_posts(2).await;

    assert_eq!(h.transport.posts_in(&a), vec!["reply to: to a".to_string()]);
    assert_eq!(h.transport.posts_in(&b), vec!["reply to: to b".to_string()]);
    assert_eq!(h.registry.len(), 2);
}

#[tokio::test]
async fn get_or_create_returns_the_live_session() {
    let h = Harness::new(ScriptedProvider::default(), LONG_IDLE);
    let c = conv("t1");

    assert!(h.registry.get(&c).is_none());
    let first = h.registry.get_or_create(&c);
    let again = h.registry.get_or_create(&c);

    assert_eq!(first.session_id(), again.session_id());
    assert_eq!(h.registry.get(&c).unwrap().session_id(), first.session_id());
    assert_eq!(h.registry.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn idle_session_is_closed_once_then_restart_starts_new_timer() {
    let idle = Duration::from_secs(60);
    let h = Harness::new(ScriptedProvider::default(), idle);
    let mut events = h.events.subscribe();
    let c = conv("t1");

    let old = h.registry.get_or_create(&c);
    let mut state = old.subscribe_state();

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(old.is_active());

    tokio::time::sleep(Duration::from_secs(2)).await;
    state.wait_for(|s| *s == SessionState::Terminated).await.unwrap();
    h.transport.wait_for_posts(1).await;

    assert_eq!(h.transport.posts_in(&c), vec![IDLE_NOTICE.to_string()]);
    assert_eq!(h.transport.is_archived(&c), Some(true));
    assert!(h.registry.get(&c).is_none());

    // Fires exactly once.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.transport.posts_in(&c).len(), 1);

    // Messages to an expired conversation are rejected by the retired session.
    assert!(old.submit(Trigger::from(h.transport.user_says(&c, "late"))).is_err());

    let restarted_at = tokio::time::Instant::now();
    let fresh = h.registry.restart(&c);
    assert_ne!(fresh.session_id(), old.session_id());
    assert!(fresh.is_active());

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(fresh.is_active());
    assert_eq!(h.transport.posts_in(&c).len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let mut fresh_state = fresh.subscribe_state();
    fresh_state
        .wait_for(|s| *s == SessionState::Terminated)
        .await
        .unwrap();
    assert!(restarted_at.elapsed() >= idle);
    h.transport.wait_for_posts(2).await;
    assert_eq!(h.transport.posts_in(&c).len(), 2);

    let mut idle_terminations = 0;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::SessionTerminated {
            reason: TerminationReason::IdleTimeout,
            ..
        } = event
        {
            idle_terminations += 1;
        }
    }
    assert_eq!(idle_terminations, 2);
}

#[tokio::test(start_paused = true)]
async fn activity_keeps_session_alive() {
    let h = Harness::new(ScriptedProvider::default(), Duration::from_secs(60));
    let c = conv("t1");
    let session = h.registry.get_or_create(&c);

    for i in 0..5 {
        tokio::time::sleep(Duration::from_secs(40)).await;
        let msg = h.transport.user_says(&c, &format!("message {i}"));
        session.submit(Trigger::from(msg)).unwrap();
        h.transport.wait_for_posts(i + 1).await;
    }

    assert!(session.is_active());
    assert!(h.registry.get(&c).is_some());
}

#[tokio::test(start_paused = true)]
async fn long_turn_does_not_expire_its_session() {
    let h = Harness::new(ScriptedProvider::gated(), Duration::from_secs(60));
    let c = conv("t1");
    let session = h.registry.get_or_create(&c);

    session
        .submit(Trigger::from(h.transport.user_says(&c, "slow")))
        .unwrap();
    h.provider.wait_for_started(1).await;

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(session.is_active());
    assert!(h.transport.posts().is_empty());

    h.provider.release(1);
    h.transport.wait_for_posts(1).await;
    assert_eq!(h.transport.posts_in(&c), vec!["reply to: slow".to_string()]);

    // The countdown restarts once the reply is out.
    let mut state = session.subscribe_state();
    tokio::time::sleep(Duration::from_secs(61)).await;
    state.wait_for(|s| *s == SessionState::Terminated).await.unwrap();
    h.transport.wait_for_posts(2).await;
    assert_eq!(h.transport.posts_in(&c)[1], IDLE_NOTICE);
}

#[tokio::test]
async fn restart_while_in_flight_delivers_reply_and_explains_dropped_queue() {
    let h = Harness::new(ScriptedProvider::gated(), LONG_IDLE);
    let mut events = h.events.subscribe();
    let c = conv("t1");
    let old = h.registry.get_or_create(&c);

    old.submit(Trigger::from(h.transport.user_says(&c, "first"))).unwrap();
    h.provider.wait_for_started(1).await;
    old.submit(Trigger::from(h.transport.user_says(&c, "queued"))).unwrap();

    let fresh = h.registry.restart(&c);
    assert_eq!(old.state(), SessionState::Terminated);
    assert!(fresh.is_active());
    assert_eq!(h.registry.get(&c).unwrap().session_id(), fresh.session_id());

    // The retired session accepts nothing more.
    assert!(old.submit(Trigger::from(h.transport.user_says(&c, "late"))).is_err());

    // The in-flight generation still completes and its reply is delivered,
    // then the queued trigger is answered with one notice.
    h.provider.release(1);
    h.transport.wait_for_posts(2).await;
    assert_eq!(
        h.transport.posts_in(&c),
        vec!["reply to: first".to_string(), DROPPED_NOTICE.to_string()]
    );

    // The new session serves new triggers.
    fresh
        .submit(Trigger::from(h.transport.user_says(&c, "after restart")))
        .unwrap();
    h.provider.release(1);
    h.transport.wait_for_posts(3).await;
    assert_eq!(h.transport.posts_in(&c)[2], "reply to: after restart");

    // "queued" was never generated.
    assert!(
        h.provider
            .requests()
            .iter()
            .all(|r| r.messages.last().unwrap().content != "queued")
    );

    let mut dropped = None;
    let mut rejected = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::TriggersDropped { count, session_id, .. } => {
                assert_eq!(session_id, old.session_id());
                dropped = Some(count);
            }
            SessionEvent::TriggerRejected { .. } => rejected += 1,
            _ => {}
        }
    }
    assert_eq!(dropped, Some(1));
    assert_eq!(rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn stale_idle_timer_cannot_terminate_successor() {
    let h = Harness::new(ScriptedProvider::default(), Duration::from_secs(60));
    let c = conv("t1");
    let old = h.registry.get_or_create(&c);

    assert!(!h.registry.on_idle_timeout(&c, Uuid::now_v7()).await);
    assert!(old.is_active());

    let fresh = h.registry.restart(&c);
    assert!(!h.registry.on_idle_timeout(&c, old.session_id()).await);
    assert!(fresh.is_active());
    assert!(h.transport.posts().is_empty());

    assert!(h.registry.on_idle_timeout(&c, fresh.session_id()).await);
    assert!(!fresh.is_active());
    assert_eq!(h.transport.posts_in(&c), vec![IDLE_NOTICE.to_string()]);
}

#[tokio::test]
async fn restart_without_live_session_creates_one() {
    let h = Harness::new(ScriptedProvider::default(), LONG_IDLE);
    let c = conv("t1");

    let session = h.registry.restart(&c);
    assert!(session.is_active());
    assert_eq!(h.registry.len(), 1);
    assert!(h.transport.posts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_is_retried_once() {
    let h = Harness::new(ScriptedProvider::default(), LONG_IDLE);
    let c = conv("t1");
    let session = h.registry.get_or_create(&c);

    h.transport.fail_next_fetches(1);
    session
        .submit(Trigger::from(h.transport.user_says(&c, "hello")))
        .unwrap();
    h.transport.wait_for_posts(1).await;

    assert_eq!(h.transport.fetch_calls(), 2);
    assert_eq!(h.transport.posts_in(&c), vec!["reply to: hello".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn fetch_failing_twice_posts_fallback() {
    let h = Harness::new(ScriptedProvider::default(), LONG_IDLE);
    let mut events = h.events.subscribe();
    let c = conv("t1");
    let session = h.registry.get_or_create(&c);

    h.transport.fail_next_fetches(2);
    session
        .submit(Trigger::from(h.transport.user_says(&c, "hello")))
        .unwrap();
    h.transport.wait_for_posts(1).await;

    assert_eq!(h.transport.fetch_calls(), 2);
    assert_eq!(h.transport.posts_in(&c), vec![FALLBACK.to_string()]);
    assert_eq!(h.provider.started(), 0);

    let mut saw_fallback = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::ReplyPosted { fallback, .. } = event {
            saw_fallback = fallback;
        }
    }
    assert!(saw_fallback);
}

#[tokio::test]
async fn model_failure_posts_fallback_and_session_continues() {
    let h = Harness::new(ScriptedProvider::default(), LONG_IDLE);
    let c = conv("t1");
    let session = h.registry.get_or_create(&c);

    h.provider.set_failing(true);
    session
        .submit(Trigger::from(h.transport.user_says(&c, "one")))
        .unwrap();
    h.transport.wait_for_posts(1).await;
    assert_eq!(h.transport.posts_in(&c), vec![FALLBACK.to_string()]);
    assert!(session.is_active());

    h.provider.set_failing(false);
    session
        .submit(Trigger::from(h.transport.user_says(&c, "two")))
        .unwrap();
    h.transport.wait_for_posts(2).await;
    assert_eq!(h.transport.posts_in(&c)[1], "reply to: two");
}

#[tokio::test]
async fn snapshots_and_shutdown() {
    let h = Harness::new(ScriptedProvider::default(), LONG_IDLE);
    let a = h.registry.get_or_create(&conv("b-thread"));
    let b = h.registry.get_or_create(&conv("a-thread"));

    let snapshots = h.registry.snapshots();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].conversation_id.as_str(), "a-thread");
    assert_eq!(snapshots[0].state, SessionState::Active);
    assert_eq!(snapshots[0].pending, 0);
    assert!(!snapshots[0].in_flight);

    h.registry.shutdown();
    assert!(h.registry.is_empty());
    assert!(!a.is_active());
    assert!(!b.is_active());
    assert!(h.transport.posts().is_empty());
}
