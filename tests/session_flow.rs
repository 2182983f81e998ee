//! End-to-end session flows through the public session API, with the
//! in-memory repository and the scripted responder.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use convo_coach::adapters::{InMemoryConversationRepository, MockResponder, MockSessionValidator};
use convo_coach::application::session::{
    Connection, InactivityReaper, Outbound, ServerMessage, SessionError, SessionManager,
    TIMEOUT_NOTICE,
};
use convo_coach::config::SessionConfig;
use convo_coach::domain::conversation::{SessionPhase, TIMEOUT_SUMMARY_SUFFIX};
use convo_coach::domain::foundation::UserId;
use convo_coach::ports::{ConversationRepository, ResponderError};

struct Harness {
    repo: InMemoryConversationRepository,
    responder: MockResponder,
    manager: SessionManager,
}

fn harness() -> Harness {
    harness_with(MockResponder::new())
}

fn harness_with(responder: MockResponder) -> Harness {
    let repo = InMemoryConversationRepository::new();
    let manager = SessionManager::new(
        Arc::new(repo.clone()),
        Arc::new(responder.clone()),
        Arc::new(MockSessionValidator::new().with_user("alice-token", "alice")),
        SessionConfig::default(),
    );
    Harness {
        repo,
        responder,
        manager,
    }
}

fn alice() -> UserId {
    UserId::new("alice").unwrap()
}

fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<ServerMessage> {
    let mut frames = Vec::new();
    while let Ok(item) = rx.try_recv() {
        if let Outbound::Frame(frame) = item {
            frames.push(frame);
        }
    }
    frames
}

fn kinds(frames: &[ServerMessage]) -> Vec<&'static str> {
    frames.iter().map(ServerMessage::kind).collect()
}

fn reaper(h: &Harness) -> InactivityReaper {
    let config = SessionConfig::default();
    InactivityReaper::new(
        h.manager.registry().clone(),
        h.manager.state_machine().clone(),
        config.reaper_interval(),
        config.idle_threshold(),
    )
}

#[tokio::test]
async fn coffee_shop_conversation_start_to_end() {
    let h = harness();
    let token = h.manager.authenticate(Some("alice-token")).await.unwrap();
    let (conn, mut rx) = h.manager.connect(token).await;
    assert_eq!(kinds(&drain(&mut rx)), vec!["connected"]);

    h.manager
        .handle_text(&conn, r#"{"type":"start","scenario":"coffee-shop"}"#)
        .await;
    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), vec!["conversation_started", "ai_message"]);
    match &frames[0] {
        ServerMessage::ConversationStarted(started) => {
            assert_eq!(started.scenario.as_deref(), Some("coffee-shop"));
        }
        other => panic!("unexpected frame {:?}", other),
    }

    h.manager
        .handle_text(&conn, r#"{"type":"message","content":"I'd like a latte"}"#)
        .await;
    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), vec!["ai_typing", "ai_typing", "ai_message"]);
    match &frames[2] {
        ServerMessage::AiMessage(reply) => {
            assert_eq!(reply.content, "Sure! Would you like that hot or iced?");
        }
        other => panic!("unexpected frame {:?}", other),
    }

    let id = conn.conversation_id().await.unwrap();
    h.manager.handle_text(&conn, r#"{"type":"end"}"#).await;
    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), vec!["ai_message", "conversation_ended"]);
    match &frames[1] {
        ServerMessage::ConversationEnded(ended) => {
            assert_eq!(ended.message_count, 4);
            assert!(ended.summary.contains("User messaged 1"));
            assert!(!ended.feedback.is_empty());
        }
        other => panic!("unexpected frame {:?}", other),
    }

    assert_eq!(conn.phase().await, SessionPhase::Idle);
    let stored = h.repo.find_by_id(&id).await.unwrap().unwrap();
    assert!(!stored.is_open());
    assert!(stored.end_time().unwrap() >= stored.start_time());
}

#[tokio::test(start_paused = true)]
async fn idle_conversation_is_ended_by_the_reaper() {
    let h = harness();
    let (conn, mut rx) = h.manager.connect(alice()).await;
    h.manager.handle_text(&conn, r#"{"type":"start"}"#).await;
    h.manager
        .handle_text(&conn, r#"{"type":"message","content":"Hello there"}"#)
        .await;
    let id = conn.conversation_id().await.unwrap();
    drain(&mut rx);

    // pongs keep arriving, but nobody talks
    for _ in 0..30 {
        tokio::time::advance(Duration::from_secs(60)).await;
        conn.mark_alive().await;
    }
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(reaper(&h).sweep().await, 1);

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), vec!["ai_message", "conversation_timeout"]);
    match &frames[1] {
        ServerMessage::ConversationTimeout(timeout) => {
            assert_eq!(timeout.message, TIMEOUT_NOTICE);
            assert!(!timeout.summary.ends_with(TIMEOUT_SUMMARY_SUFFIX));
        }
        other => panic!("unexpected frame {:?}", other),
    }

    let stored = h.repo.find_by_id(&id).await.unwrap().unwrap();
    assert!(stored.summary().unwrap().ends_with(TIMEOUT_SUMMARY_SUFFIX));
    assert_eq!(conn.phase().await, SessionPhase::Idle);
    assert_eq!(conn.conversation_id().await, None);
}

#[tokio::test(start_paused = true)]
async fn end_racing_timeout_closes_exactly_once() {
    let h = harness_with(MockResponder::new().with_delay(Duration::from_millis(500)));
    let (conn, mut rx) = h.manager.connect(alice()).await;
    h.manager.handle_text(&conn, r#"{"type":"start"}"#).await;
    let id = conn.conversation_id().await.unwrap();
    drain(&mut rx);

    tokio::time::advance(Duration::from_secs(1801)).await;
    let machine = h.manager.state_machine().clone();
    let threshold = SessionConfig::default().idle_threshold();

    let (ended, timed_out) = tokio::join!(machine.end(&conn), machine.timeout(&conn, threshold));

    let end_won = ended.is_ok();
    let timeout_won = matches!(timed_out, Ok(true));
    assert!(end_won ^ timeout_won, "exactly one transition must close the conversation");
    if !end_won {
        assert_eq!(ended, Err(SessionError::state("No active conversation")));
    }

    let terminal: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|f| matches!(f.kind(), "conversation_ended" | "conversation_timeout"))
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(h.responder.summarize_calls(), 1);
    assert!(!h.repo.find_by_id(&id).await.unwrap().unwrap().is_open());
}

#[tokio::test]
async fn overlapping_starts_leave_one_open_conversation() {
    let h = harness_with(MockResponder::new());
    let machine = h.manager.state_machine().clone();
    let (first, _first_rx) = Connection::new(alice());
    let (second, _second_rx) = Connection::new(alice());

    let (a, b) = tokio::join!(machine.start(&first, None), machine.start(&second, None));
    a.unwrap();
    b.unwrap();

    assert_eq!(h.repo.open_count(&alice()).await, 1);
    assert_eq!(h.repo.all_conversations().await.len(), 2);
}

#[tokio::test]
async fn new_session_auto_closes_previous_conversation() {
    let h = harness();
    let (old, _old_rx) = h.manager.connect(alice()).await;
    h.manager.handle_text(&old, r#"{"type":"start"}"#).await;
    let old_id = old.conversation_id().await.unwrap();

    // socket dropped without `end`
    h.manager.disconnect(&old).await;

    let (new, mut new_rx) = h.manager.connect(alice()).await;
    h.manager
        .handle_text(&new, r#"{"type":"start","scenario":"job-interview"}"#)
        .await;
    assert!(kinds(&drain(&mut new_rx)).contains(&"conversation_started"));

    let stale = h.repo.find_by_id(&old_id).await.unwrap().unwrap();
    assert!(!stale.is_open());
    assert_eq!(stale.feedback(), None);
    assert_eq!(h.repo.open_count(&alice()).await, 1);
}

#[tokio::test]
async fn message_timestamps_strictly_increase() {
    let h = harness();
    let (conn, _rx) = h.manager.connect(alice()).await;
    h.manager.handle_text(&conn, r#"{"type":"start"}"#).await;
    for text in ["one", "two", "three", "four"] {
        let frame = serde_json::json!({ "type": "message", "content": text }).to_string();
        h.manager.handle_text(&conn, frame).await;
    }
    let id = conn.conversation_id().await.unwrap();

    let messages = h.repo.list_messages(&id).await.unwrap();
    assert_eq!(messages.len(), 9);
    assert!(messages
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp));
    let user_turns: Vec<_> = messages
        .iter()
        .filter(|m| m.is_from_user())
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(user_turns, vec!["one", "two", "three", "four"]);
}

#[tokio::test]
async fn end_without_conversation_is_an_error_frame() {
    let h = harness();
    let (conn, mut rx) = h.manager.connect(alice()).await;
    drain(&mut rx);

    h.manager.handle_text(&conn, r#"{"type":"end"}"#).await;

    assert_eq!(
        drain(&mut rx),
        vec![ServerMessage::error("No active conversation")]
    );
    assert!(h.repo.all_conversations().await.is_empty());
    assert!(!conn.is_closed().await);
}

#[tokio::test]
async fn responder_failure_reports_error_and_keeps_conversation() {
    let h = harness();
    let (conn, mut rx) = h.manager.connect(alice()).await;
    h.manager.handle_text(&conn, r#"{"type":"start"}"#).await;
    drain(&mut rx);

    h.responder
        .fail_next_generate(ResponderError::unavailable("upstream 503"));
    h.manager
        .handle_text(&conn, r#"{"type":"message","content":"hello"}"#)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(
        frames.last(),
        Some(&ServerMessage::error("Failed to process message"))
    );
    assert_eq!(conn.phase().await, SessionPhase::Active);

    h.manager
        .handle_text(&conn, r#"{"type":"message","content":"hello again"}"#)
        .await;
    assert_eq!(kinds(&drain(&mut rx)).last(), Some(&"ai_message"));
}

#[tokio::test]
async fn protocol_errors_do_not_close_the_connection() {
    let h = harness();
    let (conn, mut rx) = h.manager.connect(alice()).await;
    drain(&mut rx);

    h.manager.handle_text(&conn, "{oops").await;
    h.manager.handle_text(&conn, r#"{"type":"shout"}"#).await;
    h.manager
        .handle_text(&conn, r#"{"type":"message","content":"hi"}"#)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.kind() == "error"));
    assert_eq!(frames[1], ServerMessage::error("Unknown message type: shout"));
    assert_eq!(frames[2], ServerMessage::error("No active conversation"));
    assert!(!conn.is_closed().await);
}

#[tokio::test]
async fn failed_opening_line_leaves_client_idle_and_nothing_open() {
    let h = harness();
    let (conn, mut rx) = h.manager.connect(alice()).await;
    drain(&mut rx);
    h.repo.set_failing_appends(true);

    h.manager.handle_text(&conn, r#"{"type":"start"}"#).await;

    assert_eq!(
        drain(&mut rx),
        vec![ServerMessage::error("Failed to start conversation")]
    );
    assert_eq!(conn.phase().await, SessionPhase::Idle);
    assert_eq!(h.repo.open_count(&alice()).await, 0);

    h.repo.set_failing_appends(false);
    h.manager.handle_text(&conn, r#"{"type":"start"}"#).await;
    assert_eq!(kinds(&drain(&mut rx)), vec!["conversation_started", "ai_message"]);
    assert_eq!(h.repo.open_count(&alice()).await, 1);
}

#[tokio::test]
async fn conversation_left_by_a_dropped_socket_is_swept() {
    let h = harness();
    let (conn, _rx) = h.manager.connect(alice()).await;
    h.manager.handle_text(&conn, r#"{"type":"start"}"#).await;
    let id = conn.conversation_id().await.unwrap();
    h.manager.disconnect(&conn).await;

    let reaper = InactivityReaper::new(
        h.manager.registry().clone(),
        h.manager.state_machine().clone(),
        Duration::from_secs(60),
        Duration::ZERO,
    );
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(reaper.sweep_abandoned().await, 1);

    let stored = h.repo.find_by_id(&id).await.unwrap().unwrap();
    assert!(!stored.is_open());
    assert_eq!(h.repo.open_count(&alice()).await, 0);
}
