//! WebSocket round trips against a real listener, with HS256 tokens.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::{SinkExt, StreamExt};
use secrecy::Secret;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use convo_coach::adapters::{
    app_router, AppState, InMemoryConversationRepository, InMemoryRateLimiter, JwtSessionValidator,
    MockResponder,
};
use convo_coach::application::SessionManager;
use convo_coach::config::{RateLimitConfig, ServerConfig, SessionConfig};
use convo_coach::domain::foundation::UserId;
use convo_coach::ports::{ConversationRepository, SessionValidator};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "an-integration-test-secret-of-32+chars";

fn validator() -> JwtSessionValidator {
    JwtSessionValidator::new(Secret::new(SECRET.to_string()), 0)
}

fn token_for(user: &str) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600;
    validator()
        .sign(&UserId::new(user).unwrap(), exp)
        .unwrap()
}

async fn spawn_server() -> SocketAddr {
    let conversations: Arc<dyn ConversationRepository> =
        Arc::new(InMemoryConversationRepository::new());
    let validator: Arc<dyn SessionValidator> = Arc::new(validator());
    let sessions = Arc::new(SessionManager::new(
        conversations.clone(),
        Arc::new(MockResponder::new()),
        validator.clone(),
        SessionConfig::default(),
    ));
    let app = app_router(
        AppState {
            sessions,
            conversations,
            validator,
            rate_limiter: Arc::new(InMemoryRateLimiter::new(RateLimitConfig::default())),
        },
        &ServerConfig::default(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

async fn open(addr: SocketAddr, query: &str) -> Socket {
    let (socket, _response) = connect_async(format!("ws://{}/ws{}", addr, query))
        .await
        .unwrap();
    socket
}

/// Next message that is not a protocol ping or pong.
async fn next_message(socket: &mut Socket) -> Message {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .expect("socket error");
        if !matches!(message, Message::Ping(_) | Message::Pong(_)) {
            return message;
        }
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    match next_message(socket).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

async fn next_close(socket: &mut Socket) -> (u16, String) {
    match next_message(socket).await {
        Message::Close(Some(frame)) => (u16::from(frame.code), frame.reason.to_string()),
        other => panic!("expected a close frame, got {:?}", other),
    }
}

async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

#[tokio::test]
async fn missing_token_is_closed_with_4001() {
    let addr = spawn_server().await;
    let mut socket = open(addr, "").await;

    assert_eq!(next_close(&mut socket).await, (4001, "No token provided".to_string()));
}

#[tokio::test]
async fn invalid_token_is_closed_with_4002() {
    let addr = spawn_server().await;
    let mut socket = open(addr, "?token=not-a-jwt").await;

    assert_eq!(next_close(&mut socket).await, (4002, "Invalid token".to_string()));
}

#[tokio::test]
async fn full_conversation_over_the_wire() {
    let addr = spawn_server().await;
    let mut socket = open(addr, &format!("?token={}", token_for("alice"))).await;

    let connected = next_json(&mut socket).await;
    assert_eq!(connected, json!({ "type": "connected", "userId": "alice" }));

    send(&mut socket, json!({ "type": "start", "scenario": "coffee-shop" })).await;
    let started = next_json(&mut socket).await;
    assert_eq!(started["type"], "conversation_started");
    assert_eq!(started["scenario"], "coffee-shop");
    assert!(started["conversationId"].is_string());
    let opening = next_json(&mut socket).await;
    assert_eq!(opening["type"], "ai_message");
    assert!(opening["timestamp"].is_string());

    send(&mut socket, json!({ "type": "message", "content": "I'd like a latte" })).await;
    assert_eq!(next_json(&mut socket).await, json!({ "type": "ai_typing", "isTyping": true }));
    assert_eq!(next_json(&mut socket).await, json!({ "type": "ai_typing", "isTyping": false }));
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["content"], "Sure! Would you like that hot or iced?");

    send(&mut socket, json!({ "type": "end" })).await;
    assert_eq!(next_json(&mut socket).await["type"], "ai_message");
    let ended = next_json(&mut socket).await;
    assert_eq!(ended["type"], "conversation_ended");
    assert_eq!(ended["messageCount"], 4);
    assert!(ended["summary"].is_string());
    assert!(ended["feedback"].is_string());
}

#[tokio::test]
async fn second_connection_supersedes_first() {
    let addr = spawn_server().await;
    let token = token_for("alice");

    let mut first = open(addr, &format!("?token={}", token)).await;
    assert_eq!(next_json(&mut first).await["type"], "connected");

    let mut second = open(addr, &format!("?token={}", token)).await;
    assert_eq!(next_json(&mut second).await["type"], "connected");

    assert_eq!(
        next_close(&mut first).await,
        (4003, "New Connection established".to_string())
    );

    // the replacement keeps working
    send(&mut second, json!({ "type": "start" })).await;
    assert_eq!(next_json(&mut second).await["type"], "conversation_started");
}

#[tokio::test]
async fn bad_frames_get_error_frames() {
    let addr = spawn_server().await;
    let mut socket = open(addr, &format!("?token={}", token_for("bob"))).await;
    next_json(&mut socket).await;

    socket.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    let error = next_json(&mut socket).await;
    assert_eq!(error["type"], "error");

    send(&mut socket, json!({ "type": "teleport" })).await;
    assert_eq!(
        next_json(&mut socket).await,
        json!({ "type": "error", "message": "Unknown message type: teleport" })
    );

    send(&mut socket, json!({ "type": "message", "content": "anyone?" })).await;
    assert_eq!(
        next_json(&mut socket).await,
        json!({ "type": "error", "message": "No active conversation" })
    );
}

#[tokio::test]
async fn history_lists_finished_conversation() {
    let addr = spawn_server().await;
    let token = token_for("carol");
    let mut socket = open(addr, &format!("?token={}", token)).await;
    next_json(&mut socket).await;

    send(&mut socket, json!({ "type": "start" })).await;
    next_json(&mut socket).await;
    next_json(&mut socket).await;
    send(&mut socket, json!({ "type": "end" })).await;
    next_json(&mut socket).await;
    assert_eq!(next_json(&mut socket).await["type"], "conversation_ended");

    let client = reqwest::Client::new();
    let history: Value = client
        .get(format!("http://{}/api/conversations", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let list = history.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0]["endTime"].is_string());
    assert_eq!(list[0]["messageCount"], 2);

    let id = list[0]["id"].as_str().unwrap();
    let detail: Value = client
        .get(format!("http://{}/api/conversations/{}", addr, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["messageCount"], 2);
    assert_eq!(detail["messages"][0]["sender"], "responder");
}

#[tokio::test]
async fn rest_end_reaches_the_live_socket() {
    let addr = spawn_server().await;
    let token = token_for("dave");
    let mut socket = open(addr, &format!("?token={}", token)).await;
    next_json(&mut socket).await;

    send(&mut socket, json!({ "type": "start", "scenario": "coffee-shop" })).await;
    let started = next_json(&mut socket).await;
    let id = started["conversationId"].as_str().unwrap().to_string();
    next_json(&mut socket).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/api/conversations/{}/end", addr, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let ended: Value = response.json().await.unwrap();
    assert!(ended["endTime"].is_string());

    assert_eq!(next_json(&mut socket).await["type"], "ai_message");
    let frame = next_json(&mut socket).await;
    assert_eq!(frame["type"], "conversation_ended");
    assert_eq!(frame["messageCount"], 2);

    let again = client
        .post(format!("http://{}/api/conversations/{}/end", addr, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), reqwest::StatusCode::BAD_REQUEST);

    let transcript: Value = client
        .get(format!("http://{}/api/conversations/{}/messages", addr, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(transcript["conversationId"], id);
    assert_eq!(transcript["messages"].as_array().unwrap().len(), 2);
}
