//! WebSocket upgrade handler for practice sessions.
//!
//! Handles the HTTP → WebSocket upgrade and drives one connection:
//! 1. Validate the token (query `token`, or a Bearer header)
//! 2. Reject with close `4001` / `4002`, or admit to the session manager
//! 3. Run reader, dispatcher and writer tasks until either side goes away
//! 4. Drop the connection from the registry
//!
//! The reader never waits on a transition: frames are queued to the
//! dispatcher, which feeds them to the session manager one at a time, so
//! pongs keep flowing while a responder call is in progress.

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::adapters::http::middleware::bearer_token;
use crate::application::session::{
    admission_close, Connection, InboundFrame, Outbound, SessionError, SessionManager,
    CLOSE_INVALID_TOKEN,
};

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub sessions: Arc<SessionManager>,
}

impl WebSocketState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

/// Query string of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws?token=<jwt>`
///
/// Authentication happens after the upgrade so a rejected client receives
/// a close frame with a code it can act on instead of a bare HTTP error.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<WebSocketState>,
) -> Response {
    let token = params
        .token
        .or_else(|| bearer_token(&headers).map(str::to_string));

    ws.on_upgrade(move |socket| handle_socket(socket, token, state))
}

async fn handle_socket(mut socket: WebSocket, token: Option<String>, state: WebSocketState) {
    let sessions = state.sessions;

    let user_id = match sessions.authenticate(token.as_deref()).await {
        Ok(user_id) => user_id,
        Err(error) => {
            let (code, reason) = match &error {
                SessionError::Auth(auth) => admission_close(auth),
                _ => (CLOSE_INVALID_TOKEN, "Invalid token"),
            };
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: Cow::Borrowed(reason),
                })))
                .await;
            return;
        }
    };

    let (conn, outbound) = sessions.connect(user_id).await;
    let (sink, stream) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel(sessions.config().inbound_buffer.max(1));

    let mut writer = tokio::spawn(write_loop(sink, outbound, conn.clone()));
    let mut reader = tokio::spawn(read_loop(stream, conn.clone(), inbound_tx));
    let dispatcher = tokio::spawn(dispatch_loop(sessions.clone(), conn.clone(), inbound_rx));

    tokio::select! {
        _ = &mut writer => {
            reader.abort();
        }
        _ = &mut reader => {}
    }

    sessions.disconnect(&conn).await;

    // The reader's queue is closed now; let in-flight frames finish.
    if let Err(e) = dispatcher.await {
        tracing::error!(connection_id = %conn.id(), error = %e, "Dispatcher task failed");
    }
    writer.abort();
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    conn: Arc<Connection>,
    inbound: mpsc::Sender<InboundFrame>,
) {
    while let Some(result) = stream.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(connection_id = %conn.id(), "Receive error: {}", e);
                break;
            }
        };

        conn.mark_alive().await;

        let frame = match message {
            Message::Text(text) => InboundFrame::Text(text),
            Message::Binary(_) => InboundFrame::Binary,
            // axum answers pings itself
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                tracing::debug!(connection_id = %conn.id(), "Client sent close frame");
                break;
            }
        };

        if inbound.send(frame).await.is_err() {
            break;
        }
    }
}

async fn dispatch_loop(
    sessions: Arc<SessionManager>,
    conn: Arc<Connection>,
    mut inbound: mpsc::Receiver<InboundFrame>,
) {
    while let Some(frame) = inbound.recv().await {
        sessions.handle_frame(&conn, frame).await;
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    conn: Arc<Connection>,
) {
    while let Some(item) = outbound.recv().await {
        let result = match item {
            Outbound::Frame(frame) => match frame.to_json() {
                Ok(json) => sink.send(Message::Text(json)).await,
                Err(e) => {
                    tracing::error!(
                        connection_id = %conn.id(),
                        kind = frame.kind(),
                        error = %e,
                        "Failed to serialize frame"
                    );
                    continue;
                }
            },
            Outbound::Ping => sink.send(Message::Ping(Vec::new())).await,
            Outbound::Close { code, reason } => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: Cow::Owned(reason),
                    })))
                    .await;
                break;
            }
            Outbound::Terminate => break,
        };

        if let Err(e) = result {
            tracing::debug!(connection_id = %conn.id(), "Send error, closing connection: {}", e);
            break;
        }
    }
}

/// Create axum router for the WebSocket endpoint.
pub fn websocket_router() -> axum::Router<WebSocketState> {
    use axum::routing::get;

    axum::Router::new().route("/ws", get(ws_handler))
}
