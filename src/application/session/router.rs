//! Inbound frame routing.
//!
//! Decodes a client frame, refreshes activity, dispatches to the state
//! machine, and turns any failure into an `error` frame on the same
//! connection. Nothing a client sends can close its own socket from here.

use std::sync::Arc;

use crate::domain::conversation::ScenarioTag;

use super::connection::Connection;
use super::errors::SessionError;
use super::protocol::{ClientMessage, ServerMessage};
use super::state_machine::ConversationStateMachine;

/// Binary frames are not part of the protocol.
pub const BINARY_NOT_SUPPORTED: &str = "Binary messages are not supported";

/// Application-level frame as received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary,
}

/// Routes decoded client messages to conversation transitions.
#[derive(Clone)]
pub struct MessageRouter {
    state_machine: Arc<ConversationStateMachine>,
}

impl MessageRouter {
    pub fn new(state_machine: Arc<ConversationStateMachine>) -> Self {
        Self { state_machine }
    }

    /// Handles one inbound frame. Failures are reported to the client and
    /// logged; the connection stays open.
    pub async fn route(&self, conn: &Connection, frame: InboundFrame) {
        if let Err(error) = self.dispatch(conn, frame).await {
            report(conn, &error);
        }
    }

    async fn dispatch(&self, conn: &Connection, frame: InboundFrame) -> Result<(), SessionError> {
        let text = match frame {
            InboundFrame::Text(text) => text,
            InboundFrame::Binary => return Err(SessionError::protocol(BINARY_NOT_SUPPORTED)),
        };

        let message = ClientMessage::decode(&text)?;
        conn.touch_activity().await;

        tracing::debug!(
            connection_id = %conn.id(),
            user_id = %conn.user_id(),
            kind = message.kind(),
            "Routing client message"
        );

        match message {
            ClientMessage::Start { scenario } => {
                let scenario = ScenarioTag::parse_optional(scenario.as_deref())
                    .map_err(|e| SessionError::protocol(format!("Invalid message format: {}", e)))?;
                self.state_machine.start(conn, scenario).await
            }
            ClientMessage::Message { content } => {
                self.state_machine.user_message(conn, content).await
            }
            ClientMessage::End => self.state_machine.end(conn).await,
        }
    }
}

fn report(conn: &Connection, error: &SessionError) {
    match error {
        SessionError::Invariant(_) => tracing::error!(
            connection_id = %conn.id(),
            user_id = %conn.user_id(),
            kind = error.kind(),
            error = %error,
            "Session invariant violated"
        ),
        SessionError::Collaborator { .. } => tracing::warn!(
            connection_id = %conn.id(),
            user_id = %conn.user_id(),
            kind = error.kind(),
            error = %error,
            "Collaborator call failed"
        ),
        _ => tracing::debug!(
            connection_id = %conn.id(),
            kind = error.kind(),
            error = %error,
            "Rejected client message"
        ),
    }
    conn.send(ServerMessage::error(error.client_message()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockResponder;
    use crate::adapters::storage::InMemoryConversationRepository;
    use crate::application::session::connection::Outbound;
    use crate::domain::conversation::SessionPhase;
    use crate::domain::foundation::UserId;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn router() -> MessageRouter {
        MessageRouter::new(Arc::new(ConversationStateMachine::new(
            Arc::new(InMemoryConversationRepository::new()),
            Arc::new(MockResponder::new()),
            Duration::from_secs(5),
        )))
    }

    fn next_frame(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Option<ServerMessage> {
        match rx.try_recv() {
            Ok(Outbound::Frame(frame)) => Some(frame),
            _ => None,
        }
    }

    #[tokio::test]
    async fn unknown_kind_gets_error_frame() {
        let router = router();
        let (conn, mut rx) = Connection::new(UserId::new("alice").unwrap());

        router
            .route(&conn, InboundFrame::Text(r#"{"type":"dance"}"#.to_string()))
            .await;

        assert_eq!(
            next_frame(&mut rx),
            Some(ServerMessage::error("Unknown message type: dance"))
        );
        assert_eq!(conn.phase().await, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn binary_frame_gets_error_frame() {
        let router = router();
        let (conn, mut rx) = Connection::new(UserId::new("alice").unwrap());

        router.route(&conn, InboundFrame::Binary).await;

        assert_eq!(next_frame(&mut rx), Some(ServerMessage::error(BINARY_NOT_SUPPORTED)));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_does_not_count_as_activity() {
        let router = router();
        let (conn, _rx) = Connection::new(UserId::new("alice").unwrap());
        tokio::time::advance(Duration::from_secs(60)).await;

        router
            .route(&conn, InboundFrame::Text("not json".to_string()))
            .await;
        assert!(conn.idle_for().await >= Duration::from_secs(60));

        router
            .route(&conn, InboundFrame::Text(r#"{"type":"end"}"#.to_string()))
            .await;
        assert_eq!(conn.idle_for().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn start_then_end_round_trip() {
        let router = router();
        let (conn, mut rx) = Connection::new(UserId::new("alice").unwrap());

        router
            .route(
                &conn,
                InboundFrame::Text(r#"{"type":"start","scenario":"job-interview"}"#.to_string()),
            )
            .await;
        assert_eq!(conn.phase().await, SessionPhase::Active);

        router
            .route(&conn, InboundFrame::Text(r#"{"type":"end"}"#.to_string()))
            .await;
        assert_eq!(conn.phase().await, SessionPhase::Idle);

        let mut kinds = Vec::new();
        while let Some(frame) = next_frame(&mut rx) {
            kinds.push(frame.kind());
        }
        assert_eq!(
            kinds,
            vec!["conversation_started", "ai_message", "ai_message", "conversation_ended"]
        );
    }
}
