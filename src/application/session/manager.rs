//! SessionManager - entry point of the session core.
//!
//! Owns the connection registry, the conversation state machine and the
//! timers, and exposes what a transport needs: authenticate an upgrade,
//! admit a connection, feed it inbound frames, drop it on disconnect.
//! Conversations can also be ended from outside a socket (the REST API),
//! in which case the owner's live connection, if it is in that
//! conversation, receives the usual frames.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::domain::conversation::Conversation;
use crate::domain::foundation::{AuthError, UserId};
use crate::ports::{
    ConversationRepository, RateLimitKey, RateLimitResult, RateLimiter, Responder,
    SessionValidator,
};

use super::connection::{
    Connection, Outbound, CLOSE_INVALID_TOKEN, CLOSE_NO_TOKEN, CLOSE_SUPERSEDED,
    CLOSE_SUPERSEDED_REASON,
};
use super::errors::SessionError;
use super::heartbeat::HeartbeatMonitor;
use super::protocol::ServerMessage;
use super::reaper::InactivityReaper;
use super::registry::ConnectionRegistry;
use super::router::{InboundFrame, MessageRouter};
use super::state_machine::ConversationStateMachine;

/// Close code and reason for a rejected upgrade.
pub fn admission_close(error: &AuthError) -> (u16, &'static str) {
    match error {
        AuthError::MissingToken => (CLOSE_NO_TOKEN, "No token provided"),
        _ => (CLOSE_INVALID_TOKEN, "Invalid token"),
    }
}

/// Coordinates connections and conversations for all users.
pub struct SessionManager {
    registry: Arc<ConnectionRegistry>,
    state_machine: Arc<ConversationStateMachine>,
    router: MessageRouter,
    validator: Arc<dyn SessionValidator>,
    frame_limiter: Option<Arc<dyn RateLimiter>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        responder: Arc<dyn Responder>,
        validator: Arc<dyn SessionValidator>,
        config: SessionConfig,
    ) -> Self {
        let state_machine = Arc::new(ConversationStateMachine::new(
            repository,
            responder,
            config.collaborator_timeout(),
        ));
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            router: MessageRouter::new(state_machine.clone()),
            state_machine,
            validator,
            frame_limiter: None,
            config,
        }
    }

    /// Caps inbound frames per connection. Frames over the cap are answered
    /// with an `error` frame and dropped.
    pub fn with_frame_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.frame_limiter = Some(limiter);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn state_machine(&self) -> &Arc<ConversationStateMachine> {
        &self.state_machine
    }

    /// Validates the token carried by an upgrade request.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<UserId, SessionError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::MissingToken.into()),
        };

        self.validator.validate(token).await.map_err(|e| {
            tracing::info!(error = %e, "Rejected connection token");
            SessionError::from(e)
        })
    }

    /// Admits a connection for `user_id`, superseding any previous one, and
    /// greets it with `connected`.
    pub async fn connect(&self, user_id: UserId) -> (Arc<Connection>, mpsc::UnboundedReceiver<Outbound>) {
        let (conn, rx) = Connection::new(user_id);
        let conn = Arc::new(conn);

        if let Some(previous) = self.registry.admit(conn.clone()).await {
            tracing::info!(
                user_id = %conn.user_id(),
                previous_connection_id = %previous.id(),
                connection_id = %conn.id(),
                "Superseding existing connection"
            );
            previous
                .close(CLOSE_SUPERSEDED, CLOSE_SUPERSEDED_REASON)
                .await;
        }

        conn.send(ServerMessage::connected(conn.user_id()));
        tracing::info!(
            user_id = %conn.user_id(),
            connection_id = %conn.id(),
            "Connection admitted"
        );
        (conn, rx)
    }

    /// Handles one inbound frame of `conn`.
    pub async fn handle_frame(&self, conn: &Connection, frame: InboundFrame) {
        if !self.admit_frame(conn).await {
            return;
        }
        self.router.route(conn, frame).await;
    }

    async fn admit_frame(&self, conn: &Connection) -> bool {
        let Some(limiter) = &self.frame_limiter else {
            return true;
        };
        match limiter.check(RateLimitKey::connection(conn.id())).await {
            Ok(RateLimitResult::Allowed(_)) => true,
            Ok(RateLimitResult::Denied(denied)) => {
                tracing::info!(
                    user_id = %conn.user_id(),
                    connection_id = %conn.id(),
                    retry_after_secs = denied.retry_after_secs,
                    "Frame rate limit exceeded"
                );
                conn.send(ServerMessage::error(denied.message()));
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rate limiter unavailable");
                true
            }
        }
    }

    /// Convenience for transports that only see text.
    pub async fn handle_text(&self, conn: &Connection, text: impl Into<String>) {
        self.handle_frame(conn, InboundFrame::Text(text.into())).await;
    }

    /// Forgets a connection whose socket went away. An open conversation
    /// stays open in storage; the user's next `start` auto-closes it.
    pub async fn disconnect(&self, conn: &Connection) {
        let removed = self.registry.remove(conn).await;
        let conversation_id = conn.conversation_id().await;
        tracing::info!(
            user_id = %conn.user_id(),
            connection_id = %conn.id(),
            was_current = removed,
            conversation_id = ?conversation_id,
            "Connection closed"
        );
    }

    /// Ends `conversation` on behalf of its owner.
    ///
    /// If the owner's live connection is in it, that connection ends it as
    /// if it had sent `end`. Otherwise it is summarized and closed without
    /// frames.
    pub async fn end_conversation(&self, conversation: &Conversation) -> Result<(), SessionError> {
        if let Some(conn) = self.registry.lookup(conversation.user_id()).await {
            if self
                .state_machine
                .end_if_bound(&conn, &conversation.id())
                .await?
            {
                return Ok(());
            }
        }
        self.state_machine.end_detached(conversation).await
    }

    /// Starts the heartbeat and inactivity timers. They stop when
    /// `shutdown` flips to true.
    pub fn spawn_timers(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let heartbeat = HeartbeatMonitor::new(self.registry.clone(), self.config.heartbeat_interval());
        let reaper = InactivityReaper::new(
            self.registry.clone(),
            self.state_machine.clone(),
            self.config.reaper_interval(),
            self.config.idle_threshold(),
        );

        let heartbeat_shutdown = shutdown.clone();
        vec![
            tokio::spawn(async move { heartbeat.run(heartbeat_shutdown).await }),
            tokio::spawn(async move { reaper.run(shutdown).await }),
        ]
    }
}
