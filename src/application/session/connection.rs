//! One live client connection as the session core sees it.
//!
//! A connection owns three independent pieces of state:
//!
//! - the outbound queue drained by the transport's writer task
//! - liveness and activity bookkeeping behind a short-lived mutex
//! - the conversation slot behind the transition lock, held for the
//!   whole of a `start`, `message`, `end` or `timeout` transition
//!
//! The liveness mutex is never held across an await on I/O, so the
//! heartbeat and reaper can read it while a slow transition is running.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::time::Instant;

use crate::domain::conversation::{ScenarioTag, SessionPhase};
use crate::domain::foundation::{ConnectionId, ConversationId, Timestamp, UserId};

use super::protocol::ServerMessage;

/// Close code sent when a newer connection of the same user takes over.
pub const CLOSE_SUPERSEDED: u16 = 4003;
pub const CLOSE_SUPERSEDED_REASON: &str = "New Connection established";

/// Close code sent when no token accompanied the upgrade.
pub const CLOSE_NO_TOKEN: u16 = 4001;

/// Close code sent when the token did not validate.
pub const CLOSE_INVALID_TOKEN: u16 = 4002;

/// Instructions for the transport's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialize and send as a text frame.
    Frame(ServerMessage),
    /// Send a protocol-level ping.
    Ping,
    /// Send a close frame, then stop.
    Close { code: u16, reason: String },
    /// Drop the socket without a close handshake.
    Terminate,
}

#[derive(Debug)]
struct Liveness {
    is_alive: bool,
    last_seen: Instant,
    last_activity: Instant,
    conversation_id: Option<ConversationId>,
    closed: bool,
}

/// The open conversation bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConversation {
    pub id: ConversationId,
    pub scenario: Option<ScenarioTag>,
    /// Timestamp of the newest persisted message, used to keep message
    /// timestamps strictly increasing.
    pub last_message_at: Option<Timestamp>,
    /// The persona's closing line is already persisted. Set when an `end`
    /// gets past the closing line but fails later.
    pub closing_sent: bool,
}

/// Phase plus the conversation it refers to. Guarded by the transition lock.
#[derive(Debug, Default)]
pub struct ConversationSlot {
    pub phase: SessionPhase,
    pub conversation: Option<ActiveConversation>,
}

impl ConversationSlot {
    /// Forgets the conversation and returns to `Idle`.
    pub fn reset(&mut self) {
        self.phase = SessionPhase::Idle;
        self.conversation = None;
    }
}

/// A connection admitted to the session manager.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    outbound: mpsc::UnboundedSender<Outbound>,
    liveness: Mutex<Liveness>,
    slot: Mutex<ConversationSlot>,
}

impl Connection {
    /// Creates a connection and the receiving end of its outbound queue.
    pub fn new(user_id: UserId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let now = Instant::now();
        let connection = Self {
            id: ConnectionId::new(),
            user_id,
            outbound,
            liveness: Mutex::new(Liveness {
                is_alive: true,
                last_seen: now,
                last_activity: now,
                conversation_id: None,
                closed: false,
            }),
            slot: Mutex::new(ConversationSlot::default()),
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queues a frame. Returns false once the writer has gone away.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(Outbound::Frame(message)).is_ok()
    }

    pub fn ping(&self) -> bool {
        self.outbound.send(Outbound::Ping).is_ok()
    }

    /// Queues a close frame and marks the connection closed.
    pub async fn close(&self, code: u16, reason: impl Into<String>) {
        self.liveness.lock().await.closed = true;
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.into(),
        });
    }

    /// Drops the socket without a close handshake.
    pub async fn terminate(&self) {
        self.liveness.lock().await.closed = true;
        let _ = self.outbound.send(Outbound::Terminate);
    }

    pub async fn is_closed(&self) -> bool {
        self.liveness.lock().await.closed || self.outbound.is_closed()
    }

    /// Any inbound traffic, pongs included, proves the peer is alive.
    pub async fn mark_alive(&self) {
        let mut liveness = self.liveness.lock().await;
        liveness.is_alive = true;
        liveness.last_seen = Instant::now();
    }

    /// A decoded application frame arrived.
    pub async fn touch_activity(&self) {
        let mut liveness = self.liveness.lock().await;
        let now = Instant::now();
        liveness.is_alive = true;
        liveness.last_seen = now;
        liveness.last_activity = now;
    }

    /// Heartbeat step: returns whether the peer answered since the last
    /// ping and clears the flag for the next one.
    pub async fn take_alive(&self) -> bool {
        let mut liveness = self.liveness.lock().await;
        std::mem::replace(&mut liveness.is_alive, false)
    }

    pub async fn last_seen(&self) -> Instant {
        self.liveness.lock().await.last_seen
    }

    /// Time since the last application frame or conversation start.
    pub async fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.liveness.lock().await.last_activity)
    }

    /// Conversation id as last published by a transition.
    pub async fn conversation_id(&self) -> Option<ConversationId> {
        self.liveness.lock().await.conversation_id
    }

    pub(crate) async fn publish_conversation(&self, id: Option<ConversationId>) {
        self.liveness.lock().await.conversation_id = id;
    }

    /// Acquires the transition lock.
    pub(crate) async fn lock_slot(&self) -> MutexGuard<'_, ConversationSlot> {
        self.slot.lock().await
    }

    /// Current phase. Waits for any in-flight transition to finish.
    pub async fn phase(&self) -> SessionPhase {
        self.slot.lock().await.phase
    }
}
