//! Session core.
//!
//! Authenticated WebSocket-style connections, one per user, each driving
//! at most one practice conversation at a time.
//!
//! - `SessionManager` - admission, routing and timers
//! - `ConversationStateMachine` - `start` / `message` / `end` / `timeout`
//! - `ConnectionRegistry` - the live connection of each user
//! - `HeartbeatMonitor` / `InactivityReaper` - periodic sweeps
//! - `protocol` - JSON frames exchanged with clients

mod connection;
mod errors;
mod heartbeat;
mod manager;
mod protocol;
mod reaper;
mod registry;
mod router;
mod state_machine;

pub use connection::{
    ActiveConversation, Connection, ConversationSlot, Outbound, CLOSE_INVALID_TOKEN,
    CLOSE_NO_TOKEN, CLOSE_SUPERSEDED, CLOSE_SUPERSEDED_REASON,
};
pub use errors::SessionError;
pub use heartbeat::HeartbeatMonitor;
pub use manager::{admission_close, SessionManager};
pub use protocol::{
    AiMessage, AiTypingMessage, ClientMessage, ConnectedMessage, ConversationEndedMessage,
    ConversationStartedMessage, ConversationTimeoutMessage, ErrorMessage, ServerMessage,
    TIMEOUT_NOTICE,
};
pub use reaper::InactivityReaper;
pub use registry::ConnectionRegistry;
pub use router::{InboundFrame, MessageRouter, BINARY_NOT_SUPPORTED};
pub use state_machine::{ConversationStateMachine, EndReason};
