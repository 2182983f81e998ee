//! Session error taxonomy.
//!
//! Every failure inside the session core maps to one of these kinds. Only
//! `Auth` at admission closes a socket; everything else becomes an `error`
//! frame and the connection keeps its prior state.

use thiserror::Error;

use crate::domain::foundation::{AuthError, DomainError, ErrorCode};
use crate::ports::ResponderError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Bad frame from the client: unknown kind, malformed payload, empty
    /// content, binary data.
    #[error("{0}")]
    Protocol(String),

    /// Token missing or invalid at admission.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Operation not valid in the current phase.
    #[error("{0}")]
    State(String),

    /// Storage or responder failed or timed out.
    #[error("{context}: {detail}")]
    Collaborator {
        /// Client-facing text.
        context: &'static str,
        /// Logged, never sent.
        detail: String,
    },

    /// Internal bookkeeping disagreed with itself.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl SessionError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    pub fn collaborator(context: &'static str, detail: impl ToString) -> Self {
        Self::Collaborator {
            context,
            detail: detail.to_string(),
        }
    }

    /// Maps a storage error. A closed conversation is a state problem, not
    /// a storage failure.
    pub fn from_storage(context: &'static str, error: DomainError) -> Self {
        match error.code() {
            ErrorCode::ConversationClosed => Self::state("Conversation has already ended"),
            ErrorCode::ConversationNotFound => Self::state("Conversation not found"),
            _ => Self::collaborator(context, error),
        }
    }

    pub fn from_responder(context: &'static str, error: ResponderError) -> Self {
        Self::collaborator(context, error)
    }

    /// Text carried by the `error` frame sent to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Protocol(message) | Self::State(message) => message.clone(),
            Self::Auth(error) => error.to_string(),
            Self::Collaborator { context, .. } => (*context).to_string(),
            Self::Invariant(_) => "Internal error".to_string(),
        }
    }

    /// Short kind label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::Auth(_) => "auth",
            Self::State(_) => "state",
            Self::Collaborator { .. } => "collaborator",
            Self::Invariant(_) => "invariant",
        }
    }
}
