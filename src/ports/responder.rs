//! Responder Port - Interface for reply and summary generation.
//!
//! The session manager only depends on this contract; whether replies come
//! from a scripted mock or a hosted model is an adapter concern.
//!
//! # Capabilities
//!
//! - `generate`: next reply given the user message, the ordered history and
//!   the scenario
//! - `summarize`: summary and feedback for a finished transcript
//!
//! Both calls are side-effect free from the caller's perspective. Callers
//! bound them with a timeout; adapters must not swallow their own failures
//! into canned text.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::conversation::{ConversationSummary, Message, ScenarioTag};

/// Port for producing responder text.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Produce the responder's next reply.
    async fn generate(&self, request: ReplyRequest) -> Result<String, ResponderError>;

    /// Produce a summary and feedback for a whole transcript.
    async fn summarize(&self, transcript: &[Message])
        -> Result<ConversationSummary, ResponderError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Input to [`Responder::generate`].
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// The message the user just sent.
    pub user_message: String,
    /// Full ordered history, including the user message as its last entry.
    pub history: Vec<Message>,
    /// Scenario selecting the persona.
    pub scenario: Option<ScenarioTag>,
}

/// Errors from responder adapters.
#[derive(Debug, Clone, Error)]
pub enum ResponderError {
    /// The backing service could not be reached.
    #[error("Responder unavailable: {0}")]
    Unavailable(String),

    /// The backing service answered with something unusable.
    #[error("Invalid responder output: {0}")]
    InvalidResponse(String),

    /// The backing service rejected our credentials.
    #[error("Responder authentication failed")]
    AuthenticationFailed,

    /// The backing service is throttling us.
    #[error("Responder rate limited")]
    RateLimited,
}

impl ResponderError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responder_is_object_safe() {
        fn _accepts_dyn(_responder: &dyn Responder) {}
    }

    #[test]
    fn error_messages_are_readable() {
        assert_eq!(
            ResponderError::unavailable("connection refused").to_string(),
            "Responder unavailable: connection refused"
        );
    }
}
