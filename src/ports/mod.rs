//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the session core and the outside world. Adapters implement these ports.
//!
//! - `ConversationRepository` - conversations and messages storage
//! - `Responder` - reply and summary generation
//! - `SessionValidator` - access token validation
//! - `RateLimiter` - request and frame rate limits

mod conversation_repository;
mod rate_limiter;
mod responder;
mod session_validator;

pub use conversation_repository::{ConversationListing, ConversationRepository};
pub use rate_limiter::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitScope,
    RateLimitStatus, RateLimiter,
};
pub use responder::{ReplyRequest, Responder, ResponderError};
pub use session_validator::SessionValidator;
