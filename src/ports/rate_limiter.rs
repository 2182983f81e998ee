//! Rate limiting port.
//!
//! Fixed-window counters keyed by scope and identifier. The HTTP API is
//! limited per user (falling back to the client IP), and inbound WebSocket
//! frames are limited per connection.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::{ConnectionId, UserId};

/// Port for rate limiting operations.
///
/// Implementations must be safe to share between request handlers.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one request against `key` and reports whether it is allowed.
    async fn check(&self, key: RateLimitKey) -> Result<RateLimitResult, RateLimitError>;
}

/// What a counter is kept for.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RateLimitKey {
    pub scope: RateLimitScope,
    pub identifier: String,
}

/// Which limit applies to a key.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum RateLimitScope {
    /// Unauthenticated HTTP requests, by client address.
    Ip,
    /// Authenticated HTTP requests, by user.
    User,
    /// Inbound frames on one WebSocket connection.
    Connection,
}

impl RateLimitKey {
    pub fn ip(ip: &str) -> Self {
        Self {
            scope: RateLimitScope::Ip,
            identifier: ip.to_string(),
        }
    }

    pub fn user(user_id: &UserId) -> Self {
        Self {
            scope: RateLimitScope::User,
            identifier: user_id.to_string(),
        }
    }

    pub fn connection(connection_id: ConnectionId) -> Self {
        Self {
            scope: RateLimitScope::Connection,
            identifier: connection_id.to_string(),
        }
    }
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Ip => "ip",
            RateLimitScope::User => "user",
            RateLimitScope::Connection => "connection",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed(RateLimitStatus),
    Denied(RateLimitDenied),
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }
}

/// Quota left in the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Time until the current window resets.
    pub resets_in: Duration,
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDenied {
    pub limit: u32,
    /// Whole seconds until the window resets, at least 1.
    pub retry_after_secs: u64,
    pub scope: RateLimitScope,
}

impl RateLimitDenied {
    pub fn message(&self) -> String {
        format!(
            "Rate limit exceeded. Try again in {} seconds.",
            self.retry_after_secs
        )
    }
}

/// Errors that can occur during rate limiting operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Rate limiter backend is unavailable.
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),
}
