//! HTTP middleware for axum.
//!
//! - `auth` - Bearer token authentication and the `RequireAuth` extractor
//! - `rate_limit` - per-user / per-address request windows

pub mod auth;
pub mod rate_limit;

pub use auth::{auth_middleware, bearer_token, AuthRejection, AuthState, RequireAuth};
pub use rate_limit::{rate_limit_middleware, RateLimiterState};
