//! Adapters - Implementations of port interfaces and the outer surfaces.
//!
//! - `ai` - responders (scripted mock, Gemini)
//! - `auth` - session validators (JWT, mock)
//! - `postgres` / `storage` - conversation repositories
//! - `rate_limiter` - request and frame rate limits
//! - `http` / `websocket` - the axum application

pub mod ai;
pub mod auth;
pub mod http;
pub mod postgres;
pub mod rate_limiter;
pub mod storage;
pub mod websocket;

pub use ai::{GeminiConfig, GeminiResponder, MockResponder};
pub use auth::{JwtSessionValidator, MockSessionValidator};
pub use http::{app_router, AppState};
pub use postgres::PostgresConversationRepository;
pub use rate_limiter::InMemoryRateLimiter;
pub use storage::InMemoryConversationRepository;
