//! HTTP adapters - the axum application.
//!
//! - `GET /health` - liveness plus the number of live connections
//! - `GET /api/conversations[/:id[/messages]]` - conversation history (Bearer auth)
//! - `POST /api/conversations/:id/end` - end a conversation (Bearer auth)
//! - `GET /ws` - the practice session WebSocket, see `adapters::websocket`

pub mod conversation;
pub mod health;
pub mod middleware;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::{websocket_router, WebSocketState};
use crate::application::session::SessionManager;
use crate::config::ServerConfig;
use crate::ports::{ConversationRepository, RateLimiter, SessionValidator};

pub use conversation::{conversation_routes, ConversationAppState};
pub use middleware::{auth_middleware, rate_limit_middleware, RequireAuth};

/// Everything the HTTP surface needs.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub validator: Arc<dyn SessionValidator>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

/// Builds the full application router.
///
/// `/api` runs auth first, so the rate limit can key on the user.
pub fn app_router(state: AppState, server: &ServerConfig) -> Router {
    let api = conversation_routes()
        .with_state(ConversationAppState::new(
            state.conversations.clone(),
            state.sessions.clone(),
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.validator.clone(),
            auth_middleware,
        ))
        .layer(TimeoutLayer::new(server.request_timeout()));

    Router::new()
        .route("/health", get(health::health))
        .with_state(state.sessions.clone())
        .nest("/api", api)
        .merge(websocket_router().with_state(WebSocketState::new(state.sessions)))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&server.cors_origins_list()))
}

/// Any origin when none are configured, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
