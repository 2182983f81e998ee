//! Liveness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::application::session::SessionManager;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
}

/// GET /health
pub async fn health(State(sessions): State<Arc<SessionManager>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        connections: sessions.registry().len().await,
    })
}
