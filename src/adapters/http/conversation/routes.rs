//! Axum routes for conversation endpoints.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{
    end_conversation, get_conversation, get_messages, list_conversations, ConversationAppState,
};

/// Routes, relative to `/api`:
/// - GET /conversations - caller's history, newest first, with message counts
/// - GET /conversations/:conversation_id - one conversation with messages
/// - GET /conversations/:conversation_id/messages - just the transcript
/// - POST /conversations/:conversation_id/end - summarize and close
pub fn conversation_routes() -> Router<ConversationAppState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/:conversation_id", get(get_conversation))
        .route("/conversations/:conversation_id/messages", get(get_messages))
        .route("/conversations/:conversation_id/end", post(end_conversation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_routes_creates_valid_router() {
        let _routes = conversation_routes();
    }
}
