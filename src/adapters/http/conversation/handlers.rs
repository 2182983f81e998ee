//! HTTP handlers for conversation endpoints.
//!
//! Conversations are created over the WebSocket. They can be read here, and
//! ended here as well as over the socket.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::session::{SessionError, SessionManager};
use crate::domain::conversation::Conversation;
use crate::domain::foundation::{ConversationId, UserId};
use crate::ports::ConversationRepository;

use super::dto::{
    ConversationDetailView, ConversationListItem, ConversationMessagesView, ConversationView,
    ErrorResponse, HistoryParams, MessageView,
};
use crate::adapters::http::middleware::RequireAuth;

const ALREADY_ENDED: &str = "Conversation already ended";

/// Shared state for conversation handlers.
#[derive(Clone)]
pub struct ConversationAppState {
    pub conversation_repo: Arc<dyn ConversationRepository>,
    pub sessions: Arc<SessionManager>,
}

impl ConversationAppState {
    pub fn new(conversation_repo: Arc<dyn ConversationRepository>, sessions: Arc<SessionManager>) -> Self {
        Self {
            conversation_repo,
            sessions,
        }
    }

    /// The caller's conversation `raw_id`; foreign ones are reported as
    /// missing.
    async fn owned(&self, user_id: &UserId, raw_id: &str) -> Result<Conversation, ConversationApiError> {
        let id: ConversationId = raw_id
            .parse()
            .map_err(|_| ConversationApiError::BadRequest("Invalid conversation ID format".to_string()))?;

        self.conversation_repo
            .find_by_id(&id)
            .await
            .map_err(|e| ConversationApiError::Internal(e.to_string()))?
            .filter(|c| c.user_id() == user_id)
            .ok_or_else(|| ConversationApiError::NotFound("Conversation".to_string(), id.to_string()))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// GET /api/conversations
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/conversations - The caller's conversations, newest first.
///
/// # Query Parameters
/// - `limit`: Maximum conversations to return (default: 20, max: 100)
pub async fn list_conversations(
    State(state): State<ConversationAppState>,
    RequireAuth(user_id): RequireAuth,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ConversationApiError> {
    let listings = state
        .conversation_repo
        .list_for_user(&user_id, params.effective_limit())
        .await
        .map_err(|e| ConversationApiError::Internal(e.to_string()))?;

    let views: Vec<ConversationListItem> = listings.iter().map(ConversationListItem::from).collect();
    Ok((StatusCode::OK, Json(views)))
}

// ════════════════════════════════════════════════════════════════════════════════
// GET /api/conversations/:conversation_id
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/conversations/:id - One conversation with its ordered messages.
///
/// # Errors
/// - 400 Bad Request: Malformed id
/// - 401 Unauthorized: No valid auth token
/// - 404 Not Found: Unknown id, or owned by another user
pub async fn get_conversation(
    State(state): State<ConversationAppState>,
    RequireAuth(user_id): RequireAuth,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ConversationApiError> {
    let conversation = state.owned(&user_id, &conversation_id).await?;

    let messages = state
        .conversation_repo
        .list_messages(&conversation.id())
        .await
        .map_err(|e| ConversationApiError::Internal(e.to_string()))?;

    let view = ConversationDetailView {
        conversation: ConversationView::from(&conversation),
        message_count: messages.len(),
        messages: messages.iter().map(MessageView::from).collect(),
    };
    Ok((StatusCode::OK, Json(view)))
}

// ════════════════════════════════════════════════════════════════════════════════
// GET /api/conversations/:conversation_id/messages
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/conversations/:id/messages - The ordered transcript only.
///
/// Same errors as `get_conversation`.
pub async fn get_messages(
    State(state): State<ConversationAppState>,
    RequireAuth(user_id): RequireAuth,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ConversationApiError> {
    let conversation = state.owned(&user_id, &conversation_id).await?;

    let messages = state
        .conversation_repo
        .list_messages(&conversation.id())
        .await
        .map_err(|e| ConversationApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        Json(ConversationMessagesView {
            conversation_id: conversation.id().to_string(),
            scenario: conversation.scenario().map(|s| s.as_str().to_string()),
            messages: messages.iter().map(MessageView::from).collect(),
        }),
    ))
}

// ════════════════════════════════════════════════════════════════════════════════
// POST /api/conversations/:conversation_id/end
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/conversations/:id/end - Summarize and close a conversation.
///
/// If the caller's live socket is in this conversation it receives the
/// usual closing line and `conversation_ended` frame.
///
/// # Errors
/// - 400 Bad Request: Malformed id, or the conversation already ended
/// - 401 Unauthorized: No valid auth token
/// - 404 Not Found: Unknown id, or owned by another user
/// - 500 Internal Server Error: Storage or responder failure
pub async fn end_conversation(
    State(state): State<ConversationAppState>,
    RequireAuth(user_id): RequireAuth,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ConversationApiError> {
    let conversation = state.owned(&user_id, &conversation_id).await?;
    if !conversation.is_open() {
        return Err(ConversationApiError::BadRequest(ALREADY_ENDED.to_string()));
    }

    state
        .sessions
        .end_conversation(&conversation)
        .await
        .map_err(|e| match e {
            SessionError::State(_) => ConversationApiError::BadRequest(ALREADY_ENDED.to_string()),
            other => ConversationApiError::Internal(other.to_string()),
        })?;

    let ended = state.owned(&user_id, &conversation_id).await?;
    Ok((StatusCode::OK, Json(ConversationView::from(&ended))))
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationApiError {
    BadRequest(String),
    NotFound(String, String),
    Internal(String),
}

impl IntoResponse for ConversationApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ConversationApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::bad_request(msg))
            }
            ConversationApiError::NotFound(resource, id) => {
                (StatusCode::NOT_FOUND, ErrorResponse::not_found(&resource, &id))
            }
            ConversationApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::internal("An internal error occurred"))
            }
        };

        (status, Json(error)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockResponder;
    use crate::adapters::auth::MockSessionValidator;
    use crate::adapters::storage::InMemoryConversationRepository;
    use crate::config::SessionConfig;
    use crate::domain::conversation::Message;
    use crate::domain::foundation::Timestamp;
    use crate::ports::ResponderError;

    fn alice() -> UserId {
        UserId::new("alice").unwrap()
    }

    struct Seeded {
        state: ConversationAppState,
        repo: InMemoryConversationRepository,
        responder: MockResponder,
        id: ConversationId,
    }

    async fn seeded() -> Seeded {
        let repo = InMemoryConversationRepository::new();
        let responder = MockResponder::new();
        let started = Timestamp::now();
        let conversation = Conversation::start(alice(), None, started);
        repo.create(&conversation).await.unwrap();
        repo.append_message(&Message::from_responder(conversation.id(), "Hi!", started))
            .await
            .unwrap();
        repo.append_message(&Message::from_user(conversation.id(), "Hello", started.plus_micros(1)))
            .await
            .unwrap();

        let sessions = Arc::new(SessionManager::new(
            Arc::new(repo.clone()),
            Arc::new(responder.clone()),
            Arc::new(MockSessionValidator::new()),
            SessionConfig::default(),
        ));
        Seeded {
            state: ConversationAppState::new(Arc::new(repo.clone()), sessions),
            repo,
            responder,
            id: conversation.id(),
        }
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn owner_gets_conversation_with_messages() {
        let s = seeded().await;

        let response = get_conversation(State(s.state), RequireAuth(alice()), Path(s.id.to_string()))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["messageCount"], 2);
    }

    #[tokio::test]
    async fn other_user_gets_not_found() {
        let s = seeded().await;

        let result = get_conversation(
            State(s.state),
            RequireAuth(UserId::new("mallory").unwrap()),
            Path(s.id.to_string()),
        )
        .await;
        assert!(matches!(result, Err(ConversationApiError::NotFound(_, _))));
    }

    #[tokio::test]
    async fn malformed_id_is_bad_request() {
        let s = seeded().await;

        let result = get_conversation(State(s.state), RequireAuth(alice()), Path("nope".to_string())).await;
        assert!(matches!(result, Err(ConversationApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn history_lists_callers_conversations_with_counts() {
        let s = seeded().await;

        let response = list_conversations(
            State(s.state.clone()),
            RequireAuth(alice()),
            Query(HistoryParams { limit: 20 }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = json(response).await;
        assert_eq!(listed[0]["id"], s.id.to_string());
        assert_eq!(listed[0]["messageCount"], 2);

        let response = list_conversations(
            State(s.state),
            RequireAuth(UserId::new("mallory").unwrap()),
            Query(HistoryParams { limit: 20 }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn messages_endpoint_returns_transcript_only() {
        let s = seeded().await;

        let response = get_messages(State(s.state.clone()), RequireAuth(alice()), Path(s.id.to_string()))
            .await
            .unwrap()
            .into_response();
        let body = json(response).await;
        assert_eq!(body["conversationId"], s.id.to_string());
        assert!(body["scenario"].is_null());
        let contents: Vec<_> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(contents, vec!["Hi!", "Hello"]);

        let result = get_messages(
            State(s.state),
            RequireAuth(UserId::new("mallory").unwrap()),
            Path(s.id.to_string()),
        )
        .await;
        assert!(matches!(result, Err(ConversationApiError::NotFound(_, _))));
    }

    #[tokio::test]
    async fn end_closes_conversation_then_reports_already_ended() {
        let s = seeded().await;

        let response = end_conversation(State(s.state.clone()), RequireAuth(alice()), Path(s.id.to_string()))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["id"], s.id.to_string());
        assert!(body["endTime"].is_string());
        assert!(body["feedback"].is_string());
        assert!(!s.repo.find_by_id(&s.id).await.unwrap().unwrap().is_open());

        let result = end_conversation(State(s.state), RequireAuth(alice()), Path(s.id.to_string())).await;
        assert_eq!(
            result.err(),
            Some(ConversationApiError::BadRequest(ALREADY_ENDED.to_string()))
        );
    }

    #[tokio::test]
    async fn end_of_foreign_conversation_is_not_found() {
        let s = seeded().await;

        let result = end_conversation(
            State(s.state),
            RequireAuth(UserId::new("mallory").unwrap()),
            Path(s.id.to_string()),
        )
        .await;
        assert!(matches!(result, Err(ConversationApiError::NotFound(_, _))));
        assert!(s.repo.find_by_id(&s.id).await.unwrap().unwrap().is_open());
    }

    #[tokio::test]
    async fn end_with_failing_summary_is_internal_and_keeps_conversation_open() {
        let s = seeded().await;
        s.responder
            .fail_next_summarize(ResponderError::unavailable("model down"));

        let result = end_conversation(State(s.state), RequireAuth(alice()), Path(s.id.to_string())).await;
        assert!(matches!(result, Err(ConversationApiError::Internal(_))));
        assert!(s.repo.find_by_id(&s.id).await.unwrap().unwrap().is_open());
    }

    #[test]
    fn internal_error_hides_detail() {
        let response = ConversationApiError::Internal("pool timed out".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
