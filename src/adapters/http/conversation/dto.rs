//! HTTP DTOs for conversation endpoints.
//!
//! These types decouple the HTTP API from domain types, allowing independent evolution.

use serde::{Deserialize, Serialize};

use crate::domain::conversation::{Conversation, Message};
use crate::ports::ConversationListing;

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// View of a conversation for API responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: String,
    pub scenario: Option<String>,
    pub start_time: String,
    /// Absent while the conversation is still open.
    pub end_time: Option<String>,
    pub summary: Option<String>,
    pub feedback: Option<String>,
}

impl From<&Conversation> for ConversationView {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id().to_string(),
            scenario: conversation.scenario().map(|s| s.as_str().to_string()),
            start_time: conversation.start_time().to_rfc3339(),
            end_time: conversation.end_time().map(|t| t.to_rfc3339()),
            summary: conversation.summary().map(str::to_string),
            feedback: conversation.feedback().map(str::to_string),
        }
    }
}

/// History entry: a conversation and how many messages it holds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListItem {
    #[serde(flatten)]
    pub conversation: ConversationView,
    pub message_count: usize,
}

impl From<&ConversationListing> for ConversationListItem {
    fn from(listing: &ConversationListing) -> Self {
        Self {
            conversation: ConversationView::from(&listing.conversation),
            message_count: listing.message_count,
        }
    }
}

/// View of a message for API responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    /// `user` or `responder`.
    pub sender: String,
    pub content: String,
    pub timestamp: String,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.to_string(),
            sender: message.sender.as_str().to_string(),
            content: message.content.clone(),
            timestamp: message.timestamp.to_rfc3339(),
        }
    }
}

/// A conversation together with its ordered transcript.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetailView {
    #[serde(flatten)]
    pub conversation: ConversationView,
    pub message_count: usize,
    pub messages: Vec<MessageView>,
}

/// Just the transcript of a conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessagesView {
    pub conversation_id: String,
    pub scenario: Option<String>,
    pub messages: Vec<MessageView>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Query parameters for the history listing.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryParams {
    /// Maximum conversations to return (default: 20, max: 100).
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

pub const MAX_HISTORY_LIMIT: u32 = 100;

impl HistoryParams {
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_HISTORY_LIMIT)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error DTO
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(resource_type: &str, id: &str) -> Self {
        Self {
            code: "NOT_FOUND".to_string(),
            message: format!("{} not found: {}", resource_type, id),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
        }
    }
}
