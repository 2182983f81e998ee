//! HTTP adapter for conversation history endpoints and the REST `end`.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::{
    ConversationDetailView, ConversationListItem, ConversationMessagesView, ConversationView,
    ErrorResponse, MessageView,
};
pub use handlers::{ConversationApiError, ConversationAppState};
pub use routes::conversation_routes;
