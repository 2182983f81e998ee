//! Conversation repository port.
//!
//! Defines the persistence operations the session manager relies on. The
//! core never issues queries beyond these; it owns no schema concerns beyond
//! the entity shapes.
//!
//! # Design
//!
//! - **Guarded close**: `close_if_open` only records an end time when none is
//!   set, so two racing closers cannot both win
//! - **Append-only messages**: messages are inserted, never updated
//! - **Ordered reads**: messages come back ordered by timestamp
//! - **Idle scan**: `list_idle_open` finds open conversations nobody has
//!   written to since a cutoff, for the stale-conversation sweep

use async_trait::async_trait;

use crate::domain::conversation::{Closure, Conversation, Message};
use crate::domain::foundation::{ConversationId, DomainError, Timestamp, UserId};

/// A conversation as listed in history, with its transcript length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationListing {
    pub conversation: Conversation,
    pub message_count: usize,
}

/// Repository port for conversations and their messages.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Save a new conversation.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn create(&self, conversation: &Conversation) -> Result<(), DomainError>;

    /// Find a conversation by its ID.
    ///
    /// Returns `None` if not found.
    async fn find_by_id(&self, id: &ConversationId) -> Result<Option<Conversation>, DomainError>;

    /// Find the conversation of `user_id` that has no end time, if any.
    async fn find_open_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Conversation>, DomainError>;

    /// Record the end of a conversation if it is still open.
    ///
    /// Returns `true` if this call closed it, `false` if it was already
    /// closed.
    ///
    /// # Errors
    ///
    /// - `ConversationNotFound` if the conversation doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn close_if_open(
        &self,
        id: &ConversationId,
        at: Timestamp,
        closure: &Closure,
    ) -> Result<bool, DomainError>;

    /// Append a message to its conversation.
    ///
    /// # Errors
    ///
    /// - `ConversationNotFound` if the conversation doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn append_message(&self, message: &Message) -> Result<(), DomainError>;

    /// All messages of a conversation, oldest first.
    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, DomainError>;

    /// Conversations of a user with their message counts, newest first,
    /// at most `limit`.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationListing>, DomainError>;

    /// Open conversations whose newest message (or start, when there is no
    /// message) is older than `cutoff`, oldest first, at most `limit`.
    async fn list_idle_open(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Conversation>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn ConversationRepository) {}
    }
}
