//! In-Memory Conversation Repository Adapter
//!
//! Stores conversations and messages in memory.
//! Useful for testing and local development without a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::conversation::{Closure, Conversation, Message};
use crate::domain::foundation::{
    ConversationId, DomainError, ErrorCode, Timestamp, UserId,
};
use crate::ports::{ConversationListing, ConversationRepository};

#[derive(Debug, Default)]
struct Tables {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
}

/// In-memory storage for conversations
#[derive(Debug, Clone, Default)]
pub struct InMemoryConversationRepository {
    tables: Arc<RwLock<Tables>>,
    failing: Arc<AtomicBool>,
    failing_appends: Arc<AtomicBool>,
}

impl InMemoryConversationRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a database error (or stop failing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only `append_message` fail (or stop failing).
    pub fn set_failing_appends(&self, failing: bool) {
        self.failing_appends.store(failing, Ordering::SeqCst);
    }

    /// All conversations, in no particular order
    pub async fn all_conversations(&self) -> Vec<Conversation> {
        self.tables.read().await.conversations.values().cloned().collect()
    }

    /// Number of conversations of `user_id` without an end time
    pub async fn open_count(&self, user_id: &UserId) -> usize {
        self.tables
            .read()
            .await
            .conversations
            .values()
            .filter(|c| c.user_id() == user_id && c.is_open())
            .count()
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::database("storage unavailable"));
        }
        Ok(())
    }
}

fn not_found(id: &ConversationId) -> DomainError {
    DomainError::new(ErrorCode::ConversationNotFound, "Conversation not found")
        .with_detail("conversation_id", id.to_string())
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(&self, conversation: &Conversation) -> Result<(), DomainError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        tables
            .conversations
            .insert(conversation.id(), conversation.clone());
        tables.messages.entry(conversation.id()).or_default();
        Ok(())
    }

    async fn find_by_id(&self, id: &ConversationId) -> Result<Option<Conversation>, DomainError> {
        self.check_available()?;
        Ok(self.tables.read().await.conversations.get(id).cloned())
    }

    async fn find_open_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Conversation>, DomainError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .values()
            .filter(|c| c.user_id() == user_id && c.is_open())
            .max_by_key(|c| c.start_time())
            .cloned())
    }

    async fn close_if_open(
        &self,
        id: &ConversationId,
        at: Timestamp,
        closure: &Closure,
    ) -> Result<bool, DomainError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let conversation = tables.conversations.get_mut(id).ok_or_else(|| not_found(id))?;
        if !conversation.is_open() {
            return Ok(false);
        }
        conversation.close(at, closure)?;
        Ok(true)
    }

    async fn append_message(&self, message: &Message) -> Result<(), DomainError> {
        self.check_available()?;
        if self.failing_appends.load(Ordering::SeqCst) {
            return Err(DomainError::database("message insert failed"));
        }
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(&message.conversation_id) {
            return Err(not_found(&message.conversation_id));
        }
        let messages = tables.messages.entry(message.conversation_id).or_default();
        messages.push(message.clone());
        messages.sort_by_key(|m| m.timestamp);
        Ok(())
    }

    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, DomainError> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .messages
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationListing>, DomainError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let mut listings: Vec<ConversationListing> = tables
            .conversations
            .values()
            .filter(|c| c.user_id() == user_id)
            .map(|c| ConversationListing {
                conversation: c.clone(),
                message_count: tables.messages.get(&c.id()).map_or(0, Vec::len),
            })
            .collect();
        listings.sort_by_key(|l| std::cmp::Reverse(l.conversation.start_time()));
        listings.truncate(limit as usize);
        Ok(listings)
    }

    async fn list_idle_open(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Conversation>, DomainError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let mut idle: Vec<(Timestamp, &Conversation)> = tables
            .conversations
            .values()
            .filter(|c| c.is_open())
            .map(|c| {
                let last = tables
                    .messages
                    .get(&c.id())
                    .and_then(|m| m.last())
                    .map_or(c.start_time(), |m| m.timestamp);
                (last, c)
            })
            .filter(|(last, _)| last.is_before(&cutoff))
            .collect();
        idle.sort_by_key(|(last, _)| *last);
        Ok(idle
            .into_iter()
            .take(limit as usize)
            .map(|(_, c)| c.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::{ConversationSummary, AUTO_CLOSED_SUMMARY};

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn finds_only_open_conversation_of_user() {
        let repo = InMemoryConversationRepository::new();
        let open = Conversation::start(user("a"), None, Timestamp::now());
        let other = Conversation::start(user("b"), None, Timestamp::now());
        repo.create(&open).await.unwrap();
        repo.create(&other).await.unwrap();

        let found = repo.find_open_for_user(&user("a")).await.unwrap().unwrap();
        assert_eq!(found.id(), open.id());
    }

    #[tokio::test]
    async fn close_if_open_only_wins_once() {
        let repo = InMemoryConversationRepository::new();
        let conversation = Conversation::start(user("a"), None, Timestamp::now());
        repo.create(&conversation).await.unwrap();

        let closure = Closure::Completed(ConversationSummary::new("s", "f"));
        assert!(repo
            .close_if_open(&conversation.id(), Timestamp::now(), &closure)
            .await
            .unwrap());
        assert!(!repo
            .close_if_open(&conversation.id(), Timestamp::now(), &Closure::AutoClosed)
            .await
            .unwrap());

        let stored = repo.find_by_id(&conversation.id()).await.unwrap().unwrap();
        assert_eq!(stored.summary(), Some("s"));
        assert_ne!(stored.summary(), Some(AUTO_CLOSED_SUMMARY));
    }

    #[tokio::test]
    async fn close_unknown_conversation_is_not_found() {
        let repo = InMemoryConversationRepository::new();
        let err = repo
            .close_if_open(&ConversationId::new(), Timestamp::now(), &Closure::AutoClosed)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConversationNotFound);
    }

    #[tokio::test]
    async fn messages_come_back_in_timestamp_order() {
        let repo = InMemoryConversationRepository::new();
        let conversation = Conversation::start(user("a"), None, Timestamp::now());
        repo.create(&conversation).await.unwrap();

        let first = Timestamp::now();
        let second = first.plus_micros(10);
        repo.append_message(&Message::from_responder(conversation.id(), "second", second))
            .await
            .unwrap();
        repo.append_message(&Message::from_user(conversation.id(), "first", first))
            .await
            .unwrap();

        let messages = repo.list_messages(&conversation.id()).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn append_to_missing_conversation_fails() {
        let repo = InMemoryConversationRepository::new();
        let message = Message::from_user(ConversationId::new(), "hi", Timestamp::now());
        assert!(repo.append_message(&message).await.is_err());
    }

    #[tokio::test]
    async fn list_for_user_is_newest_first_and_limited() {
        let repo = InMemoryConversationRepository::new();
        let base = Timestamp::now();
        for i in 0..3 {
            let conversation = Conversation::start(user("a"), None, base.plus_micros(i));
            repo.create(&conversation).await.unwrap();
        }

        let listed = repo.list_for_user(&user("a"), 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0]
            .conversation
            .start_time()
            .is_after(&listed[1].conversation.start_time()));
    }

    #[tokio::test]
    async fn list_for_user_counts_messages() {
        let repo = InMemoryConversationRepository::new();
        let base = Timestamp::now();
        let quiet = Conversation::start(user("a"), None, base);
        let chatty = Conversation::start(user("a"), None, base.plus_micros(1));
        repo.create(&quiet).await.unwrap();
        repo.create(&chatty).await.unwrap();
        for i in 0..3 {
            repo.append_message(&Message::from_user(chatty.id(), "hi", base.plus_micros(10 + i)))
                .await
                .unwrap();
        }

        let listed = repo.list_for_user(&user("a"), 10).await.unwrap();
        let counts: Vec<_> = listed.iter().map(|l| l.message_count).collect();
        assert_eq!(counts, vec![3, 0]);
    }

    #[tokio::test]
    async fn list_idle_open_uses_latest_message_time() {
        let repo = InMemoryConversationRepository::new();
        let now = Timestamp::now();
        let hour = std::time::Duration::from_secs(3600);
        let cutoff = now.minus(hour);

        // started long ago, still talking
        let active = Conversation::start(user("a"), None, now.minus(hour * 3));
        repo.create(&active).await.unwrap();
        repo.append_message(&Message::from_user(active.id(), "hi", now))
            .await
            .unwrap();

        // started long ago, silent since
        let older = Conversation::start(user("b"), None, now.minus(hour * 3));
        let stale = Conversation::start(user("c"), None, now.minus(hour * 2));
        repo.create(&stale).await.unwrap();
        repo.create(&older).await.unwrap();

        // silent but closed
        let closed = Conversation::start(user("d"), None, now.minus(hour * 4));
        repo.create(&closed).await.unwrap();
        repo.close_if_open(&closed.id(), now, &Closure::AutoClosed)
            .await
            .unwrap();

        let idle = repo.list_idle_open(cutoff, 10).await.unwrap();
        let ids: Vec<_> = idle.iter().map(Conversation::id).collect();
        assert_eq!(ids, vec![older.id(), stale.id()]);

        assert_eq!(repo.list_idle_open(cutoff, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_appends_leave_other_calls_working() {
        let repo = InMemoryConversationRepository::new();
        let conversation = Conversation::start(user("a"), None, Timestamp::now());
        repo.set_failing_appends(true);

        repo.create(&conversation).await.unwrap();
        let message = Message::from_user(conversation.id(), "hi", Timestamp::now());
        let err = repo.append_message(&message).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatabaseError);
        assert!(repo.list_messages(&conversation.id()).await.unwrap().is_empty());

        repo.set_failing_appends(false);
        repo.append_message(&message).await.unwrap();
    }

    #[tokio::test]
    async fn failing_mode_returns_database_errors() {
        let repo = InMemoryConversationRepository::new();
        repo.set_failing(true);
        let err = repo.find_open_for_user(&user("a")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatabaseError);
    }
}
