//! PostgreSQL implementation of ConversationRepository.
//!
//! Conversations and messages live in two tables; see `migrations/`.
//! `close_if_open` is a single guarded UPDATE so concurrent closers
//! cannot both win.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::domain::conversation::{Closure, Conversation, Message, ScenarioTag, Sender};
use crate::domain::foundation::{
    ConversationId, DomainError, ErrorCode, MessageId, Timestamp, UserId,
};
use crate::ports::{ConversationListing, ConversationRepository};

/// PostgreSQL implementation of ConversationRepository.
#[derive(Clone)]
pub struct PostgresConversationRepository {
    pool: PgPool,
}

impl PostgresConversationRepository {
    /// Creates a new PostgresConversationRepository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PostgresConversationRepository {
    async fn create(&self, conversation: &Conversation) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, user_id, scenario, start_time, end_time, summary, feedback
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(conversation.id().as_uuid())
        .bind(conversation.user_id().as_str())
        .bind(conversation.scenario().map(ScenarioTag::as_str))
        .bind(conversation.start_time().as_datetime())
        .bind(conversation.end_time().map(|t| *t.as_datetime()))
        .bind(conversation.summary())
        .bind(conversation.feedback())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert conversation: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ConversationId) -> Result<Option<Conversation>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, scenario, start_time, end_time, summary, feedback
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch conversation: {}", e)))?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn find_open_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Conversation>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, scenario, start_time, end_time, summary, feedback
            FROM conversations
            WHERE user_id = $1 AND end_time IS NULL
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::database(format!("Failed to fetch open conversation: {}", e))
        })?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn close_if_open(
        &self,
        id: &ConversationId,
        at: Timestamp,
        closure: &Closure,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations SET
                end_time = $2,
                summary = $3,
                feedback = $4
            WHERE id = $1 AND end_time IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(at.as_datetime())
        .bind(closure.stored_summary())
        .bind(closure.stored_feedback())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to close conversation: {}", e)))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Nothing updated: either already closed or unknown.
        match self.find_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(DomainError::new(
                ErrorCode::ConversationNotFound,
                "Conversation not found",
            )
            .with_detail("conversation_id", id.to_string())),
        }
    }

    async fn append_message(&self, message: &Message) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender, content, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(message.conversation_id.as_uuid())
        .bind(message.sender.as_str())
        .bind(&message.content)
        .bind(message.timestamp.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert message: {}", e)))?;

        Ok(())
    }

    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender, content, timestamp
            FROM messages
            WHERE conversation_id = $1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch messages: {}", e)))?;

        rows.iter().map(row_to_message).collect()
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationListing>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.user_id, c.scenario, c.start_time, c.end_time,
                   c.summary, c.feedback, COUNT(m.id) AS message_count
            FROM conversations c
            LEFT JOIN messages m ON m.conversation_id = c.id
            WHERE c.user_id = $1
            GROUP BY c.id
            ORDER BY c.start_time DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list conversations: {}", e)))?;

        rows.iter()
            .map(|row| {
                let message_count: i64 = row.get("message_count");
                Ok(ConversationListing {
                    conversation: row_to_conversation(row)?,
                    message_count: usize::try_from(message_count).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn list_idle_open(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Conversation>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.user_id, c.scenario, c.start_time, c.end_time,
                   c.summary, c.feedback
            FROM conversations c
            LEFT JOIN LATERAL (
                SELECT MAX(timestamp) AS last_at
                FROM messages
                WHERE conversation_id = c.id
            ) m ON TRUE
            WHERE c.end_time IS NULL
              AND COALESCE(m.last_at, c.start_time) < $1
            ORDER BY COALESCE(m.last_at, c.start_time) ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::database(format!("Failed to list idle conversations: {}", e))
        })?;

        rows.iter().map(row_to_conversation).collect()
    }
}

// === Row Mapping ===

fn row_to_conversation(row: &PgRow) -> Result<Conversation, DomainError> {
    let id: uuid::Uuid = row.get("id");
    let user_id: String = row.get("user_id");
    let scenario: Option<String> = row.get("scenario");
    let start_time: chrono::DateTime<chrono::Utc> = row.get("start_time");
    let end_time: Option<chrono::DateTime<chrono::Utc>> = row.get("end_time");
    let summary: Option<String> = row.get("summary");
    let feedback: Option<String> = row.get("feedback");

    Ok(Conversation::reconstitute(
        ConversationId::from_uuid(id),
        UserId::new(user_id)?,
        ScenarioTag::parse_optional(scenario.as_deref())?,
        Timestamp::from_datetime(start_time),
        end_time.map(Timestamp::from_datetime),
        summary,
        feedback,
    ))
}

fn row_to_message(row: &PgRow) -> Result<Message, DomainError> {
    let id: uuid::Uuid = row.get("id");
    let conversation_id: uuid::Uuid = row.get("conversation_id");
    let sender: &str = row.get("sender");
    let content: String = row.get("content");
    let timestamp: chrono::DateTime<chrono::Utc> = row.get("timestamp");

    Ok(Message {
        id: MessageId::from_uuid(id),
        conversation_id: ConversationId::from_uuid(conversation_id),
        sender: sender.parse::<Sender>()?,
        content,
        timestamp: Timestamp::from_datetime(timestamp),
    })
}
