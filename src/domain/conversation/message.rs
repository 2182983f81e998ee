//! Persisted conversation messages.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{ConversationId, MessageId, Timestamp, ValidationError};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Responder,
}

impl Sender {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Responder => "responder",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sender {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "responder" => Ok(Sender::Responder),
            other => Err(ValidationError::invalid_format(
                "sender",
                format!("unknown sender '{}'", other),
            )),
        }
    }
}

/// A single, append-only message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub content: String,
    pub timestamp: Timestamp,
}

impl Message {
    /// Creates a message stamped at `timestamp`.
    pub fn new(
        conversation_id: ConversationId,
        sender: Sender,
        content: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            sender,
            content: content.into(),
            timestamp,
        }
    }

    /// Creates a user-authored message.
    pub fn from_user(
        conversation_id: ConversationId,
        content: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self::new(conversation_id, Sender::User, content, timestamp)
    }

    /// Creates a responder-authored message.
    pub fn from_responder(
        conversation_id: ConversationId,
        content: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self::new(conversation_id, Sender::Responder, content, timestamp)
    }

    pub fn is_from_user(&self) -> bool {
        self.sender == Sender::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_parses_storage_values() {
        assert_eq!("user".parse::<Sender>().unwrap(), Sender::User);
        assert_eq!("responder".parse::<Sender>().unwrap(), Sender::Responder);
        assert!("ai".parse::<Sender>().is_err());
    }

    #[test]
    fn sender_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Sender::Responder).unwrap(), "\"responder\"");
    }

    #[test]
    fn constructors_set_sender() {
        let conversation_id = ConversationId::new();
        let now = Timestamp::now();
        assert!(Message::from_user(conversation_id, "hi", now).is_from_user());
        assert!(!Message::from_responder(conversation_id, "hello", now).is_from_user());
    }
}
