//! Wire protocol between clients and the session core.
//!
//! Every frame is a JSON object with a `type` tag; fields are camelCase.
//!
//! - Client → Server: `start`, `message`, `end`
//! - Server → Client: `connected`, `conversation_started`, `ai_message`,
//!   `ai_typing`, `conversation_ended`, `conversation_timeout`, `error`

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, Timestamp, UserId};

use super::errors::SessionError;

/// Text of the `conversation_timeout` notice.
pub const TIMEOUT_NOTICE: &str = "Conversation ended due to inactivity";

const KNOWN_KINDS: &[&str] = &["start", "message", "end"];

// ============================================
// Client → Server Messages
// ============================================

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a conversation, optionally for a scenario.
    Start {
        #[serde(default)]
        scenario: Option<String>,
    },

    /// Send one user message.
    Message { content: String },

    /// Finish the current conversation.
    End,
}

impl ClientMessage {
    /// Kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Message { .. } => "message",
            Self::End => "end",
        }
    }

    /// Decodes one text frame.
    ///
    /// Unknown kinds and malformed payloads are reported separately so the
    /// client can tell a typo in `type` from a bad field.
    pub fn decode(text: &str) -> Result<Self, SessionError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| SessionError::protocol(format!("Invalid message format: {}", e)))?;

        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                SessionError::protocol("Invalid message format: missing string field `type`")
            })?;

        if !KNOWN_KINDS.contains(&kind) {
            return Err(SessionError::protocol(format!("Unknown message type: {}", kind)));
        }

        serde_json::from_value(value)
            .map_err(|e| SessionError::protocol(format!("Invalid message format: {}", e)))
    }
}

// ============================================
// Server → Client Messages
// ============================================

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected(ConnectedMessage),
    ConversationStarted(ConversationStartedMessage),
    AiMessage(AiMessage),
    AiTyping(AiTypingMessage),
    ConversationEnded(ConversationEndedMessage),
    ConversationTimeout(ConversationTimeoutMessage),
    Error(ErrorMessage),
}

/// Sent once the connection is admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStartedMessage {
    pub conversation_id: String,
    pub scenario: Option<String>,
}

/// A responder line, stamped with its persisted timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiMessage {
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiTypingMessage {
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEndedMessage {
    pub summary: String,
    pub feedback: String,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTimeoutMessage {
    pub message: String,
    pub summary: String,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}

impl ServerMessage {
    pub fn connected(user_id: &UserId) -> Self {
        Self::Connected(ConnectedMessage {
            user_id: user_id.to_string(),
        })
    }

    pub fn conversation_started(id: ConversationId, scenario: Option<&str>) -> Self {
        Self::ConversationStarted(ConversationStartedMessage {
            conversation_id: id.to_string(),
            scenario: scenario.map(str::to_string),
        })
    }

    pub fn ai_message(content: impl Into<String>, timestamp: &Timestamp) -> Self {
        Self::AiMessage(AiMessage {
            content: content.into(),
            timestamp: timestamp.to_rfc3339(),
        })
    }

    pub fn ai_typing(is_typing: bool) -> Self {
        Self::AiTyping(AiTypingMessage { is_typing })
    }

    pub fn conversation_ended(
        summary: impl Into<String>,
        feedback: impl Into<String>,
        message_count: usize,
    ) -> Self {
        Self::ConversationEnded(ConversationEndedMessage {
            summary: summary.into(),
            feedback: feedback.into(),
            message_count,
        })
    }

    pub fn conversation_timeout(summary: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self::ConversationTimeout(ConversationTimeoutMessage {
            message: TIMEOUT_NOTICE.to_string(),
            summary: summary.into(),
            feedback: feedback.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            message: message.into(),
        })
    }

    /// Kind label for logs and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::ConversationStarted(_) => "conversation_started",
            Self::AiMessage(_) => "ai_message",
            Self::AiTyping(_) => "ai_typing",
            Self::ConversationEnded(_) => "conversation_ended",
            Self::ConversationTimeout(_) => "conversation_timeout",
            Self::Error(_) => "error",
        }
    }

    /// Serializes for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_kinds() {
        assert_eq!(
            ClientMessage::decode(r#"{"type":"start","scenario":"coffee-shop"}"#).unwrap(),
            ClientMessage::Start {
                scenario: Some("coffee-shop".to_string())
            }
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"start"}"#).unwrap(),
            ClientMessage::Start { scenario: None }
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"message","content":"hi"}"#).unwrap(),
            ClientMessage::Message {
                content: "hi".to_string()
            }
        );
        assert_eq!(ClientMessage::decode(r#"{"type":"end"}"#).unwrap(), ClientMessage::End);
    }

    #[test]
    fn unknown_kind_is_named() {
        let err = ClientMessage::decode(r#"{"type":"dance"}"#).unwrap_err();
        assert_eq!(err.client_message(), "Unknown message type: dance");
    }

    #[test]
    fn malformed_payloads_are_invalid_format() {
        for raw in ["not json", r#"{"content":"x"}"#, r#"{"type":"message"}"#, r#"{"type":7}"#] {
            let err = ClientMessage::decode(raw).unwrap_err();
            assert!(
                err.client_message().starts_with("Invalid message format"),
                "{raw} gave {err:?}"
            );
        }
    }

    #[test]
    fn server_messages_use_type_tag_and_camel_case() {
        let started = serde_json::to_value(ServerMessage::conversation_started(
            ConversationId::new(),
            Some("coffee-shop"),
        ))
        .unwrap();
        assert_eq!(started["type"], "conversation_started");
        assert!(started.get("conversationId").is_some());

        let ended = serde_json::to_value(ServerMessage::conversation_ended("s", "f", 4)).unwrap();
        assert_eq!(
            ended,
            json!({"type": "conversation_ended", "summary": "s", "feedback": "f", "messageCount": 4})
        );

        let typing = serde_json::to_value(ServerMessage::ai_typing(true)).unwrap();
        assert_eq!(typing, json!({"type": "ai_typing", "isTyping": true}));
    }

    #[test]
    fn timeout_frame_carries_notice() {
        let frame = serde_json::to_value(ServerMessage::conversation_timeout("s", "f")).unwrap();
        assert_eq!(frame["message"], TIMEOUT_NOTICE);
    }
}
