//! Conversation entity.
//!
//! A conversation is open while `end_time` is `None`. Closing is one-way:
//! once an end time is recorded it is never cleared.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, DomainError, ErrorCode, Timestamp, UserId};

use super::ScenarioTag;

/// Summary recorded for a conversation that was auto-closed by a new `start`.
pub const AUTO_CLOSED_SUMMARY: &str = "auto-closed: new session started";

/// Summary recorded for an open conversation no live session was attached to.
pub const ABANDONED_SUMMARY: &str = "auto-closed: session disconnected";

/// Summary recorded for a conversation whose opening could not be persisted.
pub const START_ABORTED_SUMMARY: &str = "aborted: conversation failed to start";

/// Suffix appended to the stored summary of a timed-out conversation.
pub const TIMEOUT_SUMMARY_SUFFIX: &str = " (Auto-ended due to inactivity)";

/// End-of-conversation assessment produced by the responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub summary: String,
    pub feedback: String,
}

impl ConversationSummary {
    pub fn new(summary: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            feedback: feedback.into(),
        }
    }
}

/// How a conversation was closed. Decides what gets stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closure {
    /// The user asked to end it.
    Completed(ConversationSummary),
    /// The inactivity reaper ended it.
    TimedOut(ConversationSummary),
    /// A new `start` found it still open.
    AutoClosed,
    /// Open with no live session past the idle threshold.
    Abandoned,
    /// Created by a `start` that failed before the opening line was stored.
    StartAborted,
}

impl Closure {
    /// Summary text as persisted.
    pub fn stored_summary(&self) -> String {
        match self {
            Closure::Completed(s) => s.summary.clone(),
            Closure::TimedOut(s) => format!("{}{}", s.summary, TIMEOUT_SUMMARY_SUFFIX),
            Closure::AutoClosed => AUTO_CLOSED_SUMMARY.to_string(),
            Closure::Abandoned => ABANDONED_SUMMARY.to_string(),
            Closure::StartAborted => START_ABORTED_SUMMARY.to_string(),
        }
    }

    /// Feedback text as persisted.
    pub fn stored_feedback(&self) -> Option<String> {
        match self {
            Closure::Completed(s) | Closure::TimedOut(s) => Some(s.feedback.clone()),
            Closure::AutoClosed | Closure::Abandoned | Closure::StartAborted => None,
        }
    }
}

/// A persisted practice conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    id: ConversationId,
    user_id: UserId,
    scenario: Option<ScenarioTag>,
    start_time: Timestamp,
    end_time: Option<Timestamp>,
    summary: Option<String>,
    feedback: Option<String>,
}

impl Conversation {
    /// Opens a new conversation for `user_id`.
    pub fn start(user_id: UserId, scenario: Option<ScenarioTag>, at: Timestamp) -> Self {
        Self {
            id: ConversationId::new(),
            user_id,
            scenario,
            start_time: at,
            end_time: None,
            summary: None,
            feedback: None,
        }
    }

    /// Rebuilds a conversation from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: ConversationId,
        user_id: UserId,
        scenario: Option<ScenarioTag>,
        start_time: Timestamp,
        end_time: Option<Timestamp>,
        summary: Option<String>,
        feedback: Option<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            scenario,
            start_time,
            end_time,
            summary,
            feedback,
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn scenario(&self) -> Option<&ScenarioTag> {
        self.scenario.as_ref()
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn end_time(&self) -> Option<Timestamp> {
        self.end_time
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Records the end of the conversation.
    ///
    /// # Errors
    ///
    /// `ConversationClosed` if an end time is already recorded.
    pub fn close(&mut self, at: Timestamp, closure: &Closure) -> Result<(), DomainError> {
        if !self.is_open() {
            return Err(DomainError::new(
                ErrorCode::ConversationClosed,
                "Conversation has already ended",
            )
            .with_detail("conversation_id", self.id.to_string()));
        }
        self.end_time = Some(at);
        self.summary = Some(closure.stored_summary());
        self.feedback = closure.stored_feedback();
        Ok(())
    }
}
