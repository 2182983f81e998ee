//! Conversation domain: persisted conversations, their messages, scenario
//! personas and the per-connection session phase.

mod conversation;
mod message;
mod scenario;
mod state;

pub use conversation::{
    Closure, Conversation, ConversationSummary, ABANDONED_SUMMARY, AUTO_CLOSED_SUMMARY,
    START_ABORTED_SUMMARY, TIMEOUT_SUMMARY_SUFFIX,
};
pub use message::{Message, Sender};
pub use scenario::{Persona, ScenarioTag};
pub use state::SessionPhase;
