//! Domain layer - pure types and rules with no I/O.
//!
//! - `foundation` - identifiers, timestamps, errors, state machine trait
//! - `conversation` - conversations, messages, scenarios, session phase

pub mod conversation;
pub mod foundation;
