//! Responder Adapters.
//!
//! Implementations of the `Responder` port.
//!
//! ## Available Adapters
//!
//! - `MockResponder` - scripted persona replies and heuristic summaries
//! - `GeminiResponder` - Google Generative Language API

mod gemini_responder;
mod mock_responder;

pub use gemini_responder::{GeminiConfig, GeminiResponder};
pub use mock_responder::{heuristic_summary, scripted_reply, MockResponder};
