//! Application layer - orchestrates the domain through the ports.
//!
//! The only use case is the live practice session; see [`session`].

pub mod session;

pub use session::{SessionError, SessionManager};
