//! WebSocket adapter for live practice sessions.
//!
//! ```text
//!   client ──frames──▶ reader ──queue──▶ dispatcher ──▶ SessionManager
//!      ▲                                                     │
//!      └────────────── writer ◀──── outbound queue ◀─────────┘
//! ```
//!
//! - [`handler`] - upgrade, admission and the per-connection tasks

pub mod handler;

pub use handler::{websocket_router, ws_handler, ConnectParams, WebSocketState};
