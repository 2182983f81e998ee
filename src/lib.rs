//! Convo Coach - conversation practice sessions over WebSocket.
//!
//! Users connect with a token, start a scenario conversation, exchange
//! messages with a responder persona and get a summary with feedback when
//! they end it (or when it times out from inactivity).

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
