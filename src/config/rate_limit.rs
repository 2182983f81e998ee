//! Rate limit configuration
//!
//! Fixed windows for the HTTP API (per user, or per client address when
//! unauthenticated) and for inbound frames on one WebSocket connection.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Rate limit configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Turns every limit off when false
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// HTTP requests allowed per window, per user or client address
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,

    /// Length of the HTTP window in seconds
    #[serde(default = "default_api_window")]
    pub api_window_secs: u64,

    /// Inbound WebSocket frames allowed per window, per connection
    #[serde(default = "default_ws_frames")]
    pub ws_frames_per_window: u32,

    /// Length of the WebSocket window in seconds
    #[serde(default = "default_ws_window")]
    pub ws_window_secs: u64,
}

impl RateLimitConfig {
    pub fn api_window(&self) -> Duration {
        Duration::from_secs(self.api_window_secs)
    }

    pub fn ws_window(&self) -> Duration {
        Duration::from_secs(self.ws_window_secs)
    }

    /// Validate rate limit configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }
        if self.api_window_secs == 0 {
            return Err(ValidationError::ZeroInterval("api_window_secs"));
        }
        if self.ws_window_secs == 0 {
            return Err(ValidationError::ZeroInterval("ws_window_secs"));
        }
        if self.api_requests_per_window == 0 || self.ws_frames_per_window == 0 {
            return Err(ValidationError::ZeroRateLimit);
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            api_requests_per_window: default_api_requests(),
            api_window_secs: default_api_window(),
            ws_frames_per_window: default_ws_frames(),
            ws_window_secs: default_ws_window(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_api_requests() -> u32 {
    100
}

fn default_api_window() -> u64 {
    60
}

fn default_ws_frames() -> u32 {
    30
}

fn default_ws_window() -> u64 {
    60
}
