//! Session timing configuration
//!
//! Intervals for the heartbeat and inactivity sweeps, the idle threshold
//! after which an open conversation is force-ended, and the bound on each
//! storage or responder call made during a transition.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Session timing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Seconds between heartbeat pings
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds between inactivity sweeps
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,

    /// Seconds without application traffic before a conversation times out
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,

    /// Upper bound on one storage or responder call, in seconds
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,

    /// Inbound frames buffered per connection before the reader waits
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }

    /// Validate session configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ValidationError::ZeroInterval("heartbeat_interval_secs"));
        }
        if self.reaper_interval_secs == 0 {
            return Err(ValidationError::ZeroInterval("reaper_interval_secs"));
        }
        if self.collaborator_timeout_secs == 0 {
            return Err(ValidationError::ZeroInterval("collaborator_timeout_secs"));
        }
        if self.inbound_buffer == 0 {
            return Err(ValidationError::ZeroInterval("inbound_buffer"));
        }
        if self.idle_threshold_secs <= self.reaper_interval_secs {
            return Err(ValidationError::IdleThresholdTooShort);
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            reaper_interval_secs: default_reaper_interval(),
            idle_threshold_secs: default_idle_threshold(),
            collaborator_timeout_secs: default_collaborator_timeout(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_idle_threshold() -> u64 {
    30 * 60
}

fn default_collaborator_timeout() -> u64 {
    30
}

fn default_inbound_buffer() -> usize {
    32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.reaper_interval(), Duration::from_secs(60));
        assert_eq!(config.idle_threshold(), Duration::from_secs(1800));
        assert_eq!(config.collaborator_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config = SessionConfig {
            heartbeat_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::ZeroInterval("heartbeat_interval_secs"))
        );
    }

    #[test]
    fn test_idle_threshold_must_exceed_sweep_interval() {
        let config = SessionConfig {
            idle_threshold_secs: 60,
            reaper_interval_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::IdleThresholdTooShort));
    }
}
