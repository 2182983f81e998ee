//! Responder configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Responder configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ResponderConfig {
    /// Which responder backs the conversations
    #[serde(default)]
    pub provider: ResponderProvider,

    /// Gemini API key (required when `provider = gemini`)
    pub gemini_api_key: Option<Secret<String>>,

    /// Gemini model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Gemini API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP timeout for model calls in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Simulated latency of the mock responder in milliseconds
    #[serde(default)]
    pub mock_delay_ms: u64,
}

/// Responder backend
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponderProvider {
    #[default]
    Mock,
    Gemini,
}

impl ResponderConfig {
    /// Get HTTP timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get mock latency as Duration
    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }

    /// Check if a Gemini key is configured
    pub fn has_gemini_key(&self) -> bool {
        self.gemini_api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty())
    }

    /// Validate responder configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.provider == ResponderProvider::Gemini {
            if !self.has_gemini_key() {
                return Err(ValidationError::MissingRequired("RESPONDER__GEMINI_API_KEY"));
            }
            if self.model.trim().is_empty() {
                return Err(ValidationError::MissingRequired("RESPONDER__MODEL"));
            }
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            provider: ResponderProvider::default(),
            gemini_api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            mock_delay_ms: 0,
        }
    }
}

fn default_model() -> String {
    "gemini-pro".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout() -> u64 {
    25
}
