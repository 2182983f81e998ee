//! Gemini Responder - Responder backed by Google's Generative Language API.
//!
//! # Configuration
//!
//! ```ignore
//! let config = GeminiConfig::new(api_key)
//!     .with_model("gemini-pro")
//!     .with_timeout(Duration::from_secs(25));
//!
//! let responder = GeminiResponder::new(config)?;
//! ```
//!
//! Replies are requested with the persona's system prompt followed by the
//! transcript rendered as `User:` / `AI:` lines. Summaries are requested as
//! a JSON object with `summary` and `feedback` fields. Failures propagate
//! to the caller unchanged; there is no fallback to scripted text.

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::conversation::{ConversationSummary, Message, Persona};
use crate::ports::{ReplyRequest, Responder, ResponderError};

/// Configuration for the Gemini responder.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    api_key: Secret<String>,
    /// Model to use (e.g., "gemini-pro").
    pub model: String,
    /// Base URL, without trailing slash.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "gemini-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(25),
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

const SUMMARY_INSTRUCTION: &str = "You are a conversation coach. Read the practice conversation below \
and answer with a JSON object with two string fields: \"summary\" (one or two sentences describing \
the conversation) and \"feedback\" (constructive advice for the user).";

/// Gemini API responder.
pub struct GeminiResponder {
    config: GeminiConfig,
    client: Client,
}

impl GeminiResponder {
    /// Creates a new responder.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self, ResponderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ResponderError::unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    async fn send(&self, body: &GenerateRequest) -> Result<String, ResponderError> {
        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", self.config.api_key())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResponderError::unavailable(format!(
                        "request timed out after {}s",
                        self.config.timeout.as_secs()
                    ))
                } else {
                    ResponderError::unavailable(e.to_string())
                }
            })?;

        let response = handle_response_status(response).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ResponderError::invalid_response(format!("Failed to parse: {}", e)))?;

        parsed.text()
    }
}

async fn handle_response_status(response: Response) -> Result<Response, ResponderError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: u16, body: &str) -> ResponderError {
    match status {
        401 | 403 => ResponderError::AuthenticationFailed,
        429 => ResponderError::RateLimited,
        500..=599 => ResponderError::unavailable(format!("Server error {}: {}", status, body)),
        _ => ResponderError::invalid_response(format!("Unexpected status {}: {}", status, body)),
    }
}

/// Renders the transcript the way the model is prompted with it.
fn render_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| {
            let who = if m.is_from_user() { "User" } else { "AI" };
            format!("{}: {}", who, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn reply_request(request: &ReplyRequest) -> GenerateRequest {
    let persona = Persona::for_scenario(request.scenario.as_ref());
    // The history already ends with the user message; it is repeated as the
    // explicit turn to answer.
    let earlier = match request.history.split_last() {
        Some((last, rest)) if last.is_from_user() => rest,
        _ => &request.history[..],
    };
    let prompt = format!(
        "Conversation history:\n{}\n\nUser: {}\n\nAI (respond naturally and helpfully):",
        render_history(earlier),
        request.user_message
    );
    GenerateRequest::new(persona.system_prompt(), prompt, None)
}

fn summary_request(transcript: &[Message]) -> GenerateRequest {
    GenerateRequest::new(
        SUMMARY_INSTRUCTION,
        render_history(transcript),
        Some(GenerationConfig {
            response_mime_type: "application/json".to_string(),
        }),
    )
}

fn parse_summary(text: &str) -> Result<ConversationSummary, ResponderError> {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str::<ConversationSummary>(trimmed)
        .map_err(|e| ResponderError::invalid_response(format!("summary is not valid JSON: {}", e)))
}

#[async_trait]
impl Responder for GeminiResponder {
    async fn generate(&self, request: ReplyRequest) -> Result<String, ResponderError> {
        let text = self.send(&reply_request(&request)).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ResponderError::invalid_response("empty reply"));
        }
        Ok(text.to_string())
    }

    async fn summarize(
        &self,
        transcript: &[Message],
    ) -> Result<ConversationSummary, ResponderError> {
        let text = self.send(&summary_request(transcript)).await?;
        parse_summary(&text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// === Wire Types ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        generation_config: Option<GenerationConfig>,
    ) -> Self {
        Self {
            system_instruction: Content::text(None, system),
            contents: vec![Content::text(Some("user"), user)],
            generation_config,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    fn text(self) -> Result<String, ResponderError> {
        let content = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| ResponderError::invalid_response("no candidates in response"))?;

        Ok(content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}
