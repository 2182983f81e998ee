//! Mock Responder - scripted replies and heuristic summaries.
//!
//! Serves as the default responder in development and as the test double
//! for the session core.
//!
//! # Features
//!
//! - Persona reply pools, cycled deterministically by exchange count
//! - Summary and feedback from message counts and average user message length
//! - Simulated latency (runs on the tokio clock, so paused-time tests can
//!   step over it)
//! - Error injection and call counting for failure-path tests
//!
//! # Example
//!
//! ```ignore
//! let responder = MockResponder::new().with_delay(Duration::from_millis(800));
//! responder.fail_next_generate(ResponderError::RateLimited);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::domain::conversation::{ConversationSummary, Message, Persona};
use crate::ports::{ReplyRequest, Responder, ResponderError};

/// Scripted responder.
#[derive(Debug, Clone, Default)]
pub struct MockResponder {
    delay: Duration,
    generate_failures: Arc<Mutex<VecDeque<ResponderError>>>,
    summarize_failures: Arc<Mutex<VecDeque<ResponderError>>>,
    generate_calls: Arc<AtomicUsize>,
    summarize_calls: Arc<AtomicUsize>,
}

impl MockResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the next `generate` call fail with `error`.
    pub fn fail_next_generate(&self, error: ResponderError) {
        if let Ok(mut queue) = self.generate_failures.lock() {
            queue.push_back(error);
        }
    }

    /// Makes the next `summarize` call fail with `error`.
    pub fn fail_next_summarize(&self, error: ResponderError) {
        if let Ok(mut queue) = self.summarize_failures.lock() {
            queue.push_back(error);
        }
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

fn pop_failure(queue: &Mutex<VecDeque<ResponderError>>) -> Option<ResponderError> {
    queue.lock().ok().and_then(|mut q| q.pop_front())
}

/// Picks the reply for the current exchange: the n-th user message gets the
/// n-th entry of the persona's pool, wrapping around.
pub fn scripted_reply(request: &ReplyRequest) -> &'static str {
    let replies = Persona::for_scenario(request.scenario.as_ref()).scripted_replies();
    let exchange = request
        .history
        .iter()
        .filter(|m| m.is_from_user())
        .count()
        .saturating_sub(1);
    replies[exchange % replies.len()]
}

/// Builds the heuristic summary of a transcript.
pub fn heuristic_summary(transcript: &[Message]) -> ConversationSummary {
    let user_lengths: Vec<usize> = transcript
        .iter()
        .filter(|m| m.is_from_user())
        .map(|m| m.content.chars().count())
        .collect();

    let user_count = user_lengths.len();
    let avg_length = if user_count == 0 {
        0
    } else {
        let total: usize = user_lengths.iter().sum();
        (total as f64 / user_count as f64).round() as usize
    };

    ConversationSummary::new(
        format!(
            "Convo completed with {} messages exchanged. User messaged {}.",
            transcript.len(),
            user_count
        ),
        feedback(user_count, avg_length),
    )
}

fn feedback(user_count: usize, avg_length: usize) -> String {
    let engagement = match user_count {
        0..=2 => "Try to engage more in the conversation to get better practice. ",
        3..=5 => "Good engagement! You maintained a decent conversation flow. ",
        6..=9 => "Excellent engagement! You showed great communication skills. ",
        _ => "Outstanding! You had a very thorough conversation. ",
    };
    let detail = match avg_length {
        0..=19 => "Try to elaborate more in your responses to make the conversation richer. ",
        20..=49 => "Your message length is good - clear and concise. ",
        50..=99 => "Great detail in your responses! You express yourself well. ",
        _ => "Very detailed responses! Make sure to stay focused on the topic. ",
    };
    format!("{}{}Keep practicing to improve further!", engagement, detail)
}

#[async_trait]
impl Responder for MockResponder {
    async fn generate(&self, request: ReplyRequest) -> Result<String, ResponderError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = pop_failure(&self.generate_failures) {
            return Err(error);
        }
        Ok(scripted_reply(&request).to_string())
    }

    async fn summarize(
        &self,
        transcript: &[Message],
    ) -> Result<ConversationSummary, ResponderError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = pop_failure(&self.summarize_failures) {
            return Err(error);
        }
        Ok(heuristic_summary(transcript))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
