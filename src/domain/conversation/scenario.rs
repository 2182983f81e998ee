//! Scenario tags and the personas they select.
//!
//! A scenario tag is a free-form label chosen by the client. Known tags map
//! to a persona with its own opening and closing lines, system prompt and
//! scripted replies; anything else falls back to the general practice
//! persona.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

const MAX_SCENARIO_LEN: usize = 64;

/// Label selecting the responder persona for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioTag(String);

impl ScenarioTag {
    /// Creates a tag, trimming surrounding whitespace.
    pub fn new(tag: impl Into<String>) -> Result<Self, ValidationError> {
        let tag = tag.into().trim().to_string();
        if tag.is_empty() {
            return Err(ValidationError::empty_field("scenario"));
        }
        if tag.len() > MAX_SCENARIO_LEN {
            return Err(ValidationError::invalid_format(
                "scenario",
                format!("must be at most {} characters", MAX_SCENARIO_LEN),
            ));
        }
        Ok(Self(tag))
    }

    /// Parses an optional client-supplied tag. Blank means no scenario.
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, ValidationError> {
        match raw {
            Some(s) if !s.trim().is_empty() => Self::new(s).map(Some),
            _ => Ok(None),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn persona(&self) -> Persona {
        Persona::for_scenario(Some(self))
    }
}

impl fmt::Display for ScenarioTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Responder persona selected by a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persona {
    JobInterview,
    CoffeeShop,
    TravelPlanning,
    SmallTalk,
    General,
}

impl Persona {
    /// Resolves the persona for an optional scenario tag.
    pub fn for_scenario(scenario: Option<&ScenarioTag>) -> Self {
        match scenario.map(ScenarioTag::as_str) {
            Some("job-interview") => Persona::JobInterview,
            Some("coffee-shop") => Persona::CoffeeShop,
            Some("travel-planning") => Persona::TravelPlanning,
            Some("small-talk") => Persona::SmallTalk,
            _ => Persona::General,
        }
    }

    /// First line of every conversation, authored by the responder.
    pub fn opening_line(&self) -> &'static str {
        match self {
            Persona::JobInterview => "Hello! I'm your interviewer today. Thank you for coming in. Let's start with a simple question: Can you tell me about yourself?",
            Persona::CoffeeShop => "Hi there! Welcome to our coffee shop. What can I get for you today?",
            Persona::TravelPlanning => "Hello! I'm excited to help you plan your trip. Where are you thinking of traveling to?",
            Persona::SmallTalk => "Hey! How's your day going? What have you been up to lately?",
            Persona::General => "Hello! I'm ready to help you practice. Let's get started!",
        }
    }

    /// Sign-off appended when the conversation ends.
    pub fn closing_line(&self) -> &'static str {
        match self {
            Persona::JobInterview => "Thank you for your time today. We'll be in touch soon!",
            Persona::CoffeeShop => "Here you go, enjoy your drink! Have a great day!",
            Persona::TravelPlanning => "Sounds like a wonderful trip. Safe travels!",
            Persona::SmallTalk => "It was really nice chatting with you. Talk soon!",
            Persona::General => "Great practice session. See you next time!",
        }
    }

    /// Instruction given to a model-backed responder.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Persona::JobInterview => "You are a professional job interviewer. Ask thoughtful questions about the candidate's experience, skills, and goals. Be encouraging but professional.",
            Persona::CoffeeShop => "You are a friendly barista at a coffee shop. Help customers order drinks, suggest options, and be warm and welcoming.",
            Persona::TravelPlanning => "You are a knowledgeable travel advisor. Help plan trips, suggest destinations, discuss accommodations and activities.",
            Persona::SmallTalk => "You are a friendly conversation partner. Engage in casual, natural small talk about everyday topics.",
            Persona::General => "You are a helpful AI assistant for conversation practice. Be natural, encouraging, and conversational.",
        }
    }

    /// Scripted replies used by the mock responder.
    pub fn scripted_replies(&self) -> &'static [&'static str] {
        match self {
            Persona::JobInterview => &[
                "That's a great point. Can you tell me more about your experience with team collaboration?",
                "I see. How would you handle a situation where you disagree with your manager?",
                "Interesting approach! What's your biggest professional achievement so far?",
                "Can you walk me through a challenging project you've worked on?",
                "That's impressive. What motivates you in your work?",
                "How do you stay updated with industry trends?",
            ],
            Persona::CoffeeShop => &[
                "Sure! Would you like that hot or iced?",
                "Great choice! What size would you prefer - small, medium, or large?",
                "Would you like to add any flavors or extra shots?",
                "Perfect! Your total comes to $4.50. Will that be cash or card?",
                "That's one of our most popular drinks! Any dietary restrictions I should know about?",
                "Would you like to try our seasonal special today?",
            ],
            Persona::TravelPlanning => &[
                "That sounds like an amazing destination! How long are you planning to stay?",
                "Have you considered the best time of year to visit?",
                "What kind of activities are you most interested in?",
                "Would you like some recommendations for accommodations?",
                "Are you traveling solo or with companions?",
                "What's your approximate budget for this trip?",
            ],
            Persona::SmallTalk | Persona::General => &[
                "That's interesting! Can you elaborate on that?",
                "I understand. What makes you think that way?",
                "Could you provide more details about your perspective?",
                "That's a thoughtful point. How would you approach this differently?",
                "I see what you mean. What's your experience with this?",
                "Good question! Let me think about that for a moment.",
            ],
        }
    }
}
