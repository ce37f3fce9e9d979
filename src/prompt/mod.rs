//! Prompt construction per conversation mode
//!
//! Local generation targets get a minimal question/answer frame, since
//! small sequence-to-sequence models drift on long instructions. Cloud
//! targets get a persona instruction per mode.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Conversation style selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    #[default]
    Casual,
    Assistant,
    Creative,
}

impl ConversationMode {
    /// Resolve a stored mode value, falling back to casual when it is
    /// missing or not one of the known modes
    pub fn from_stored(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::Casual => "casual",
            ConversationMode::Assistant => "assistant",
            ConversationMode::Creative => "creative",
        }
    }
}

impl FromStr for ConversationMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "casual" => Ok(Self::Casual),
            "assistant" => Ok(Self::Assistant),
            "creative" => Ok(Self::Creative),
            other => Err(EngineError::InvalidMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the prompt will be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTarget {
    Local,
    Cloud,
}

/// Builds provider-specific prompts for a named persona
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }

    pub fn build(&self, text: &str, mode: ConversationMode, target: PromptTarget) -> String {
        match target {
            PromptTarget::Local => Self::local_prompt(text, mode),
            PromptTarget::Cloud => self.cloud_prompt(text, mode),
        }
    }

    fn local_prompt(text: &str, mode: ConversationMode) -> String {
        match mode {
            ConversationMode::Casual => format!("Question: {text}\nHelpful answer:"),
            ConversationMode::Assistant => format!("User needs help: {text}\nUseful response:"),
            ConversationMode::Creative => {
                format!("Creative prompt: {text}\nImaginative response:")
            }
        }
    }

    fn cloud_prompt(&self, text: &str, mode: ConversationMode) -> String {
        let persona = &self.persona;
        match mode {
            ConversationMode::Casual => format!(
                "You are {persona}, a helpful AI assistant. Respond naturally and conversationally to: {text}"
            ),
            ConversationMode::Assistant => format!(
                "You are {persona}, a professional AI assistant. Provide helpful information for: {text}"
            ),
            ConversationMode::Creative => format!(
                "You are {persona}, a creative AI assistant. Use your imagination to respond to: {text}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("assistant".parse::<ConversationMode>().unwrap(), ConversationMode::Assistant);
        assert!(matches!(
            "bogus".parse::<ConversationMode>(),
            Err(EngineError::InvalidMode(m)) if m == "bogus"
        ));
    }

    #[test]
    fn test_stored_mode_defaults_to_casual() {
        assert_eq!(ConversationMode::from_stored(None), ConversationMode::Casual);
        assert_eq!(ConversationMode::from_stored(Some("loud")), ConversationMode::Casual);
        assert_eq!(
            ConversationMode::from_stored(Some("creative")),
            ConversationMode::Creative
        );
    }

    #[test]
    fn test_local_prompt_is_minimal() {
        let builder = PromptBuilder::new("Bella");
        let prompt = builder.build("why is the sky blue", ConversationMode::Casual, PromptTarget::Local);
        assert_eq!(prompt, "Question: why is the sky blue\nHelpful answer:");

        let prompt = builder.build("plan my day", ConversationMode::Assistant, PromptTarget::Local);
        assert_eq!(prompt, "User needs help: plan my day\nUseful response:");
        assert!(!prompt.contains("Bella"));
    }

    #[test]
    fn test_cloud_prompt_carries_persona_and_mode() {
        let builder = PromptBuilder::new("Bella");
        let prompt = builder.build("write a poem", ConversationMode::Creative, PromptTarget::Cloud);
        assert!(prompt.starts_with("You are Bella, a creative AI assistant."));
        assert!(prompt.ends_with("write a poem"));

        let prompt = builder.build("hi", ConversationMode::Assistant, PromptTarget::Cloud);
        assert!(prompt.contains("professional AI assistant"));
    }
}
