//! Post-processing for local model output
//!
//! Small local models echo the prompt, prefix role labels and ramble. The
//! cleaner keeps the first sentence and flags output that is unusable.

use std::sync::LazyLock;

use regex::Regex;

static ROLE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:answer:|response:|ai:)").expect("role label pattern is valid")
});

/// Phrases from instruction-style prompts that should never reach the user
const LEAKED_FRAGMENTS: &[&str] = &["be concise", "like siri", "respond to"];

/// Shortest output (in characters) considered a real answer
const MIN_REPLY_CHARS: usize = 5;

pub const NOT_READY_REPLY: &str = "I'm still learning how to think. Please wait a moment...";

pub const LEAKED_REPLY: &str =
    "I'm still learning how to express myself clearly. Could you ask me something else?";

pub const BACKUP_REPLIES: &[&str] = &[
    "That's an interesting question! Let me think about it.",
    "I understand what you're asking. Give me a moment to respond properly.",
    "Good question! I'm processing that information.",
    "I hear you. Let me organize my thoughts on this.",
    "Interesting! I need a moment to provide a thoughtful response.",
];

/// Outcome of cleaning raw generator output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanedOutput {
    Usable(String),
    /// Nothing left, or too short to be an answer
    TooShort,
    /// Prompt instructions leaked into the output
    Leaked,
}

/// Strip the echoed prompt and role labels, then collapse to one sentence
pub fn clean_output(raw: &str, prompt: &str, persona: &str) -> CleanedOutput {
    let without_prompt = raw.replacen(prompt, "", 1);
    let mut response = without_prompt.trim();

    // Only one leading label is removed
    response = match ROLE_LABEL.find(response) {
        Some(label) => &response[label.end()..],
        None => strip_persona_label(response, persona),
    }
    .trim();
    response = response
        .trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace())
        .trim();

    let sentences: Vec<&str> = response
        .split('.')
        .filter(|s| !s.trim().is_empty())
        .collect();
    let response = if sentences.len() > 1 {
        format!("{}.", sentences[0].trim())
    } else {
        response.to_string()
    };

    if response.chars().count() < MIN_REPLY_CHARS {
        return CleanedOutput::TooShort;
    }

    let lower = response.to_lowercase();
    if LEAKED_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return CleanedOutput::Leaked;
    }

    CleanedOutput::Usable(response)
}

/// Drop a leading `{persona}:` label, ignoring ASCII case
fn strip_persona_label<'a>(text: &'a str, persona: &str) -> &'a str {
    let label_len = persona.len() + 1;
    match text.get(..label_len) {
        Some(head)
            if head.ends_with(':') && head[..persona.len()].eq_ignore_ascii_case(persona) =>
        {
            &text[label_len..]
        }
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = "Question: why is the sky blue\nHelpful answer:";

    #[test]
    fn test_strips_prompt_and_keeps_first_sentence() {
        let raw = format!("{PROMPT} Light scatters off air molecules. Blue scatters most. The end.");
        assert_eq!(
            clean_output(&raw, PROMPT, "Bella"),
            CleanedOutput::Usable("Light scatters off air molecules.".to_string())
        );
    }

    #[test]
    fn test_strips_role_labels() {
        assert_eq!(
            clean_output("Answer: - Rayleigh scattering", PROMPT, "Bella"),
            CleanedOutput::Usable("Rayleigh scattering".to_string())
        );
        assert_eq!(
            clean_output("bella: it is the sunlight", PROMPT, "Bella"),
            CleanedOutput::Usable("it is the sunlight".to_string())
        );
        assert_eq!(
            clean_output("AI: Because of scattering", PROMPT, "Bella"),
            CleanedOutput::Usable("Because of scattering".to_string())
        );
    }

    #[test]
    fn test_strips_single_leading_label() {
        assert_eq!(
            clean_output("Answer: Bella: hi there", PROMPT, "Bella"),
            CleanedOutput::Usable("Bella: hi there".to_string())
        );
        assert_eq!(
            clean_output("Bella: Answer: hi there", PROMPT, "Bella"),
            CleanedOutput::Usable("Answer: hi there".to_string())
        );
    }

    #[test]
    fn test_short_output_is_rejected() {
        assert_eq!(clean_output(PROMPT, PROMPT, "Bella"), CleanedOutput::TooShort);
        assert_eq!(clean_output("Yes.", PROMPT, "Bella"), CleanedOutput::TooShort);
        assert_eq!(clean_output("Response:", PROMPT, "Bella"), CleanedOutput::TooShort);
    }

    #[test]
    fn test_leaked_instructions_are_rejected() {
        assert_eq!(
            clean_output("Please be concise and friendly", PROMPT, "Bella"),
            CleanedOutput::Leaked
        );
        assert_eq!(
            clean_output("I will respond to the user", PROMPT, "Bella"),
            CleanedOutput::Leaked
        );
    }

    #[test]
    fn test_persona_label_handles_short_and_unicode_text() {
        assert_eq!(strip_persona_label("Be", "Bella"), "Be");
        assert_eq!(strip_persona_label("héllo world", "Bella"), "héllo world");
    }
}
