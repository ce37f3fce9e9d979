//! Folding of recognition results into an utterance

use serde::{Deserialize, Serialize};

/// One recognition result as reported by the host recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionEvent {
    /// Index of this result within the recognizer's result list. Informational
    /// only: the client folds its results into one event per callback, and the
    /// accumulator does not key on it. The session logs it.
    #[serde(default)]
    pub result_index: usize,
    /// Candidate transcripts, most confident first
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub is_final: bool,
}

impl RecognitionEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            result_index: 0,
            alternatives: vec![text.into()],
            is_final: false,
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            result_index: 0,
            alternatives: vec![text.into()],
            is_final: true,
        }
    }

    /// The most confident alternative
    pub fn best(&self) -> Option<&str> {
        self.alternatives.first().map(String::as_str)
    }
}

/// Running transcript of the current utterance
///
/// Final text only grows until the utterance is taken; interim text is
/// replaced by every non-final result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptAccumulator {
    final_text: String,
    interim_text: String,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one result into the transcript
    pub fn apply(&mut self, event: &RecognitionEvent) {
        let Some(text) = event.best() else {
            return;
        };

        if event.is_final {
            self.final_text.push_str(text);
            self.interim_text.clear();
        } else {
            self.interim_text.clear();
            self.interim_text.push_str(text);
        }
    }

    /// What the transcript area should show: final text once there is any
    pub fn display_text(&self) -> &str {
        if self.final_text.is_empty() {
            &self.interim_text
        } else {
            &self.final_text
        }
    }

    pub fn has_final(&self) -> bool {
        !self.final_text.trim().is_empty()
    }

    /// Take the trimmed final text and reset, if there is any
    pub fn take_utterance(&mut self) -> Option<String> {
        if !self.has_final() {
            return None;
        }
        let utterance = self.final_text.trim().to_string();
        self.clear();
        Some(utterance)
    }

    pub fn clear(&mut self) {
        self.final_text.clear();
        self.interim_text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interim_text_is_replaced() {
        let mut transcript = TranscriptAccumulator::new();
        transcript.apply(&RecognitionEvent::interim("he"));
        transcript.apply(&RecognitionEvent::interim("hello"));
        assert_eq!(transcript.display_text(), "hello");
        assert!(!transcript.has_final());
        assert_eq!(transcript.take_utterance(), None);
    }

    #[test]
    fn test_final_text_appends_and_wins_display() {
        let mut transcript = TranscriptAccumulator::new();
        transcript.apply(&RecognitionEvent::final_result("what is "));
        transcript.apply(&RecognitionEvent::interim("two"));
        assert_eq!(transcript.display_text(), "what is ");

        transcript.apply(&RecognitionEvent::final_result("two plus two "));
        assert_eq!(
            transcript.take_utterance().as_deref(),
            Some("what is two plus two")
        );
        assert_eq!(transcript, TranscriptAccumulator::default());
    }

    #[test]
    fn test_whitespace_final_is_not_an_utterance() {
        let mut transcript = TranscriptAccumulator::new();
        transcript.apply(&RecognitionEvent::final_result("   "));
        assert_eq!(transcript.take_utterance(), None);
    }

    #[test]
    fn test_event_without_alternatives_is_ignored() {
        let mut transcript = TranscriptAccumulator::new();
        transcript.apply(&RecognitionEvent::interim("hi"));
        transcript.apply(&RecognitionEvent {
            result_index: 1,
            alternatives: Vec::new(),
            is_final: true,
        });
        assert_eq!(transcript.display_text(), "hi");
    }

    #[test]
    fn test_finals_accumulate_regardless_of_index() {
        let mut transcript = TranscriptAccumulator::new();
        transcript.apply(&RecognitionEvent::final_result("turn on "));
        transcript.apply(&RecognitionEvent::final_result("the lights"));
        assert_eq!(
            transcript.take_utterance().as_deref(),
            Some("turn on the lights")
        );
    }

    #[test]
    fn test_event_json_defaults() {
        let event: RecognitionEvent =
            serde_json::from_str(r#"{"alternatives":["hey","hay"]}"#).unwrap();
        assert_eq!(event.best(), Some("hey"));
        assert!(!event.is_final);
        assert_eq!(event.result_index, 0);
    }
}
