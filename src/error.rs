//! Error types shared across the engine and the speech session

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityKind;

/// Errors surfaced by the engine's configuration and capability calls.
///
/// Response generation never returns these to callers; `Engine::respond`
/// recovers them into a contextual reply.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} capability is not available")]
    CapabilityUnavailable(CapabilityKind),

    #[error("{kind} capability failed: {reason}")]
    CapabilityFailed { kind: CapabilityKind, reason: String },

    #[error("unknown conversation mode: {0}")]
    InvalidMode(String),

    #[error("failed to switch to provider: {0}")]
    ProviderSwitchFailed(String),

    #[error("cloud chat failed: {0}")]
    Cloud(String),

    #[error("local generation failed: {0}")]
    Generation(String),
}

impl EngineError {
    /// Stable code used in IPC rejections
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapabilityUnavailable(_) => "capability_unavailable",
            Self::CapabilityFailed { .. } => "capability_failed",
            Self::InvalidMode(_) => "invalid_mode",
            Self::ProviderSwitchFailed(_) => "provider_switch_failed",
            Self::Cloud(_) => "cloud",
            Self::Generation(_) => "generation",
        }
    }
}

/// Classified speech recognition failures reported by the recognition source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum RecognitionErrorKind {
    NoSpeech,
    NotAllowed,
    Network,
    AudioCapture,
    Aborted,
    Other(String),
}

impl RecognitionErrorKind {
    /// Map a host error code (`"no-speech"`, `"network"`, ...) to a kind
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "not-allowed" => Self::NotAllowed,
            "network" => Self::Network,
            "audio-capture" => Self::AudioCapture,
            "aborted" => Self::Aborted,
            other => Self::Other(other.to_string()),
        }
    }

    /// Message shown to the user while the session sits in the Error state
    pub fn user_message(&self) -> String {
        match self {
            Self::NoSpeech => "No speech detected. Please try again.".to_string(),
            Self::NotAllowed => {
                "Microphone access denied. Please allow microphone access and refresh the page."
                    .to_string()
            }
            Self::Network => {
                "Network error. Please check your internet connection and try again.".to_string()
            }
            Self::AudioCapture => "Audio capture failed. Please check your microphone.".to_string(),
            Self::Aborted => "Speech recognition was aborted.".to_string(),
            Self::Other(code) => format!("Speech recognition error: {code}. Please try again."),
        }
    }
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no-speech"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::Network => write!(f, "network"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::Aborted => write!(f, "aborted"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Why a microphone permission probe did not yield device access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum PermissionErrorKind {
    NotAllowed,
    NotFound,
    Other(String),
}

impl PermissionErrorKind {
    pub fn user_message(&self) -> String {
        let base = "Microphone access is required for voice input.";
        match self {
            Self::NotAllowed => format!(
                "{base} Please allow microphone access in your browser settings and try again."
            ),
            Self::NotFound => {
                format!("{base} No microphone found. Please connect a microphone and try again.")
            }
            Self::Other(detail) => format!("{base} Error: {detail}"),
        }
    }
}

/// Rejections of user-initiated session requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("speech recognition is not supported by the attached host")]
    Unsupported,

    #[error("a listening session is already active")]
    AlreadyActive,
}

impl SessionError {
    /// Stable code used in IPC rejections
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::AlreadyActive => "already_active",
        }
    }
}
