//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::capability::CapabilitySnapshot;
use crate::engine::{EngineConfigSnapshot, ProviderSelection};
use crate::error::{PermissionErrorKind, RecognitionErrorKind};
use crate::events::SessionEvent;
use crate::state::{ListeningState, RecognitionEvent, SessionInput};

/// Requests from clients to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Request the engine configuration
    GetConfig,

    /// Send a typed chat message
    Chat { text: String },

    /// Change the conversation mode (`casual`, `assistant`, `creative`)
    SetMode { mode: String },

    /// Select `local` or a cloud provider by name
    SwitchProvider { provider: String },

    SetApiKey { provider: String, key: String },

    /// Enable or disable the local generation strategy
    SetLocalGeneration { enabled: bool },

    /// Clear the cloud conversation history
    ClearHistory,

    /// Register this client as the speech recognizer
    AttachRecognizer {
        #[serde(default)]
        continuous: bool,
    },

    DetachRecognizer,

    StartListening,

    StopListening,

    /// Outcome of a microphone permission probe
    PermissionResult {
        granted: bool,
        #[serde(default)]
        error: Option<PermissionErrorKind>,
    },

    /// A recognizer callback
    Recognition { event: RecognitionUpdate },

    /// Subscribe to session event notifications
    Subscribe,
}

/// Recognizer callbacks as reported by the attached client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecognitionUpdate {
    Interim {
        #[serde(default)]
        result_index: usize,
        alternatives: Vec<String>,
    },
    Final {
        #[serde(default)]
        result_index: usize,
        alternatives: Vec<String>,
    },
    /// A host error code such as `no-speech` or `not-allowed`
    Error { code: String },
    Ended,
}

impl From<RecognitionUpdate> for SessionInput {
    fn from(update: RecognitionUpdate) -> Self {
        match update {
            RecognitionUpdate::Interim {
                result_index,
                alternatives,
            } => SessionInput::Recognized(RecognitionEvent {
                result_index,
                alternatives,
                is_final: false,
            }),
            RecognitionUpdate::Final {
                result_index,
                alternatives,
            } => SessionInput::Recognized(RecognitionEvent {
                result_index,
                alternatives,
                is_final: true,
            }),
            RecognitionUpdate::Error { code } => {
                SessionInput::Error(RecognitionErrorKind::from_code(&code))
            }
            RecognitionUpdate::Ended => SessionInput::Ended,
        }
    }
}

/// Responses from daemon to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Current engine configuration
    Config(EngineConfigSnapshot),

    /// Reply to a chat message
    Reply { text: String },

    /// Request applied
    Ok,

    /// Request understood but refused; state is unchanged
    Rejected { code: String, message: String },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn rejected(code: &str, message: impl ToString) -> Self {
        Self::Rejected {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Push notification from daemon to clients (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Speech session event occurred
    SessionEvent { event: SessionEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current speech session state
    pub listening: ListeningState,

    /// Whether a recognizer client is attached
    pub recognizer_attached: bool,

    /// Strategy the next message will use
    pub provider: ProviderSelection,

    pub capabilities: CapabilitySnapshot,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityStatus;

    #[test]
    fn test_request_serialization() {
        let req = Request::SetMode {
            mode: "creative".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("set_mode"));
        assert!(json.contains("creative"));
    }

    #[test]
    fn test_recognition_request_deserialization() {
        let json = r#"{"type":"recognition","event":{"kind":"final","alternatives":["hello"]}}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        let Request::Recognition { event } = req else {
            panic!("expected recognition request");
        };
        assert_eq!(
            SessionInput::from(event),
            SessionInput::final_transcript("hello")
        );

        let json = r#"{"type":"recognition","event":{"kind":"error","code":"not-allowed"}}"#;
        let Request::Recognition { event } = serde_json::from_str::<Request>(json).unwrap() else {
            panic!("expected recognition request");
        };
        assert_eq!(
            SessionInput::from(event),
            SessionInput::Error(RecognitionErrorKind::NotAllowed)
        );
    }

    #[test]
    fn test_permission_result_defaults() {
        let req: Request =
            serde_json::from_str(r#"{"type":"permission_result","granted":true}"#).unwrap();
        assert_eq!(
            req,
            Request::PermissionResult {
                granted: true,
                error: None
            }
        );
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus {
            version: "0.1.0".into(),
            listening: ListeningState::RequestingPermission,
            recognizer_attached: false,
            provider: ProviderSelection::LocalContextual,
            capabilities: CapabilitySnapshot {
                generative_text: CapabilityStatus::Loading,
                speech_to_text: CapabilityStatus::Ready,
                speech_synthesis: CapabilityStatus::Unloaded,
            },
            uptime_secs: 3,
        });
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains("requesting_permission"));
        assert!(json.contains("local_contextual"));

        let json = serde_json::to_string(&Response::rejected("invalid_mode", "nope")).unwrap();
        assert_eq!(
            json,
            r#"{"type":"rejected","code":"invalid_mode","message":"nope"}"#
        );
    }

    #[test]
    fn test_notification_wraps_event() {
        let note = Notification::SessionEvent {
            event: SessionEvent::TranscriptHidden,
        };
        let json = serde_json::to_string(&note).unwrap();
        assert_eq!(
            json,
            r#"{"type":"session_event","event":{"type":"transcript_hidden"}}"#
        );
    }
}
