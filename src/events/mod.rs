//! Events module for speech session transitions
//!
//! Session events are broadcast to the IPC layer and pushed to subscribed
//! clients. Some of them are display updates, others are commands for the
//! attached recognizer (start, stop, probe permission).

use serde::{Deserialize, Serialize};

use crate::state::ListeningState;

/// Events emitted by the speech session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session moved between listening states
    StateChanged {
        from: ListeningState,
        to: ListeningState,
        /// Time spent in `from`, in milliseconds
        duration_ms: u64,
    },

    /// The host should probe microphone access and report back
    PermissionRequested {
        /// Set for the one-shot re-request after a `not-allowed` error
        retry: bool,
    },

    /// The host should start its recognition source
    RecognitionStartRequested,

    /// The host should stop its recognition source
    RecognitionStopRequested,

    /// Text to show in the transcript area
    TranscriptUpdated { text: String, is_final: bool },

    /// A final transcript was handed to the responder
    UtteranceDispatched { text: String },

    /// The responder's reply to the last utterance
    ReplyReady { text: String },

    /// The transcript area should be hidden
    TranscriptHidden,

    /// A user-facing error or recovery message
    ErrorShown { message: String },

    /// The error display period ended
    ErrorCleared { prompt: String },

    /// Start was requested but no recognition source is available
    Unsupported { message: String },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::StateChanged {
                from,
                to,
                duration_ms,
            } => write!(f, "STATE_CHANGED {} -> {} ({}ms)", from, to, duration_ms),
            SessionEvent::PermissionRequested { retry: false } => {
                write!(f, "PERMISSION_REQUESTED")
            }
            SessionEvent::PermissionRequested { retry: true } => {
                write!(f, "PERMISSION_REQUESTED (retry)")
            }
            SessionEvent::RecognitionStartRequested => write!(f, "RECOGNITION_START_REQUESTED"),
            SessionEvent::RecognitionStopRequested => write!(f, "RECOGNITION_STOP_REQUESTED"),
            SessionEvent::TranscriptUpdated { is_final, .. } => {
                if *is_final {
                    write!(f, "TRANSCRIPT_UPDATED (final)")
                } else {
                    write!(f, "TRANSCRIPT_UPDATED (interim)")
                }
            }
            SessionEvent::UtteranceDispatched { text } => {
                write!(f, "UTTERANCE_DISPATCHED ({} chars)", text.chars().count())
            }
            SessionEvent::ReplyReady { text } => {
                write!(f, "REPLY_READY ({} chars)", text.chars().count())
            }
            SessionEvent::TranscriptHidden => write!(f, "TRANSCRIPT_HIDDEN"),
            SessionEvent::ErrorShown { .. } => write!(f, "ERROR_SHOWN"),
            SessionEvent::ErrorCleared { .. } => write!(f, "ERROR_CLEARED"),
            SessionEvent::Unsupported { .. } => write!(f, "UNSUPPORTED"),
        }
    }
}
