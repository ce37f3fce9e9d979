//! Speech input session
//!
//! An explicit state machine over a host recognition source:
//! - Idle: not listening
//! - RequestingPermission: waiting for the host's microphone probe
//! - Listening: folding interim and final results into a transcript
//! - Processing: the final transcript is with the responder
//! - Error: a recognition or permission error is on display

mod machine;
mod transcript;

pub use machine::{
    ListeningState, RecognitionSource, Responder, SessionCommand, SessionHandle, SessionInput,
    SessionTimings, SpeechSession, IDLE_PROMPT, PERMISSION_RECOVERED_MESSAGE,
    START_FAILED_MESSAGE, UNSUPPORTED_MESSAGE,
};
pub use transcript::{RecognitionEvent, TranscriptAccumulator};
