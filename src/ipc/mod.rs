//! IPC module for daemon-client communication

mod protocol;
mod recognizer;
mod server;

pub use protocol::{DaemonStatus, Notification, RecognitionUpdate, Request, Response};
pub use recognizer::BroadcastRecognizer;
pub use server::{Server, Services};
