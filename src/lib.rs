//! companion: conversational engine and speech session for a chat companion
//!
//! The engine picks a response strategy per message (cloud chat, local
//! generation or rule-matched contextual replies) and never fails to its
//! caller. The speech session folds recognizer results into utterances and
//! hands each one to the engine exactly once.

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod intent;
pub mod ipc;
pub mod lifecycle;
pub mod prompt;
pub mod state;
