//! Conversational engine
//!
//! Provides:
//! - The response orchestrator (provider selection and fallback)
//! - The cloud chat collaborator seam and its HTTP client
//! - Output cleaning for the local-generative path

pub mod cloud;
mod generative;
mod orchestrator;

pub use cloud::{CloudChat, HttpCloudClient, ProviderDescriptor};
pub use orchestrator::{
    Engine, EngineConfigSnapshot, EngineSettings, ProviderSelection, LOCAL_PROVIDER,
};
