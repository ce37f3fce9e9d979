//! Model capability registry
//!
//! Each local model (text generation, speech-to-text, speech synthesis) is
//! loaded independently. A failed load degrades that one capability and
//! never aborts the others.

mod loader;
mod registry;

pub use loader::ModelDirLoader;
pub use registry::{
    CapabilityHandle, CapabilityKind, CapabilityRegistry, CapabilitySnapshot, CapabilityStatus,
    CapabilityWarning, GenerationParams, ModelLoader, SpeechSynthesizer, SpeechToText,
    TextGenerator,
};
