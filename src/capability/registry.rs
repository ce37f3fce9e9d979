//! Tagged capability handles and their loader seam

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// The independently loadable AI functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    GenerativeText,
    SpeechToText,
    SpeechSynthesis,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityKind::GenerativeText => write!(f, "generative-text"),
            CapabilityKind::SpeechToText => write!(f, "speech-to-text"),
            CapabilityKind::SpeechSynthesis => write!(f, "speech-synthesis"),
        }
    }
}

/// Load state of one capability
#[derive(Debug, Clone)]
pub enum CapabilityHandle<T> {
    Unloaded,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> CapabilityHandle<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            CapabilityHandle::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn status(&self) -> CapabilityStatus {
        match self {
            CapabilityHandle::Unloaded => CapabilityStatus::Unloaded,
            CapabilityHandle::Loading => CapabilityStatus::Loading,
            CapabilityHandle::Ready(_) => CapabilityStatus::Ready,
            CapabilityHandle::Failed(reason) => CapabilityStatus::Failed {
                reason: reason.clone(),
            },
        }
    }
}

/// Handle-free view of a capability's state, for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CapabilityStatus {
    Unloaded,
    Loading,
    Ready,
    Failed { reason: String },
}

/// Snapshot of every capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub generative_text: CapabilityStatus,
    pub speech_to_text: CapabilityStatus,
    pub speech_synthesis: CapabilityStatus,
}

/// A capability that failed to load during initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityWarning {
    pub kind: CapabilityKind,
    pub reason: String,
}

impl std::fmt::Display for CapabilityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} unavailable: {}", self.kind, self.reason)
    }
}

/// Fixed decoding parameters for local generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub do_sample: bool,
    pub repetition_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: 0.6,
            top_k: 40,
            top_p: 0.9,
            do_sample: true,
            repetition_penalty: 1.15,
        }
    }
}

/// Local sequence-to-sequence text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the raw generated text, which may echo the prompt
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String>;
}

/// Local speech-to-text over f32 mono 16kHz samples
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[f32]) -> anyhow::Result<String>;
}

/// Local speech synthesis producing encoded audio bytes
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> anyhow::Result<Vec<u8>>;
}

/// Acquires capability handles. Each method may fail independently.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load_generator(&self) -> anyhow::Result<Arc<dyn TextGenerator>>;
    async fn load_transcriber(&self) -> anyhow::Result<Arc<dyn SpeechToText>>;
    async fn load_synthesizer(&self) -> anyhow::Result<Arc<dyn SpeechSynthesizer>>;
}

/// Holds one handle per capability
pub struct CapabilityRegistry {
    generator: RwLock<CapabilityHandle<Arc<dyn TextGenerator>>>,
    transcriber: RwLock<CapabilityHandle<Arc<dyn SpeechToText>>>,
    synthesizer: RwLock<CapabilityHandle<Arc<dyn SpeechSynthesizer>>>,
    /// Synthesis stays Unloaded unless enabled
    load_synthesis: bool,
}

impl CapabilityRegistry {
    pub fn new(load_synthesis: bool) -> Self {
        Self {
            generator: RwLock::new(CapabilityHandle::Unloaded),
            transcriber: RwLock::new(CapabilityHandle::Unloaded),
            synthesizer: RwLock::new(CapabilityHandle::Unloaded),
            load_synthesis,
        }
    }

    /// Load every capability, one after another. Never fails: each failure
    /// is logged and returned as a warning, and loading moves on.
    pub async fn initialize(&self, loader: &dyn ModelLoader) -> Vec<CapabilityWarning> {
        info!("loading model capabilities");
        let mut warnings = Vec::new();

        warnings.extend(
            load_slot(
                &self.generator,
                CapabilityKind::GenerativeText,
                loader.load_generator(),
            )
            .await,
        );
        warnings.extend(
            load_slot(
                &self.transcriber,
                CapabilityKind::SpeechToText,
                loader.load_transcriber(),
            )
            .await,
        );
        if self.load_synthesis {
            warnings.extend(
                load_slot(
                    &self.synthesizer,
                    CapabilityKind::SpeechSynthesis,
                    loader.load_synthesizer(),
                )
                .await,
            );
        }

        info!(degraded = warnings.len(), "model capabilities initialized");
        warnings
    }

    pub async fn generator(&self) -> Option<Arc<dyn TextGenerator>> {
        self.generator.read().await.ready().cloned()
    }

    pub async fn transcriber(&self) -> Option<Arc<dyn SpeechToText>> {
        self.transcriber.read().await.ready().cloned()
    }

    pub async fn synthesizer(&self) -> Option<Arc<dyn SpeechSynthesizer>> {
        self.synthesizer.read().await.ready().cloned()
    }

    pub async fn snapshot(&self) -> CapabilitySnapshot {
        CapabilitySnapshot {
            generative_text: self.generator.read().await.status(),
            speech_to_text: self.transcriber.read().await.status(),
            speech_synthesis: self.synthesizer.read().await.status(),
        }
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Drive one slot from Loading to Ready or Failed
async fn load_slot<T, F>(
    slot: &RwLock<CapabilityHandle<T>>,
    kind: CapabilityKind,
    load: F,
) -> Option<CapabilityWarning>
where
    F: Future<Output = anyhow::Result<T>>,
{
    if matches!(
        *slot.read().await,
        CapabilityHandle::Ready(_) | CapabilityHandle::Loading
    ) {
        return None;
    }

    *slot.write().await = CapabilityHandle::Loading;
    info!(capability = %kind, "loading capability");

    match load.await {
        Ok(handle) => {
            *slot.write().await = CapabilityHandle::Ready(handle);
            info!(capability = %kind, "capability ready");
            None
        }
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(capability = %kind, %reason, "capability failed to load, continuing without it");
            *slot.write().await = CapabilityHandle::Failed(reason.clone());
            Some(CapabilityWarning { kind, reason })
        }
    }
}
