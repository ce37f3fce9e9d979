//! Response orchestration
//!
//! Picks a response strategy per message and guarantees a reply: every
//! failure on the cloud or local-generative path degrades to the contextual
//! responder for the same input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::capability::{
    CapabilityKind, CapabilityRegistry, CapabilitySnapshot, CapabilityWarning, GenerationParams,
    ModelLoader,
};
use crate::error::EngineError;
use crate::intent::{pick, ContextualResponder};
use crate::prompt::{ConversationMode, PromptBuilder, PromptTarget};

use super::cloud::{CloudChat, ProviderDescriptor};
use super::generative::{self, CleanedOutput};

/// Name accepted by `switch_provider` for the on-device path
pub const LOCAL_PROVIDER: &str = "local";

/// Response strategy for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSelection {
    LocalContextual,
    LocalGenerative,
    Cloud,
}

impl std::fmt::Display for ProviderSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderSelection::LocalContextual => write!(f, "local-contextual"),
            ProviderSelection::LocalGenerative => write!(f, "local-generative"),
            ProviderSelection::Cloud => write!(f, "cloud"),
        }
    }
}

/// Engine configuration as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfigSnapshot {
    pub using_cloud: bool,
    pub provider: ProviderDescriptor,
    pub mode: ConversationMode,
    pub configured: bool,
}

/// Construction-time engine settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub persona: String,
    /// Model name reported for the local provider
    pub local_model: String,
    pub mode: ConversationMode,
    pub use_cloud: bool,
    /// Route to the local generator instead of contextual replies
    pub local_generation: bool,
    pub load_synthesis: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            persona: "Bella".to_string(),
            local_model: "LaMini-Flan-T5-77M".to_string(),
            mode: ConversationMode::Casual,
            use_cloud: false,
            local_generation: false,
            load_synthesis: false,
        }
    }
}

/// The conversational engine, shared by the IPC server and the speech session
pub struct Engine {
    persona: String,
    local_model: String,
    prompts: PromptBuilder,
    responder: ContextualResponder,
    cloud: Arc<dyn CloudChat>,
    capabilities: CapabilityRegistry,
    mode: RwLock<ConversationMode>,
    use_cloud: AtomicBool,
    local_generation: AtomicBool,
    rng: Mutex<StdRng>,
}

impl Engine {
    pub fn new(settings: EngineSettings, cloud: Arc<dyn CloudChat>) -> Self {
        Self {
            prompts: PromptBuilder::new(settings.persona.clone()),
            responder: ContextualResponder::new(settings.persona.clone()),
            persona: settings.persona,
            local_model: settings.local_model,
            cloud,
            capabilities: CapabilityRegistry::new(settings.load_synthesis),
            mode: RwLock::new(settings.mode),
            use_cloud: AtomicBool::new(settings.use_cloud),
            local_generation: AtomicBool::new(settings.local_generation),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the randomness source used for variant selection
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Load local model capabilities. Never fails; degraded capabilities
    /// are returned as warnings.
    pub async fn initialize(&self, loader: &dyn ModelLoader) -> Vec<CapabilityWarning> {
        let warnings = self.capabilities.initialize(loader).await;
        for warning in &warnings {
            warn!(%warning, "running with degraded capability");
        }
        warnings
    }

    pub async fn capability_snapshot(&self) -> CapabilitySnapshot {
        self.capabilities.snapshot().await
    }

    /// Which strategy the next message will use
    pub async fn provider_selection(&self) -> ProviderSelection {
        if self.use_cloud.load(Ordering::SeqCst) && self.cloud.is_configured().await {
            ProviderSelection::Cloud
        } else if self.local_generation.load(Ordering::SeqCst) {
            ProviderSelection::LocalGenerative
        } else {
            ProviderSelection::LocalContextual
        }
    }

    /// Reply to a user message. Never fails.
    pub async fn respond(&self, text: &str) -> String {
        let provider = self.provider_selection().await;
        debug!(%provider, chars = text.chars().count(), "responding");

        let result = match provider {
            ProviderSelection::Cloud => self.respond_with_cloud(text).await,
            ProviderSelection::LocalGenerative => self.respond_with_local_model(text).await,
            ProviderSelection::LocalContextual => Ok(self.contextual_reply(text)),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%provider, error = %e, "response failed, using contextual reply");
                self.contextual_reply(text)
            }
        }
    }

    /// Rule-matched reply, without any model
    pub fn contextual_reply(&self, text: &str) -> String {
        let now = chrono::Local::now().naive_local();
        self.contextual_reply_at(text, now)
    }

    fn contextual_reply_at(&self, text: &str, now: NaiveDateTime) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        self.responder.reply(text, now, &mut *rng)
    }

    async fn respond_with_cloud(&self, text: &str) -> Result<String, EngineError> {
        let mode = *self.mode.read().await;
        let prompt = self.prompts.build(text, mode, PromptTarget::Cloud);
        self.cloud
            .chat(&prompt)
            .await
            .map_err(|e| EngineError::Cloud(format!("{e:#}")))
    }

    async fn respond_with_local_model(&self, text: &str) -> Result<String, EngineError> {
        let Some(generator) = self.capabilities.generator().await else {
            return Ok(generative::NOT_READY_REPLY.to_string());
        };

        let mode = *self.mode.read().await;
        let prompt = self.prompts.build(text, mode, PromptTarget::Local);
        let raw = generator
            .generate(&prompt, &GenerationParams::default())
            .await
            .map_err(|e| EngineError::Generation(format!("{e:#}")))?;

        let reply = match generative::clean_output(&raw, &prompt, &self.persona) {
            CleanedOutput::Usable(reply) => reply,
            CleanedOutput::TooShort => {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                pick(generative::BACKUP_REPLIES, &mut *rng).to_string()
            }
            CleanedOutput::Leaked => generative::LEAKED_REPLY.to_string(),
        };
        Ok(reply)
    }

    /// Transcribe audio with the local speech-to-text capability
    pub async fn listen(&self, audio: &[f32]) -> Result<String, EngineError> {
        let transcriber = self
            .capabilities
            .transcriber()
            .await
            .ok_or(EngineError::CapabilityUnavailable(CapabilityKind::SpeechToText))?;

        transcriber
            .transcribe(audio)
            .await
            .map_err(|e| EngineError::CapabilityFailed {
                kind: CapabilityKind::SpeechToText,
                reason: format!("{e:#}"),
            })
    }

    /// Synthesize speech with the local synthesis capability
    pub async fn speak(&self, text: &str) -> Result<Vec<u8>, EngineError> {
        let synthesizer = self
            .capabilities
            .synthesizer()
            .await
            .ok_or(EngineError::CapabilityUnavailable(CapabilityKind::SpeechSynthesis))?;

        synthesizer
            .synthesize(text)
            .await
            .map_err(|e| EngineError::CapabilityFailed {
                kind: CapabilityKind::SpeechSynthesis,
                reason: format!("{e:#}"),
            })
    }

    pub async fn mode(&self) -> ConversationMode {
        *self.mode.read().await
    }

    /// Set the conversation mode. Unknown modes leave the mode unchanged.
    pub async fn set_mode(&self, mode: &str) -> Result<(), EngineError> {
        let mode: ConversationMode = mode.parse()?;
        let mut current = self.mode.write().await;
        if *current != mode {
            info!(from = %*current, to = %mode, "conversation mode changed");
        }
        *current = mode;
        Ok(())
    }

    /// Select the local path or a named cloud provider. The cloud flag is
    /// only set when the cloud client accepts the provider.
    pub async fn switch_provider(&self, name: &str) -> Result<(), EngineError> {
        if name == LOCAL_PROVIDER || name == "contextual" {
            self.use_cloud.store(false, Ordering::SeqCst);
            info!("using local provider");
            return Ok(());
        }

        if self.cloud.switch_provider(name).await {
            self.use_cloud.store(true, Ordering::SeqCst);
            info!(provider = name, "using cloud provider");
            Ok(())
        } else {
            Err(EngineError::ProviderSwitchFailed(name.to_string()))
        }
    }

    pub async fn set_api_key(&self, provider: &str, key: &str) -> bool {
        self.cloud.set_api_key(provider, key).await
    }

    pub async fn clear_history(&self) {
        self.cloud.clear_history().await;
    }

    /// Enable or disable the local-generative strategy
    pub fn set_use_local_model(&self, enabled: bool) {
        self.local_generation.store(enabled, Ordering::SeqCst);
        info!(enabled, "local generation policy updated");
    }

    pub async fn config(&self) -> EngineConfigSnapshot {
        let using_cloud = self.use_cloud.load(Ordering::SeqCst);
        let (provider, configured) = if using_cloud {
            (
                self.cloud.current_provider().await,
                self.cloud.is_configured().await,
            )
        } else {
            (
                ProviderDescriptor {
                    name: LOCAL_PROVIDER.to_string(),
                    model: self.local_model.clone(),
                },
                true,
            )
        };

        EngineConfigSnapshot {
            using_cloud,
            provider,
            mode: *self.mode.read().await,
            configured,
        }
    }
}
