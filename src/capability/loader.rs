//! Model loader backed by a local model directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::registry::{ModelLoader, SpeechSynthesizer, SpeechToText, TextGenerator};

/// Resolves model files under a directory.
///
/// No inference runtime is linked into the daemon, so a model that is
/// present on disk still reports as unavailable. The loader exists so that
/// startup reports which capability is missing and why.
#[derive(Debug, Clone)]
pub struct ModelDirLoader {
    model_dir: PathBuf,
    generator_model: String,
    transcriber_model: String,
    synthesizer_model: String,
}

impl ModelDirLoader {
    pub fn new(model_dir: impl Into<PathBuf>, generator_model: impl Into<String>) -> Self {
        Self {
            model_dir: model_dir.into(),
            generator_model: generator_model.into(),
            transcriber_model: "whisper-asr".to_string(),
            synthesizer_model: "speecht5_tts".to_string(),
        }
    }

    fn resolve(&self, name: &str) -> anyhow::Result<PathBuf> {
        let path = self.model_dir.join(name);
        if !Path::new(&path).exists() {
            anyhow::bail!("model not found: {}", path.display());
        }
        Ok(path)
    }

    fn no_runtime(path: &Path) -> anyhow::Error {
        anyhow::anyhow!("no inference runtime available for {}", path.display())
    }
}

#[async_trait]
impl ModelLoader for ModelDirLoader {
    async fn load_generator(&self) -> anyhow::Result<Arc<dyn TextGenerator>> {
        let path = self.resolve(&self.generator_model)?;
        Err(Self::no_runtime(&path))
    }

    async fn load_transcriber(&self) -> anyhow::Result<Arc<dyn SpeechToText>> {
        let path = self.resolve(&self.transcriber_model)?;
        Err(Self::no_runtime(&path))
    }

    async fn load_synthesizer(&self) -> anyhow::Result<Arc<dyn SpeechSynthesizer>> {
        let path = self.resolve(&self.synthesizer_model)?;
        Err(Self::no_runtime(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_model_names_path() {
        let loader = ModelDirLoader::new("/nonexistent/models", "LaMini-Flan-T5-77M");
        let err = loader.load_generator().await.err().unwrap();
        assert!(err.to_string().contains("model not found"));
        assert!(err.to_string().contains("LaMini-Flan-T5-77M"));
    }
}
