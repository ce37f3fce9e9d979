//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::engine::EngineSettings;
use crate::prompt::ConversationMode;
use crate::state::SessionTimings;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Directory holding local model files
    pub model_dir: PathBuf,

    /// Name the companion introduces itself with
    pub persona: String,

    /// Initial conversation mode
    pub mode: ConversationMode,

    /// Local text generation model, under `model_dir`
    pub local_model: String,

    /// Cloud provider selected at startup
    pub cloud_provider: String,

    /// API key for `cloud_provider`, if any
    pub api_key: Option<String>,

    /// Route messages to the cloud when it is configured
    pub use_cloud: bool,

    /// Use the local generator instead of contextual replies
    pub local_generation: bool,

    /// Attempt to load speech synthesis
    pub load_synthesis: bool,

    /// Display delays for the speech session
    pub session: SessionTimings,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a key lookup (the environment, in `load`)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME").context("HOME is not set")?;

        let data_dir = lookup("COMPANION_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                PathBuf::from(&home)
                    .join(".local")
                    .join("share")
                    .join("companion")
            });

        let socket_path = lookup("COMPANION_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let model_dir = lookup("COMPANION_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("models"));

        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(default)
        };

        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(v) => {
                    let ms: u64 = v
                        .trim()
                        .parse()
                        .with_context(|| format!("{key} must be a number of milliseconds"))?;
                    Ok(Duration::from_millis(ms))
                }
                None => Ok(default),
            }
        };

        let defaults = SessionTimings::default();
        let session = SessionTimings {
            start_delay: millis("COMPANION_START_DELAY_MS", defaults.start_delay)?,
            hide_delay: millis("COMPANION_HIDE_DELAY_MS", defaults.hide_delay)?,
            error_display: millis("COMPANION_ERROR_DISPLAY_MS", defaults.error_display)?,
        };

        Ok(Self {
            socket_path,
            data_dir,
            model_dir,
            persona: lookup("COMPANION_PERSONA").unwrap_or_else(|| "Bella".to_string()),
            mode: ConversationMode::from_stored(lookup("COMPANION_MODE").as_deref()),
            local_model: lookup("COMPANION_LOCAL_MODEL")
                .unwrap_or_else(|| "LaMini-Flan-T5-77M".to_string()),
            cloud_provider: lookup("COMPANION_CLOUD_PROVIDER")
                .unwrap_or_else(|| "openai".to_string()),
            api_key: lookup("COMPANION_API_KEY").filter(|k| !k.trim().is_empty()),
            use_cloud: flag("COMPANION_USE_CLOUD", false),
            local_generation: flag("COMPANION_LOCAL_GENERATION", false),
            load_synthesis: flag("COMPANION_SYNTHESIS", false),
            session,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }

    /// Engine settings derived from this configuration
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            persona: self.persona.clone(),
            local_model: self.local_model.clone(),
            mode: self.mode,
            use_cloud: self.use_cloud,
            local_generation: self.local_generation,
            load_synthesis: self.load_synthesis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[("HOME", "/home/ana")])).unwrap();
        assert_eq!(
            config.socket_path,
            PathBuf::from("/home/ana/.local/share/companion/daemon.sock")
        );
        assert_eq!(config.persona, "Bella");
        assert_eq!(config.mode, ConversationMode::Casual);
        assert!(!config.use_cloud);
        assert!(!config.local_generation);
        assert!(config.api_key.is_none());
        assert_eq!(config.session.start_delay, Duration::from_millis(100));
        assert_eq!(config.session.hide_delay, Duration::from_millis(3000));
        assert_eq!(config.session.error_display, Duration::from_millis(4000));
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("HOME", "/home/ana"),
            ("COMPANION_SOCKET", "/tmp/c.sock"),
            ("COMPANION_PERSONA", "Nova"),
            ("COMPANION_MODE", "creative"),
            ("COMPANION_USE_CLOUD", "true"),
            ("COMPANION_API_KEY", "  "),
            ("COMPANION_ERROR_DISPLAY_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/c.sock"));
        assert_eq!(config.persona, "Nova");
        assert_eq!(config.mode, ConversationMode::Creative);
        assert!(config.use_cloud);
        assert!(config.api_key.is_none());
        assert_eq!(config.session.error_display, Duration::from_millis(250));
        assert_eq!(config.engine_settings().persona, "Nova");
    }

    #[test]
    fn test_invalid_mode_falls_back_to_casual() {
        let config = Config::from_lookup(lookup_from(&[
            ("HOME", "/home/ana"),
            ("COMPANION_MODE", "shouty"),
        ]))
        .unwrap();
        assert_eq!(config.mode, ConversationMode::Casual);
    }

    #[test]
    fn test_bad_delay_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[
            ("HOME", "/home/ana"),
            ("COMPANION_HIDE_DELAY_MS", "soon"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_home_is_an_error() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
    }
}
