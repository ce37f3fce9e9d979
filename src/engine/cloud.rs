//! Cloud chat-completion collaborator
//!
//! [`CloudChat`] is the seam the orchestrator talks to. [`HttpCloudClient`]
//! implements it against OpenAI-compatible `chat/completions` endpoints and
//! keeps a bounded in-memory conversation history.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Which backend answered, and with which model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub model: String,
}

/// A hosted chat-completion service
#[async_trait]
pub trait CloudChat: Send + Sync {
    /// Whether the current provider has what it needs (an API key) to chat
    async fn is_configured(&self) -> bool;

    /// Send one prompt, returning the assistant's reply
    async fn chat(&self, prompt: &str) -> anyhow::Result<String>;

    /// Select a provider by name. Returns false for unknown providers.
    async fn switch_provider(&self, name: &str) -> bool;

    /// Store the API key for a provider. Returns false for unknown providers.
    async fn set_api_key(&self, provider: &str, key: &str) -> bool;

    async fn clear_history(&self);

    async fn current_provider(&self) -> ProviderDescriptor;
}

/// An OpenAI-compatible endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderProfile {
    pub name: &'static str,
    pub base_url: &'static str,
    pub model: &'static str,
}

pub const PROVIDERS: &[ProviderProfile] = &[
    ProviderProfile {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        model: "gpt-4o-mini",
    },
    ProviderProfile {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        model: "deepseek-chat",
    },
    ProviderProfile {
        name: "qwen",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        model: "qwen-turbo",
    },
];

fn find_provider(name: &str) -> Option<&'static ProviderProfile> {
    PROVIDERS.iter().find(|p| p.name == name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

struct CloudState {
    provider: &'static ProviderProfile,
    api_keys: HashMap<String, String>,
    history: Vec<ChatMessage>,
}

/// Chat client for the providers in [`PROVIDERS`]
pub struct HttpCloudClient {
    client: reqwest::Client,
    state: RwLock<CloudState>,
    /// Maximum number of stored messages (user and assistant turns)
    max_history: usize,
}

impl HttpCloudClient {
    /// Create a client for the named provider, falling back to the first
    /// known provider when the name is not recognized
    pub fn new(provider: &str) -> Self {
        let profile = find_provider(provider).unwrap_or(&PROVIDERS[0]);
        if profile.name != provider {
            warn!(requested = provider, using = profile.name, "unknown cloud provider");
        }

        Self {
            client: reqwest::Client::new(),
            state: RwLock::new(CloudState {
                provider: profile,
                api_keys: HashMap::new(),
                history: Vec::new(),
            }),
            max_history: 20,
        }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    async fn record_turn(&self, prompt: &str, reply: &str) {
        let mut state = self.state.write().await;
        state.history.push(ChatMessage::new("user", prompt));
        state.history.push(ChatMessage::new("assistant", reply));

        let excess = state.history.len().saturating_sub(self.max_history);
        if excess > 0 {
            state.history.drain(..excess);
        }
    }

    #[cfg(test)]
    async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }
}

#[async_trait]
impl CloudChat for HttpCloudClient {
    async fn is_configured(&self) -> bool {
        let state = self.state.read().await;
        state
            .api_keys
            .get(state.provider.name)
            .is_some_and(|key| !key.trim().is_empty())
    }

    async fn chat(&self, prompt: &str) -> anyhow::Result<String> {
        let (profile, key, mut messages) = {
            let state = self.state.read().await;
            let key = state
                .api_keys
                .get(state.provider.name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no API key for {}", state.provider.name))?;
            (state.provider, key, state.history.clone())
        };
        messages.push(ChatMessage::new("user", prompt));

        let url = format!("{}/chat/completions", profile.base_url);
        let body = ChatRequest {
            model: profile.model,
            messages: &messages,
            temperature: 0.7,
            max_tokens: 512,
        };

        debug!(provider = profile.name, turns = messages.len(), "sending chat request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} chat failed ({status}): {body}", profile.name);
        }

        let parsed: ChatResponse = response.json().await?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow::anyhow!("{} returned no content", profile.name))?;

        self.record_turn(prompt, &reply).await;
        Ok(reply)
    }

    async fn switch_provider(&self, name: &str) -> bool {
        let Some(profile) = find_provider(name) else {
            warn!(provider = name, "cannot switch to unknown cloud provider");
            return false;
        };

        let mut state = self.state.write().await;
        if state.provider.name != profile.name {
            state.provider = profile;
            state.history.clear();
            info!(provider = name, "cloud provider switched");
        }
        true
    }

    async fn set_api_key(&self, provider: &str, key: &str) -> bool {
        if find_provider(provider).is_none() {
            return false;
        }
        self.state
            .write()
            .await
            .api_keys
            .insert(provider.to_string(), key.trim().to_string());
        info!(provider, "API key updated");
        true
    }

    async fn clear_history(&self) {
        self.state.write().await.history.clear();
        debug!("cloud conversation history cleared");
    }

    async fn current_provider(&self) -> ProviderDescriptor {
        let state = self.state.read().await;
        ProviderDescriptor {
            name: state.provider.name.to_string(),
            model: state.provider.model.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_configured_requires_key_for_current_provider() {
        let client = HttpCloudClient::new("openai");
        assert!(!client.is_configured().await);

        assert!(client.set_api_key("deepseek", "sk-deep").await);
        assert!(!client.is_configured().await);

        assert!(client.set_api_key("openai", "sk-open").await);
        assert!(client.is_configured().await);

        assert!(client.switch_provider("deepseek").await);
        assert!(client.is_configured().await);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let client = HttpCloudClient::new("openai");
        assert!(!client.switch_provider("skynet").await);
        assert!(!client.set_api_key("skynet", "key").await);
        assert_eq!(client.current_provider().await.name, "openai");
    }

    #[tokio::test]
    async fn test_unknown_initial_provider_falls_back() {
        let client = HttpCloudClient::new("nope");
        assert_eq!(client.current_provider().await.name, PROVIDERS[0].name);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let client = HttpCloudClient::new("openai").with_max_history(4);
        for i in 0..5 {
            client.record_turn(&format!("q{i}"), &format!("a{i}")).await;
        }
        assert_eq!(client.history_len().await, 4);

        client.clear_history().await;
        assert_eq!(client.history_len().await, 0);
    }

    #[tokio::test]
    async fn test_chat_without_key_fails() {
        let client = HttpCloudClient::new("openai");
        let err = client.chat("hello").await.unwrap_err();
        assert!(err.to_string().contains("no API key"));
    }
}
