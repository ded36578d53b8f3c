//! LLM client for OpenAI-compatible chat-completion providers
//!
//! Defaults to the OpenAI endpoint; switches to OpenRouter when an
//! OpenRouter key is configured. Responses are parsed leniently through raw
//! JSON path navigation because providers disagree on the exact message
//! shape (string content vs array-of-content-parts).

use anyhow::{Result, Context, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

// ============ Provider Configuration ============

/// Configuration for an LLM API provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    /// API key for authentication
    pub api_key: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Extra headers to include in requests (e.g., X-Title, HTTP-Referer)
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    /// Create an OpenAI provider configuration
    pub fn openai(api_key: String, base_url: String, model: String) -> Self {
        Self {
            base_url,
            api_key,
            model,
            extra_headers: Vec::new(),
        }
    }

    /// Create an OpenRouter provider configuration
    pub fn openrouter(api_key: String, base_url: String, model: String) -> Self {
        Self {
            base_url,
            api_key,
            model,
            extra_headers: vec![
                ("HTTP-Referer".to_string(), "https://github.com/forge-agent".to_string()),
                ("X-Title".to_string(), "Forge Agent".to_string()),
            ],
        }
    }
}

/// Temperature tuning per call site. Planning and patch generation run
/// cooler than research/synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Plan,
    Code,
    Execute,
    Research,
}

impl Purpose {
    fn temperature(self) -> f32 {
        match self {
            Purpose::Plan | Purpose::Code => 0.1,
            Purpose::Execute | Purpose::Research => 0.2,
        }
    }
}

/// A single chat message in OpenAI wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Chat-completion API client
#[derive(Clone)]
pub struct LlmClient {
    client: Arc<Client>,
    provider: ProviderConfig,
    temperature: f32,
}

impl LlmClient {
    /// Create a client with a specific provider configuration
    pub fn with_provider(provider: ProviderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client: Arc::new(client),
            provider,
            temperature: Purpose::Execute.temperature(),
        })
    }

    /// Create a client from config. Prefers OpenRouter when its key is set,
    /// otherwise uses the OpenAI endpoint.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider = if !config.openrouter_api_key.is_empty() {
            ProviderConfig::openrouter(
                config.openrouter_api_key.clone(),
                config.openrouter_base_url.clone(),
                config.openrouter_model.clone(),
            )
        } else {
            ProviderConfig::openai(
                config.openai_api_key.clone(),
                config.openai_base_url.clone(),
                config.openai_model.clone(),
            )
        };

        Self::with_provider(provider, Duration::from_secs(config.timeout_secs))
    }

    /// Create a client from config tuned for a given purpose
    pub fn for_purpose(config: &LlmConfig, purpose: Purpose) -> Result<Self> {
        let mut client = Self::from_config(config)?;
        client.temperature = purpose.temperature();
        Ok(client)
    }

    /// Get the provider configuration
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Single system+user turn, returning the assistant's text
    pub async fn chat(&self, system: &str, user: &str) -> Result<String> {
        self.complete(vec![
            ChatMessage::system(system),
            ChatMessage::user(user),
        ]).await
    }

    /// Send a chat completion request
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: self.provider.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: None,
        };

        let mut req_builder = self.client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        let response = req_builder
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("LLM API error ({}): {}", status, crate::tail_chars(&body, 500));
        }

        let body = response.text().await.context("Failed to read response body")?;

        // Parse as raw Value first for maximum provider compatibility
        let raw: serde_json::Value = serde_json::from_str(&body)
            .with_context(|| format!(
                "Failed to parse JSON response (body: {})",
                crate::tail_chars(&body, 500)
            ))?;

        Ok(extract_content(&raw))
    }
}

/// Extract assistant text from a chat-completion response, handling both
/// string content and array-of-content-parts formats.
fn extract_content(raw: &serde_json::Value) -> String {
    let content_value = raw
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"));

    match content_value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(parts)) => {
            parts.iter().filter_map(|part| {
                if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                    part.get("text").and_then(|t| t.as_str()).map(|s| s.to_string())
                } else {
                    None
                }
            }).collect::<Vec<_>>().join("")
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_creation() {
        let msg = ChatMessage::user("Hello");
        assert_eq!(msg.role, "user");
        assert_eq!(msg.content, "Hello");

        let sys = ChatMessage::system("You are helpful");
        assert_eq!(sys.role, "system");
    }

    #[test]
    fn test_extract_content_string() {
        let raw = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
        });
        assert_eq!(extract_content(&raw), "hi there");
    }

    #[test]
    fn test_extract_content_parts_array() {
        let raw = serde_json::json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "Hello "},
                {"type": "text", "text": "world"}
            ]}}]
        });
        assert_eq!(extract_content(&raw), "Hello world");
    }

    #[test]
    fn test_extract_content_missing() {
        let raw = serde_json::json!({"choices": []});
        assert_eq!(extract_content(&raw), "");
    }

    #[test]
    fn test_provider_selection_prefers_openrouter() {
        let mut config = LlmConfig::default();
        config.openai_api_key = "openai-key".to_string();
        config.openrouter_api_key = "or-key".to_string();

        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(client.provider().base_url, config.openrouter_base_url);
        assert_eq!(client.provider().api_key, "or-key");
    }

    #[test]
    fn test_provider_selection_defaults_to_openai() {
        let mut config = LlmConfig::default();
        config.openai_api_key = "openai-key".to_string();

        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(client.provider().base_url, config.openai_base_url);
        assert!(client.provider().extra_headers.is_empty());
    }

    #[test]
    fn test_purpose_temperatures() {
        assert_eq!(Purpose::Plan.temperature(), 0.1);
        assert_eq!(Purpose::Code.temperature(), 0.1);
        assert_eq!(Purpose::Research.temperature(), 0.2);
    }
}
