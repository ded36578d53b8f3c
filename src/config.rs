//! Configuration management
//!
//! Runtime configuration for LLM providers, web search, the knowledge store,
//! the working tree and the self-modification retry policy. Everything is an
//! explicit value passed to collaborator constructors; nothing reads ambient
//! globals after load time, so sessions stay independently testable.

use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Web search settings
    #[serde(default)]
    pub search: SearchConfig,
    /// Knowledge store settings
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Working tree settings for the self-modification cycle
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Self-modification retry policy
    #[serde(default)]
    pub selfmod: SelfModConfig,
}

/// LLM provider settings.
///
/// Defaults to the OpenAI endpoint; when an OpenRouter key is configured
/// the client switches to OpenRouter (OpenAI-compatible schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI API key (usually injected via OPENAI_API_KEY)
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// OpenRouter API key (usually injected via OPENROUTER_API_KEY)
    #[serde(default)]
    pub openrouter_api_key: String,
    #[serde(default = "default_openrouter_base_url")]
    pub openrouter_base_url: String,
    #[serde(default = "default_openrouter_model")]
    pub openrouter_model: String,

    /// Request timeout in seconds for completion calls
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_openrouter_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
            openrouter_api_key: String::new(),
            openrouter_base_url: default_openrouter_base_url(),
            openrouter_model: default_openrouter_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Web search (Tavily) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Tavily API key (usually injected via TAVILY_API_KEY)
    #[serde(default)]
    pub tavily_api_key: String,
    /// Maximum results per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

/// Knowledge store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Path to the SQLite database file. When unset (or unopenable) the
    /// store degrades to an in-memory substring-match backend.
    #[serde(default = "default_database_path")]
    pub database_path: Option<PathBuf>,
    /// Collection name entries are stored under
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Dimension of the deterministic hash embeddings
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

fn default_database_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("forge-agent").join("memory.db"))
}

fn default_collection() -> String {
    "agent_memory".to_string()
}

fn default_embedding_dim() -> usize {
    384
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            collection: default_collection(),
            embedding_dim: default_embedding_dim(),
        }
    }
}

/// Working tree settings for the self-modification cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Repository root all apply/test/merge operations are confined to
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,
    /// Command used to run the project's test suite
    #[serde(default = "default_test_command")]
    pub test_command: String,
    /// Timeout in seconds for each subprocess (apply, tests, merge)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_test_command() -> String {
    "cargo test --quiet".to_string()
}

fn default_command_timeout() -> u64 {
    300
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            repo_root: default_repo_root(),
            test_command: default_test_command(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// Self-modification retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfModConfig {
    /// Maximum failing patch/test cycles before the session is abandoned
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
}

fn default_retry_budget() -> u32 {
    3
}

impl Default for SelfModConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
        }
    }
}

impl Config {
    /// Load configuration from disk, creating the default file if absent.
    /// Environment variables override the stored API keys.
    pub fn load() -> Result<Self> {
        let path = config_path()?;

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read config file")?;
            toml::from_str(&contents)
                .context("Failed to parse config file")?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = config_path()?;
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Let environment variables override stored secrets so keys never
    /// have to live in the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = key;
        }
        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            self.llm.openrouter_api_key = key;
        }
        if let Ok(key) = std::env::var("TAVILY_API_KEY") {
            self.search.tavily_api_key = key;
        }
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .context("Failed to resolve config directory")?;
    Ok(base.join("forge-agent").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.selfmod.retry_budget, 3);
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.llm.openai_base_url, "https://api.openai.com/v1");
        assert_eq!(config.workspace.repo_root, PathBuf::from("."));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.selfmod.retry_budget, config.selfmod.retry_budget);
        assert_eq!(parsed.workspace.test_command, config.workspace.test_command);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[selfmod]\nretry_budget = 5\n").unwrap();
        assert_eq!(parsed.selfmod.retry_budget, 5);
        assert_eq!(parsed.search.max_results, 5);
        assert_eq!(parsed.llm.timeout_secs, 120);
    }
}
