//! Configuration management for Bugbuster
//!
//! Configuration is a TOML file with one section per component. Values can be
//! overridden per environment variable (`BUGBUSTER_SECTION__KEY=value`) and per
//! named profile.

use crate::error::{BugbusterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub compose: ComposeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// SQLite file name inside `data_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

fn default_database_file() -> String {
    "defects.db".to_string()
}

impl StorageConfig {
    /// Absolute path of the SQLite database
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(expand_path(&self.data_dir)?.join(&self.database_file))
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "fastembed" or "hashing"
    pub provider: String,
    pub model: String,
    /// Vector size for the hashing provider
    pub dimension: usize,
    pub batch_size: usize,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_similarity: f32,
    /// Cap on ListAll results, unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_limit: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.3,
            list_limit: None,
        }
    }
}

/// Intent classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    pub known_services: Vec<String>,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            known_services: default_known_services(),
        }
    }
}

/// Services recognized without the word "service"
pub fn default_known_services() -> Vec<String> {
    ["kafka", "mongodb", "notification", "login", "policy"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Conversation history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub max_turns: usize,
    /// Turns included in the prompt
    pub history_in_prompt: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            history_in_prompt: 3,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// When false, answers come from the offline extractive model
    pub enabled: bool,
    pub provider: String,
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

/// Answer composition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Issue tracker browse URL, keys are appended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_base_url: Option<String>,
    /// Relevance of the entry wrapping unparseable model output
    pub fallback_relevance: f32,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            issue_base_url: None,
            fallback_relevance: 0.5,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed CORS origins, any origin when empty
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BugbusterError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BugbusterError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BugbusterError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| BugbusterError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self.profiles.get(profile).cloned().ok_or_else(|| {
            BugbusterError::InvalidConfigValue {
                path: format!("profiles.{}", profile),
                message: "Profile is not defined".to_string(),
            }
        })?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        tracing::debug!("Applied profile '{}'", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: BUGBUSTER_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("BUGBUSTER_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__ENABLED" => self.llm.enabled = parse_value(path, value)?,
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "LLM__TIMEOUT_SECS" => self.llm.timeout_secs = parse_value(path, value)?,
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_value(path, value)?,
            "RETRIEVAL__MIN_SIMILARITY" => {
                self.retrieval.min_similarity = parse_value(path, value)?
            }
            "SERVER__BIND" => self.server.bind = value.to_string(),
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            BugbusterError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("bugbuster").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| BugbusterError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".bugbuster"))
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| BugbusterError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| BugbusterError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| BugbusterError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.bugbuster"),
                database_file: default_database_file(),
            },
            embedding: EmbeddingConfig {
                provider: "fastembed".to_string(),
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
            },
            retrieval: RetrievalConfig::default(),
            intent: IntentConfig::default(),
            conversation: ConversationConfig::default(),
            llm: LlmConfig {
                enabled: false,
                provider: "openai".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.2,
                max_tokens: 1024,
                timeout_secs: 30,
                max_retries: 1,
                retry_backoff_ms: 500,
            },
            compose: ComposeConfig::default(),
            server: ServerConfig::default(),
            profiles: HashMap::new(),
        }
    }
}
