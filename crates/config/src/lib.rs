//! WORKSHOP LEDGER: Configuration management for Aura
//!
//! Loads and saves the foreman's standing orders from `~/.aura/config.json`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, sessions_dir, workspace_path};

/// Errors in configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("LEDGER IO ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("LEDGER UNREADABLE: {0}")]
    Json(#[from] serde_json::Error),

    #[error("LEDGER NOT FOUND: {0}")]
    NotFound(PathBuf),

    #[error("INVALID LEDGER ENTRY: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which reasoning backend answers the foreman
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    #[default]
    OpenRouter,
    Ollama,
}

impl std::fmt::Display for OracleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleKind::OpenRouter => write!(f, "openrouter"),
            OracleKind::Ollama => write!(f, "ollama"),
        }
    }
}

/// Reasoning backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub provider: OracleKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleKind::default(),
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

/// Plan loop policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForemanConfig {
    #[serde(default = "default_max_reasoning_retries")]
    pub max_reasoning_retries: u32,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,
    #[serde(default = "default_capability_timeout_secs")]
    pub capability_timeout_secs: u64,
    /// Only the last `n` steps are shown to the oracle when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_window: Option<usize>,
    #[serde(default = "default_max_observation_chars")]
    pub max_observation_chars: usize,
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            max_reasoning_retries: default_max_reasoning_retries(),
            max_steps: default_max_steps(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            capability_timeout_secs: default_capability_timeout_secs(),
            history_window: None,
            max_observation_chars: default_max_observation_chars(),
        }
    }
}

fn default_max_reasoning_retries() -> u32 {
    3
}

fn default_max_steps() -> usize {
    20
}

fn default_oracle_timeout_secs() -> u64 {
    120
}

fn default_capability_timeout_secs() -> u64 {
    300
}

fn default_max_observation_chars() -> usize {
    4000
}

/// Web search apprentice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

/// Web fetch apprentice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebFetchConfig {
    #[serde(default = "default_fetch_max_chars")]
    pub max_chars: usize,
}

fn default_fetch_max_chars() -> usize {
    50000
}

impl Default for WebFetchConfig {
    fn default() -> Self {
        Self {
            max_chars: default_fetch_max_chars(),
        }
    }
}

/// Web apprentices
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebConfig {
    #[serde(default)]
    pub search: WebSearchConfig,
    #[serde(default)]
    pub fetch: WebFetchConfig,
}

/// Process apprentice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(default = "default_exec_timeout")]
    pub timeout_secs: u64,
}

fn default_exec_timeout() -> u64 {
    60
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_exec_timeout(),
        }
    }
}

/// Apprentice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprenticeConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub exec: ExecConfig,
}

impl Default for ApprenticeConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            web: WebConfig::default(),
            exec: ExecConfig::default(),
        }
    }
}

fn default_workspace() -> String {
    "~/.aura/workshop".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub foreman: ForemanConfig,
    #[serde(default)]
    pub apprentices: ApprenticeConfig,
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub async fn load() -> Result<Self> {
        let path = config_path();
        let mut config = Self::load_from(&path).await?;
        config.apply_env();
        Ok(config)
    }

    /// Load from specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO LEDGER AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ READING LEDGER FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING LEDGER TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reject policy values the foreman cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.foreman.max_reasoning_retries == 0 {
            return Err(ConfigError::Invalid(
                "foreman.max_reasoning_retries must be at least 1".to_string(),
            ));
        }
        if self.foreman.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "foreman.max_steps must be at least 1".to_string(),
            ));
        }
        if self.foreman.oracle_timeout_secs == 0 || self.foreman.capability_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "foreman timeouts must be non-zero".to_string(),
            ));
        }
        if self.foreman.history_window == Some(0) {
            return Err(ConfigError::Invalid(
                "foreman.history_window must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `AURA_API_KEY`, `AURA_MODEL` and `BRAVE_API_KEY`
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("AURA_API_KEY").ok(),
            std::env::var("AURA_MODEL").ok(),
            std::env::var("BRAVE_API_KEY").ok(),
        );
    }

    /// Apply explicit overrides; empty values are ignored
    pub fn apply_overrides(
        &mut self,
        api_key: Option<String>,
        model: Option<String>,
        brave_key: Option<String>,
    ) {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            debug!("◆ API KEY OVERRIDDEN FROM ENVIRONMENT");
            self.oracle.api_key = key;
        }
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            self.oracle.model = model;
        }
        if let Some(key) = brave_key.filter(|k| !k.is_empty()) {
            self.apprentices.web.search.api_key = key;
        }
    }

    /// Get the apprentices' workspace, with `~` expanded
    pub fn workspace_path(&self) -> PathBuf {
        let path = &self.apprentices.workspace;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        } else if path == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
        PathBuf::from(path)
    }

    /// Get the reasoning backend key, if any
    pub fn api_key(&self) -> Option<String> {
        let key = self.oracle.api_key.clone();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Get the reasoning backend base URL, if overridden
    pub fn api_base(&self) -> Option<String> {
        self.oracle.api_base.clone().filter(|b| !b.is_empty())
    }

    /// Whether the configured backend can be reached without a key
    pub fn oracle_ready(&self) -> bool {
        match self.oracle.provider {
            OracleKind::Ollama => true,
            OracleKind::OpenRouter => self.api_key().is_some(),
        }
    }

    /// Get the reasoning model
    pub fn model(&self) -> String {
        self.oracle.model.clone()
    }

    /// Get the web search API key
    pub fn brave_api_key(&self) -> Option<String> {
        let key = &self.apprentices.web.search.api_key;
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }
}

/// Initialize the ledger and the apprentices' workspace
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("◆ LEDGER ALREADY PRESENT AT {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("◆ LEDGER WRITTEN TO {:?}", config_path);
    }

    let config = Config::load().await?;
    let workspace = config.workspace_path();
    tokio::fs::create_dir_all(&workspace).await?;
    info!("◆ WORKSHOP READY AT {:?}", workspace);

    Ok(config)
}
