//! Application configuration
//!
//! Layered as defaults, then `<config_dir>/qurma/config.toml`, then the
//! environment.

use crate::llm::config::{ChatOptions, GatewayConfig};
use crate::messages::DEFAULT_STORAGE_KEY;
use crate::speech::capture::VoiceConfig;
use crate::{QurmaError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];
const DATA_DIR_VAR: &str = "QURMA_DATA_DIR";

/// Where chat history is kept
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the history file; platform data dir when unset
    pub data_dir: Option<PathBuf>,

    /// Storage key, also the history file stem
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("qurma")))
            .unwrap_or_else(|| PathBuf::from(".qurma"))
    }
}

/// Configuration for the complete application
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub chat: ChatOptions,
    pub voice: VoiceConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Default location of the config file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("qurma").join("config.toml"))
    }

    /// Load from the default file (if present) and the process environment
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => {
                debug!("No config file, using defaults");
                Self::default()
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QurmaError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| QurmaError::ConfigError(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| QurmaError::ConfigError(e.to_string()))
    }

    /// Overlay environment values; `lookup` returns a variable's value if set
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let key = API_KEY_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty());
        if let Some(key) = key {
            self.gateway.api_key = Some(key);
        }

        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|d| !d.trim().is_empty()) {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Set the API credential
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.gateway.api_key = Some(api_key.into());
        self
    }

    /// Set the history directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.data_dir = Some(dir.into());
        self
    }

    pub fn with_voice(mut self, voice: VoiceConfig) -> Self {
        self.voice = voice;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.gateway.credential().is_none() {
            return Err(QurmaError::ConfigError(format!(
                "API key is not set; export {} or set gateway.api_key",
                API_KEY_VARS[0]
            )));
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(QurmaError::ConfigError(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.storage.key.trim().is_empty() {
            return Err(QurmaError::ConfigError("storage key must not be empty".into()));
        }
        self.voice.validate()
    }
}
