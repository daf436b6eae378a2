//! Environment and file configuration.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::render::DisplayStyle;

pub const CONFIG_DIR: &str = "ai-chat";
pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_LOG_FILE: &str = "ai-chat.log";

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_PROVIDER: &str = "AI_CHAT_PROVIDER";
pub const ENV_MODEL: &str = "AI_CHAT_MODEL";
pub const ENV_LOG: &str = "AI_CHAT_LOG";

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_key: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string_opt(ENV_API_KEY),
            provider: env_string_opt(ENV_PROVIDER),
            model: env_string_opt(ENV_MODEL),
            log_filter: env_string_opt(ENV_LOG),
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}

/// Persisted client settings, `<config dir>/ai-chat/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub display_style: DisplayStyle,
    pub model: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR))
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Reads the config, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to read config, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to parse config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }

    /// Log file from the config, else `ai-chat.log` next to the config file.
    pub fn log_path(&self) -> PathBuf {
        if let Some(path) = &self.log_file {
            return path.clone();
        }
        Self::default_dir()
            .map(|dir| dir.join(DEFAULT_LOG_FILE))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
    }
}
