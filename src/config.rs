use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            token: None,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_json::from_str(&content)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api: ApiConfig {
                base_url: std::env::var("DRIFTBOX_API_URL")
                    .unwrap_or_else(|_| default_api_url()),
                token: std::env::var("DRIFTBOX_TOKEN")
                    .ok()
                    .filter(|t| !t.is_empty()),
            },
            session: SessionConfig::default(),
        })
    }

    /// `<config dir>/driftbox/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("driftbox").join("config.json"))
    }

    /// Default config file when present, environment otherwise
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::from_env(),
        }
    }

    /// `path` when it exists, environment otherwise. A missing file is
    /// where a later `save_to_file` will create it.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {}", path.display());
            Self::from_file(path)
        } else {
            debug!("No config at {}, using environment", path.display());
            Self::from_env()
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn set_session(&mut self, token: String, email: &str, user_name: &str) {
        self.api.token = Some(token);
        self.session.email = Some(email.to_string());
        self.session.user_name = Some(user_name.to_string()).filter(|n| !n.is_empty());
    }

    pub fn clear_session(&mut self) {
        self.api.token = None;
        self.session = SessionConfig::default();
    }
}
