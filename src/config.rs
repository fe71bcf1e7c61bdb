use serde::Deserialize;
use std::path::PathBuf;

const APP_DIR: &str = "com.quickpane.app";

/// Optional `config.toml` next to the logs and database. Everything has a
/// default, so a missing file is the common case.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Loopback port the gateway binds.
    pub port: u16,
    /// Provider model override.
    pub model: Option<String>,
    /// Provider base URL override (OpenAI-compatible endpoints).
    pub base_url: Option<String>,
    /// Where the database and settings file live.
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 4820,
            model: None,
            base_url: None,
            data_dir: None,
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn load() -> Self {
        let path = Self::config_dir().join("config.toml");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };

        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("failed to parse {:?}, using defaults: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(Self::config_dir)
    }
}
