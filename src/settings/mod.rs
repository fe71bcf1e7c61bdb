use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upstream provider selector. Persisted with the settings; only `openai`
/// is wired to the chat pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
}

/// Process-wide settings: the API key and the provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: String,
    pub provider: Provider,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            provider: Provider::OpenAi,
        }
    }
}

/// Settings persistence (JSON file in the app data dir). Read per access,
/// overwritten wholesale on save.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("settings.json"),
        }
    }

    /// Current settings; defaults when the file is missing or unreadable.
    pub fn load(&self) -> Settings {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Settings::default(),
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("settings file unreadable, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(settings)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());

        let settings = store.load();
        assert_eq!(settings.api_key, "");
        assert_eq!(settings.provider, Provider::OpenAi);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());

        store
            .save(&Settings {
                api_key: "sk-test".to_string(),
                provider: Provider::Anthropic,
            })
            .unwrap();

        let settings = store.load();
        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.provider, Provider::Anthropic);
    }

    #[test]
    fn test_provider_wire_names() {
        let json = serde_json::to_string(&Settings {
            api_key: "k".to_string(),
            provider: Provider::OpenAi,
        })
        .unwrap();
        assert!(json.contains("\"apiKey\""));
        assert!(json.contains("\"openai\""));

        let parsed: Settings = serde_json::from_str(r#"{"apiKey":"x","provider":"anthropic"}"#).unwrap();
        assert_eq!(parsed.provider, Provider::Anthropic);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());
        std::fs::write(dir.path().join("settings.json"), "not json").unwrap();

        let settings = store.load();
        assert_eq!(settings.api_key, "");
    }
}
