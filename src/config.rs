use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: String,
    pub model: String,
    pub api_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Run a grounding search pass before each generation.
    pub search_enabled: bool,
    /// Ask the model for improvement ideas after every new version.
    pub auto_suggest: bool,
    pub open_browser: bool,
    pub preview_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_url: GEMINI_API_URL.to_string(),
            api_key: String::new(),
            request_timeout_secs: 300,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            search_enabled: false,
            auto_suggest: true,
            open_browser: false,
            preview_dir: Config::base_dir().join("preview"),
            export_dir: PathBuf::from("."),
        }
    }
}

impl AiConfig {
    /// The configured key, or the provider's conventional environment variable.
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.trim().is_empty() {
            return self.api_key.trim().to_string();
        }
        let var = match self.provider.to_lowercase().as_str() {
            "gemini" | "google" => "GEMINI_API_KEY",
            _ => "OPENAI_API_KEY",
        };
        std::env::var(var).unwrap_or_default()
    }

    /// Switch provider, resetting the endpoint when it still points at the old default.
    pub fn set_provider(&mut self, provider: &str) {
        self.provider = provider.to_string();
        let default_url = match provider.to_lowercase().as_str() {
            "gemini" | "google" => GEMINI_API_URL,
            _ => OPENAI_API_URL,
        };
        if self.api_url == GEMINI_API_URL || self.api_url == OPENAI_API_URL || self.api_url.is_empty() {
            self.api_url = default_url.to_string();
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// `~/.techcode`, or `./.techcode` when no home directory is known.
    pub fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".techcode")
    }

    pub fn get_config_path() -> PathBuf {
        Self::base_dir().join("config.yaml")
    }

    pub fn load_or_default() -> Result<Self> {
        Self::load_or_default_from(Self::get_config_path())
    }

    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            match Self::load_from_file(path) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                }
            }
        }

        Ok(Self::default())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(Self::get_config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.ai.model = "gemini-2.5-pro".to_string();
        config.session.search_enabled = true;
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.ai.model, "gemini-2.5-pro");
        assert!(loaded.session.search_enabled);
        assert_eq!(loaded.session.preview_dir, config.session.preview_dir);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "ai:\n  provider: openai\n  model: gpt-4o\n").unwrap();

        let loaded = Config::load_or_default_from(&path).unwrap();
        assert_eq!(loaded.ai.provider, "openai");
        assert_eq!(loaded.ai.request_timeout_secs, 300);
        assert!(loaded.session.auto_suggest);
    }

    #[test]
    fn broken_files_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "ai: [not, a, map").unwrap();

        let loaded = Config::load_or_default_from(&path).unwrap();
        assert_eq!(loaded.ai.provider, "gemini");
    }

    #[test]
    fn explicit_key_wins_over_environment() {
        let config = AiConfig {
            api_key: "  from-file ".to_string(),
            ..AiConfig::default()
        };
        assert_eq!(config.resolved_api_key(), "from-file");
    }

    #[test]
    fn switching_provider_moves_default_endpoint() {
        let mut config = AiConfig::default();
        config.set_provider("openai");
        assert_eq!(config.api_url, OPENAI_API_URL);

        config.api_url = "http://localhost:11434/v1".to_string();
        config.set_provider("gemini");
        assert_eq!(config.api_url, "http://localhost:11434/v1");
    }
}
