use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Backend used when neither the config file nor the environment names one
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";

/// Environment override for the backend base path
pub const API_BASE_URL_ENV: &str = "BOOKSHELF_API_BASE_URL";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base path of the book review API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long a cached query stays fresh (0 = always refetch)
    #[serde(default)]
    pub cache_ttl_secs: u64,

    /// Where the session is persisted (defaults to the data dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,

    /// Where cached queries are kept between commands (defaults to the cache dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_ttl_secs: 0,
            session_file: None,
            cache_file: None,
        }
    }
}

impl AppConfig {
    /// Get the config file path
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("bookshelf");

        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            tracing::warn!("Could not create config directory: {}", e);
        }

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from file, or create default, then apply the environment override
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file();
        if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
            config.apply_base_url_override(&url);
        }
        Ok(config)
    }

    fn load_file() -> Self {
        let path = match Self::config_path() {
            Ok(p) => p,
            Err(_) => return AppConfig::default(),
        };

        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match Self::parse(&content) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Failed to parse config: {}", e),
                },
                Err(e) => tracing::warn!("Failed to read config: {}", e),
            }
            // Leave a broken file alone so the user can fix it
            return AppConfig::default();
        }

        let config = AppConfig::default();
        if let Err(e) = config.save() {
            tracing::warn!("Could not write default config: {}", e);
        }
        config
    }

    /// Parse a config document
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace the base URL, ignoring blank values
    pub fn apply_base_url_override(&mut self, url: &str) {
        let url = url.trim();
        if !url.is_empty() {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Resolve the session file path
    pub fn session_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.session_file {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?
            .join("bookshelf");

        Ok(data_dir.join("session.json"))
    }

    /// Resolve the query cache index path
    pub fn cache_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.cache_file {
            return Ok(path.clone());
        }

        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?
            .join("bookshelf");

        Ok(cache_dir.join("queries.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig {
            api_base_url: "https://books.example.com/api/v1".to_string(),
            timeout_secs: 30,
            cache_ttl_secs: 15,
            session_file: Some(PathBuf::from("/tmp/session.json")),
            cache_file: Some(PathBuf::from("/tmp/queries.json")),
        };

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized = AppConfig::parse(&serialized).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = AppConfig::parse("cache_ttl_secs = 5\n").unwrap();

        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.cache_ttl(), Duration::from_secs(5));
        assert!(config.session_file.is_none());
        assert!(config.cache_file.is_none());
    }

    #[test]
    fn test_base_url_override() {
        let mut config = AppConfig::default();

        config.apply_base_url_override("   ");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);

        config.apply_base_url_override("https://api.example.org/v1/");
        assert_eq!(config.api_base_url, "https://api.example.org/v1");
    }

    #[test]
    fn test_explicit_session_path() {
        let config = AppConfig {
            session_file: Some(PathBuf::from("/var/tmp/bookshelf.json")),
            ..Default::default()
        };

        assert_eq!(
            config.session_path().unwrap(),
            PathBuf::from("/var/tmp/bookshelf.json")
        );
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let config = AppConfig {
            timeout_secs: 0,
            ..Default::default()
        };

        assert_eq!(config.timeout(), Duration::from_secs(1));
    }
}
