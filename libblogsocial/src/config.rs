//! Configuration management for Blog Social

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::credentials::CredentialConfig;
use crate::error::{ConfigError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_APP_NAME: &str = "Blog Social";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
}

fn default_base_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check that the base URL is an absolute http(s) URL and the timeout is non-zero
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidValue {
            field: "api.base_url".to_string(),
            reason: format!("'{}' is not a valid URL: {}", self.base_url, e),
        })?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url".to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            }
            .into());
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing config file is not an error; defaults are used instead.
    /// Environment overrides are applied last.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.apply_env_overrides();
        config.api.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Apply `BLOGSOCIAL_API_URL`, `BLOGSOCIAL_APP_NAME` and
    /// `BLOGSOCIAL_MASTER_PASSWORD` on top of whatever was loaded
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("BLOGSOCIAL_API_URL") {
            if !url.is_empty() {
                tracing::debug!("API base URL overridden by BLOGSOCIAL_API_URL");
                self.api.base_url = url;
            }
        }

        if let Ok(name) = std::env::var("BLOGSOCIAL_APP_NAME") {
            if !name.is_empty() {
                self.app.name = name;
            }
        }

        self.credentials.load_master_password_from_env();
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("BLOGSOCIAL_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("blogsocial").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StorageBackend;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var("BLOGSOCIAL_API_URL");
        std::env::remove_var("BLOGSOCIAL_APP_NAME");
        std::env::remove_var("BLOGSOCIAL_CONFIG");
        std::env::remove_var("BLOGSOCIAL_MASTER_PASSWORD");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8080/api/v1");
        assert_eq!(config.api.timeout_ms, 10_000);
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.app.name, "Blog Social");
        assert_eq!(config.credentials.storage, StorageBackend::Keyring);
    }

    #[test]
    fn test_load_from_path_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[api]
base_url = "https://blog.example.com/api/v1"

[credentials]
storage = "memory"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.api.base_url, "https://blog.example.com/api/v1");
        assert_eq!(config.api.timeout_ms, 10_000);
        assert_eq!(config.app.name, "Blog Social");
        assert_eq!(config.credentials.storage, StorageBackend::Memory);
    }

    #[test]
    fn test_load_from_path_rejects_bad_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[api\nbase_url = ").unwrap();

        let result = Config::load_from_path(&path);
        assert!(matches!(
            result,
            Err(crate::error::BlogSocialError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_urls_and_zero_timeout() {
        assert!(ApiConfig::new("not a url", 1000).validate().is_err());
        assert!(ApiConfig::new("ftp://example.com", 1000).validate().is_err());
        assert!(ApiConfig::new("http://localhost:8080/api/v1", 0)
            .validate()
            .is_err());
        assert!(ApiConfig::new("http://localhost:8080/api/v1", 10_000)
            .validate()
            .is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("BLOGSOCIAL_API_URL", "https://staging.example.com/api/v1");
        std::env::set_var("BLOGSOCIAL_APP_NAME", "Blog Social Staging");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.api.base_url, "https://staging.example.com/api/v1");
        assert_eq!(config.app.name, "Blog Social Staging");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var(
            "BLOGSOCIAL_CONFIG",
            temp_dir.path().join("absent.toml").to_string_lossy().to_string(),
        );

        let config = Config::load().unwrap();
        assert_eq!(config.api, ApiConfig::default());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_override() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var(
            "BLOGSOCIAL_CONFIG",
            temp_dir.path().join("absent.toml").to_string_lossy().to_string(),
        );
        std::env::set_var("BLOGSOCIAL_API_URL", "localhost:8080");

        assert!(Config::load().is_err());
        clear_env();
    }
}
