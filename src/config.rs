// Configuration module for jellyfin-provider
// Provider settings plus the TOML file / environment layering used by the daemon

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ProviderError, Result};

const APP_NAME: &str = "jellyfin-provider";
const CONFIG_FILENAME: &str = "config.toml";

/// Settings consumed by [`crate::JellyfinLibraryProvider`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base Jellyfin server URL
    pub url: String,

    /// Jellyfin API token
    pub token: String,

    /// Jellyfin user name or id
    pub user: String,

    /// Only sections with these names are exposed (case-insensitive, empty = all)
    pub sections: Vec<String>,

    /// Only items with one of these genres are listed (case-insensitive, empty = all)
    pub genres: Vec<String>,

    /// Restrict show mappings to the provider matching the section's metadata fetcher
    pub strict: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            user: String::new(),
            sections: Vec::new(),
            genres: Vec::new(),
            strict: true,
        }
    }
}

impl ProviderConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            user: user.into(),
            ..Self::default()
        }
    }

    /// The connection triple is mandatory.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() || self.token.trim().is_empty() || self.user.trim().is_empty()
        {
            return Err(ProviderError::Config(
                "The Jellyfin provider requires 'url', 'token', and 'user' configuration values"
                    .to_string(),
            ));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(ProviderError::Config(format!(
                "Jellyfin url must start with http:// or https://, got '{}'",
                self.url
            )));
        }
        Ok(())
    }
}

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Jellyfin connection and filtering
    pub jellyfin: ProviderConfig,

    /// Webhook listener
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener port (default: 8097)
    pub port: u16,

    /// Bind address (default: 127.0.0.1)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8097,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

/// Daemon configuration - TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub port: u16,
    pub bind_address: String,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        let config_dir = Self::find_config_dir();
        let config_file = Self::load_config_file(&config_dir);
        Self::build(config_file)
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("JELLYFIN_PROVIDER_CONFIG_DIR") {
            return PathBuf::from(path);
        }

        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_dir: &Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    fn build(config_file: ConfigFile) -> Self {
        let mut provider = config_file.jellyfin;

        if let Ok(url) = std::env::var("JELLYFIN_URL") {
            provider.url = url;
        }
        if let Ok(token) = std::env::var("JELLYFIN_TOKEN") {
            provider.token = token;
        }
        if let Ok(user) = std::env::var("JELLYFIN_USER") {
            provider.user = user;
        }

        let port = std::env::var("JELLYFIN_PROVIDER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(config_file.server.port);

        let bind_address = std::env::var("JELLYFIN_PROVIDER_BIND_ADDRESS")
            .unwrap_or_else(|_| config_file.server.bind_address.clone());

        Self {
            provider,
            port,
            bind_address,
        }
    }

    /// Log configuration status (the token is never printed)
    pub fn log_config(&self) {
        tracing::info!("Jellyfin server: {}", self.provider.url);
        tracing::info!("Jellyfin user: {}", self.provider.user);
        if !self.provider.sections.is_empty() {
            tracing::info!("Section filter: {:?}", self.provider.sections);
        }
        if !self.provider.genres.is_empty() {
            tracing::info!("Genre filter: {:?}", self.provider.genres);
        }
        if self.provider.strict {
            tracing::debug!("Strict show mapping: enabled");
        } else {
            tracing::info!("Strict show mapping: disabled");
        }
        tracing::info!("Webhook listener on {}:{}", self.bind_address, self.port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();
        assert_eq!(config.server.port, 8097);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert!(config.jellyfin.strict);
        assert!(config.jellyfin.sections.is_empty());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[jellyfin]
url = "http://jellyfin.local:8096"
token = "secret"
user = "demo"
sections = ["Anime", "Movies"]
genres = ["Animation"]
strict = false

[server]
port = 9000
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.jellyfin.url, "http://jellyfin.local:8096");
        assert_eq!(config.jellyfin.sections, vec!["Anime", "Movies"]);
        assert_eq!(config.jellyfin.genres, vec!["Animation"]);
        assert!(!config.jellyfin.strict);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1"); // default
        assert!(config.jellyfin.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_connection_values() {
        let missing_token = ProviderConfig::new("http://jellyfin", "", "demo");
        assert!(matches!(
            missing_token.validate(),
            Err(ProviderError::Config(_))
        ));

        let bad_scheme = ProviderConfig::new("jellyfin.local", "token", "demo");
        assert!(bad_scheme.validate().is_err());

        let ok = ProviderConfig::new("https://jellyfin.example", "token", "demo");
        assert!(ok.validate().is_ok());
        assert!(ok.strict);
    }
}
