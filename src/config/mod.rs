//! Configuration management for the rythm server.
//!
//! Configuration is read from `~/.config/rythm/config.toml` at startup, or
//! from the path given with `--config`. If the default file doesn't exist, a
//! configuration with comments is created. A few `RYTHM_*` environment
//! variables override file values.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::auth::password::DEFAULT_ROUNDS;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    /// Social login clients keyed by provider name (`github`, `google`,
    /// `linkedin`, `twitter`).
    pub oauth: BTreeMap<String, OAuthClientConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Origins allowed by CORS. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub password_rounds: u32,
    /// Externally visible base URL, used in activation links and OAuth
    /// callbacks.
    pub public_url: String,
    /// New local accounts must follow an activation link before login.
    pub activation_required: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24 * 7,
            password_rounds: DEFAULT_ROUNDS,
            public_url: "http://localhost:8080".to_string(),
            activation_required: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
}

impl OAuthClientConfig {
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl Config {
    /// Load configuration from `path`, or from the default path.
    ///
    /// A missing default file is created with comments. A missing explicit
    /// path is an error. Missing fields use default values. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let config_path = Self::default_config_path()?;
                if config_path.exists() {
                    Self::from_file(&config_path)?
                } else {
                    Self::create_default_config(&config_path)?;
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/rythm/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("rythm").join("config.toml"))
    }

    /// Apply `RYTHM_*` overrides. `lookup` resolves a variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("RYTHM_BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = lookup("RYTHM_DATABASE") {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("RYTHM_PUBLIC_URL") {
            self.auth.public_url = url;
        }

        for kind in crate::auth::ProviderKind::ALL {
            let prefix = format!("RYTHM_{}", kind.name().to_uppercase());
            let id = lookup(&format!("{prefix}_CLIENT_ID"));
            let secret = lookup(&format!("{prefix}_CLIENT_SECRET"));
            if id.is_none() && secret.is_none() {
                continue;
            }

            let client = self.oauth.entry(kind.name().to_string()).or_default();
            if let Some(id) = id {
                client.client_id = id;
            }
            if let Some(secret) = secret {
                client.client_secret = secret;
            }
        }
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# rythm server configuration
#
# Environment overrides:
#   RYTHM_BIND, RYTHM_DATABASE, RYTHM_PUBLIC_URL,
#   RYTHM_<PROVIDER>_CLIENT_ID, RYTHM_<PROVIDER>_CLIENT_SECRET

[server]
bind = "127.0.0.1:8080"

# Origins allowed to call the API from a browser. Empty allows any origin.
allowed_origins = []

[database]
# SQLite database file. Defaults to <data dir>/rythm/rythm.db
# path = "/var/lib/rythm/rythm.db"

[auth]
# Lifetime of a login session
session_ttl_hours = 168

# PBKDF2 iterations. Changing this invalidates existing passwords.
password_rounds = 10000

# Base URL used in activation links and OAuth callbacks
public_url = "http://localhost:8080"

# Require new accounts to follow an activation link before logging in
activation_required = false

# Social login. Supported providers: github, google, linkedin, twitter
# For twitter, client_id and client_secret hold the OAuth 1.0a consumer key
# and secret.
#
# [oauth.github]
# client_id = ""
# client_secret = ""
# redirect_uri = "http://localhost:8080/auth/github/callback"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.auth.password_rounds, 10_000);
        assert_eq!(config.auth.session_ttl_hours, 168);
        assert!(!config.auth.activation_required);
        assert!(config.oauth.is_empty());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[auth]
activation_required = true

[oauth.github]
client_id = "abc"
client_secret = "xyz"
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        // Custom values
        assert!(config.auth.activation_required);
        assert!(config.oauth["github"].is_complete());
        // Default values
        assert_eq!(config.auth.public_url, "http://localhost:8080");
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.auth.session_ttl_hours, 168);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RYTHM_BIND", "0.0.0.0:9000"),
            ("RYTHM_DATABASE", "/tmp/rythm.db"),
            ("RYTHM_GOOGLE_CLIENT_ID", "gid"),
            ("RYTHM_GOOGLE_CLIENT_SECRET", "gsecret"),
            ("RYTHM_TWITTER_CLIENT_ID", "consumer-key"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/rythm.db")));
        assert_eq!(config.oauth["google"].client_id, "gid");
        assert!(config.oauth["google"].is_complete());
        assert!(!config.oauth.contains_key("github"));
        assert_eq!(config.oauth["twitter"].client_id, "consumer-key");
        assert!(!config.oauth["twitter"].is_complete());
    }

    #[test]
    fn test_from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nbind = 42\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));

        let missing = Config::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_create_default_config_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_default_config(&path).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.auth.password_rounds, DEFAULT_ROUNDS);
    }
}
