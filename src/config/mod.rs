//! Configuration loading for the dashboard service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `BOTDESK_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration derived from `BOTDESK_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Base URL of the authentication-and-database backend.
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    /// Publishable key sent with every auth backend request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_anon_key: Option<String>,
    /// Shared HS256 secret for verifying backend-issued session tokens locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_jwt_secret: Option<String>,
    /// Base URL of the chatbot training/ingestion API.
    #[serde(default = "default_training_base_url")]
    pub training_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_api_key: Option<String>,
    /// Domain the embeddable widget snippet points at.
    #[serde(default = "default_widget_domain")]
    pub widget_domain: String,
    /// HMAC key for signing OAuth state tokens (base64 in the environment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_state_secret: Option<Vec<u8>>,
    #[serde(default = "default_session_cache_capacity")]
    pub session_cache_capacity: usize,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Per-operation network timeout budgets in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TimeoutConfig {
    /// TCP connect budget (default: 3000)
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,
    /// Ordinary request/response budget (default: 30000)
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,
    /// File-upload budget (default: 120000)
    #[serde(default = "default_upload_ms")]
    pub upload_ms: u64,
    /// Maximum idle gap between progress-stream events (default: 30000)
    #[serde(default = "default_stream_idle_ms")]
    pub stream_idle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            request_ms: default_request_ms(),
            upload_ms: default_upload_ms(),
            stream_idle_ms: default_stream_idle_ms(),
        }
    }
}

impl TimeoutConfig {
    /// Validate timeout budget bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_ms == 0 || self.connect_ms > 60_000 {
            return Err(ConfigError::InvalidTimeout {
                field: "connect_ms",
                value: self.connect_ms,
            });
        }
        if self.request_ms < self.connect_ms {
            return Err(ConfigError::InvalidTimeout {
                field: "request_ms",
                value: self.request_ms,
            });
        }
        if self.upload_ms < self.request_ms {
            return Err(ConfigError::InvalidTimeout {
                field: "upload_ms",
                value: self.upload_ms,
            });
        }
        if self.stream_idle_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "stream_idle_ms",
                value: self.stream_idle_ms,
            });
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            auth_base_url: default_auth_base_url(),
            auth_anon_key: None,
            auth_jwt_secret: None,
            training_base_url: default_training_base_url(),
            training_api_key: None,
            widget_domain: default_widget_domain(),
            oauth_state_secret: None,
            session_cache_capacity: default_session_cache_capacity(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.auth_anon_key.is_some() {
            config.auth_anon_key = Some("[REDACTED]".to_string());
        }
        if config.auth_jwt_secret.is_some() {
            config.auth_jwt_secret = Some("[REDACTED]".to_string());
        }
        if config.training_api_key.is_some() {
            config.training_api_key = Some("[REDACTED]".to_string());
        }
        if config.oauth_state_secret.is_some() {
            config.oauth_state_secret = Some(b"[REDACTED]".to_vec());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref secret) = self.oauth_state_secret
            && secret.len() < 32
        {
            return Err(ConfigError::InvalidStateSecretLength {
                length: secret.len(),
            });
        }

        // Local and test profiles may run against unauthenticated stand-ins;
        // everything else needs real credentials for both services.
        if !matches!(self.profile.as_str(), "local" | "test") {
            if self.auth_anon_key.is_none() {
                return Err(ConfigError::MissingAuthAnonKey);
            }
            if self.training_api_key.is_none() {
                return Err(ConfigError::MissingTrainingApiKey);
            }
            if self.oauth_state_secret.is_none() {
                return Err(ConfigError::MissingStateSecret);
            }
        }

        if self.session_cache_capacity == 0 {
            return Err(ConfigError::InvalidSessionCacheCapacity);
        }

        self.timeouts.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_auth_base_url() -> String {
    "http://localhost:9999".to_string()
}

fn default_training_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_widget_domain() -> String {
    "localhost:3001".to_string()
}

fn default_session_cache_capacity() -> usize {
    512
}

fn default_connect_ms() -> u64 {
    3_000
}

fn default_request_ms() -> u64 {
    30_000
}

fn default_upload_ms() -> u64 {
    120_000
}

fn default_stream_idle_ms() -> u64 {
    30_000
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("auth backend publishable key is missing; set BOTDESK_AUTH_ANON_KEY")]
    MissingAuthAnonKey,
    #[error("training API key is missing; set BOTDESK_TRAINING_API_KEY")]
    MissingTrainingApiKey,
    #[error("OAuth state secret is missing; set BOTDESK_OAUTH_STATE_SECRET")]
    MissingStateSecret,
    #[error("OAuth state secret is invalid base64: {error}")]
    InvalidStateSecretBase64 { error: String },
    #[error("OAuth state secret must decode to at least 32 bytes, got {length} bytes")]
    InvalidStateSecretLength { length: usize },
    #[error("session cache capacity must be positive")]
    InvalidSessionCacheCapacity,
    #[error("timeout budget {field} is out of bounds, got {value}")]
    InvalidTimeout { field: &'static str, value: u64 },
}

/// Loads configuration using layered `.env` files and `BOTDESK_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration from layered env files plus the process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("BOTDESK_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let auth_base_url = layered
            .remove("AUTH_BASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_auth_base_url);
        let auth_anon_key = layered.remove("AUTH_ANON_KEY").filter(|v| !v.is_empty());
        let auth_jwt_secret = layered.remove("AUTH_JWT_SECRET").filter(|v| !v.is_empty());
        let training_base_url = layered
            .remove("TRAINING_BASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_training_base_url);
        let training_api_key = layered
            .remove("TRAINING_API_KEY")
            .filter(|v| !v.is_empty());
        let widget_domain = layered
            .remove("WIDGET_DOMAIN")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_widget_domain);

        let oauth_state_secret = if let Some(secret_str) = layered.remove("OAUTH_STATE_SECRET") {
            use base64::{Engine as _, engine::general_purpose};
            let decoded = general_purpose::STANDARD.decode(&secret_str).map_err(|e| {
                ConfigError::InvalidStateSecretBase64 {
                    error: e.to_string(),
                }
            })?;
            if decoded.is_empty() { None } else { Some(decoded) }
        } else {
            None
        };

        let session_cache_capacity = layered
            .remove("SESSION_CACHE_CAPACITY")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_session_cache_capacity);

        let timeouts = TimeoutConfig {
            connect_ms: layered
                .remove("TIMEOUT_CONNECT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_connect_ms),
            request_ms: layered
                .remove("TIMEOUT_REQUEST_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_request_ms),
            upload_ms: layered
                .remove("TIMEOUT_UPLOAD_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_upload_ms),
            stream_idle_ms: layered
                .remove("TIMEOUT_STREAM_IDLE_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_stream_idle_ms),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            auth_base_url,
            auth_anon_key,
            auth_jwt_secret,
            training_base_url,
            training_api_key,
            widget_domain,
            oauth_state_secret,
            session_cache_capacity,
            timeouts,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("BOTDESK_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("BOTDESK_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.bind_addr().is_ok());
    }

    #[test]
    fn non_local_profile_requires_credentials() {
        let config = AppConfig {
            profile: "production".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingAuthAnonKey)
        ));
    }

    #[test]
    fn short_state_secret_rejected() {
        let config = AppConfig {
            oauth_state_secret: Some(vec![0u8; 16]),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStateSecretLength { length: 16 })
        ));
    }

    #[test]
    fn timeout_ordering_enforced() {
        let config = AppConfig {
            timeouts: TimeoutConfig {
                connect_ms: 5_000,
                request_ms: 1_000,
                upload_ms: 120_000,
                stream_idle_ms: 30_000,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout {
                field: "request_ms",
                ..
            })
        ));
    }

    #[test]
    fn redacted_json_hides_secrets() {
        let config = AppConfig {
            auth_anon_key: Some("anon-key".to_string()),
            auth_jwt_secret: Some("jwt-secret".to_string()),
            training_api_key: Some("training-key".to_string()),
            ..Default::default()
        };

        let redacted = config.redacted_json().unwrap();
        assert!(!redacted.contains("anon-key"));
        assert!(!redacted.contains("jwt-secret"));
        assert!(!redacted.contains("training-key"));
        assert!(redacted.contains("[REDACTED]"));
    }
}
