//! Configuration module for the LMS job service and client.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {name} value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {}", other)),
        }
    }
}

/// Owner assigned to `LMS_API_KEY` and to every caller when auth is disabled.
pub const DEFAULT_OWNER: &str = "admin";

/// An API key and the user it authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub owner: String,
    pub key: String,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Accepted API keys and their owners (auth disabled when empty)
    pub api_keys: Vec<ApiKey>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// How long finished jobs stay queryable
    pub job_retention: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut api_keys = Vec::new();
        if let Some(key) = lookup("LMS_API_KEY").filter(|k| !k.is_empty()) {
            api_keys.push(ApiKey {
                owner: DEFAULT_OWNER.to_string(),
                key,
            });
        }
        if let Some(list) = lookup("LMS_API_KEYS") {
            api_keys.extend(parse_api_keys(&list)?);
        }
        let db_path = lookup("LMS_DB_PATH")
            .unwrap_or_else(|| "./data/lms.sqlite".to_string())
            .into();
        let bind_addr = parse_var(&lookup, "LMS_BIND_ADDR", "127.0.0.1:8080")?;
        let log_level = lookup("LMS_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_format = parse_var(&lookup, "LMS_LOG_FORMAT", "text")?;
        let retention_secs: u64 = parse_var(&lookup, "LMS_JOB_RETENTION_SECS", "5")?;

        Ok(Self {
            api_keys,
            db_path,
            bind_addr,
            log_level,
            log_format,
            job_retention: Duration::from_secs(retention_secs),
        })
    }
}

/// Client configuration for talking to a running LMS job service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the service, without the `/api` suffix
    pub base_url: String,
    pub api_key: Option<String>,
    /// Delay between job status polls
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("LMS_API_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        let api_key = lookup("LMS_API_KEY").filter(|k| !k.is_empty());
        let poll_ms: u64 = parse_var(&lookup, "LMS_POLL_INTERVAL_MS", "2000")?;
        let timeout_secs: u64 = parse_var(&lookup, "LMS_REQUEST_TIMEOUT_SECS", "30")?;

        Ok(Self {
            base_url,
            api_key,
            poll_interval: Duration::from_millis(poll_ms),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Parse `owner=key` pairs separated by commas.
fn parse_api_keys(list: &str) -> Result<Vec<ApiKey>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((owner, key)) if !owner.trim().is_empty() && !key.trim().is_empty() => Ok(ApiKey {
                owner: owner.trim().to_string(),
                key: key.trim().to_string(),
            }),
            _ => Err(ConfigError::Invalid {
                name: "LMS_API_KEYS",
                value: entry.to_string(),
                reason: "expected owner=key".to_string(),
            }),
        })
        .collect()
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: value.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();

        assert!(config.api_keys.is_empty());
        assert_eq!(config.db_path, PathBuf::from("./data/lms.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.job_retention, Duration::from_secs(5));
    }

    #[test]
    fn test_api_keys_map_to_owners() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("LMS_API_KEY", "root-key"),
            ("LMS_API_KEYS", "alice=k1, bob = k2,"),
        ]))
        .unwrap();

        let owners: Vec<_> = config
            .api_keys
            .iter()
            .map(|k| (k.owner.as_str(), k.key.as_str()))
            .collect();
        assert_eq!(owners, vec![(DEFAULT_OWNER, "root-key"), ("alice", "k1"), ("bob", "k2")]);
    }

    #[test]
    fn test_malformed_api_keys() {
        let err = ServerConfig::from_lookup(lookup(&[("LMS_API_KEYS", "alice")])).unwrap_err();
        assert!(err.to_string().contains("LMS_API_KEYS"));
    }

    #[test]
    fn test_invalid_bind_addr() {
        let err = ServerConfig::from_lookup(lookup(&[("LMS_BIND_ADDR", "nope")])).unwrap_err();
        assert!(err.to_string().contains("LMS_BIND_ADDR"));
    }

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert!(config.api_key.is_none());
        assert_eq!(config.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_client_config_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("LMS_API_URL", "https://phish.example.com/"),
            ("LMS_API_KEY", "secret"),
            ("LMS_POLL_INTERVAL_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://phish.example.com");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }
}
