//! Server configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PORT` | 8080 | Listen port |
//! | `MIRADOR_ENV` | development | `development` or `production` |
//! | `MIRADOR_STORE_URL` | (none) | Vector store base URL; in-memory store when unset (development only) |
//! | `MIRADOR_STORE_API_KEY` | (none) | Bearer key for the vector store |
//! | `MIRADOR_STORE_TIMEOUT_SECS` | 10 | Per-call store timeout |
//! | `MIRADOR_CACHE_URL` | (none) | Cache daemon URL; in-process cache when unset |
//! | `MIRADOR_RCA_ENDPOINT` | (none) | RCA engine base URL |
//! | `MIRADOR_ALERT_ENDPOINTS` | (none) | Comma-separated Alert engine endpoints |
//! | `MIRADOR_PREDICT_ENDPOINTS` | (none) | Comma-separated Predict engine endpoints |

use std::time::Duration;

use mirador_engines::Environment;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default per-call store timeout in seconds.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Fully-resolved server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
    pub environment: Environment,
    pub store_url: Option<String>,
    pub store_api_key: Option<String>,
    pub store_timeout: Duration,
    pub cache_url: Option<String>,
    pub rca_endpoint: Option<String>,
    pub alert_endpoints: Vec<String>,
    pub predict_endpoints: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: Environment::Development,
            store_url: None,
            store_api_key: None,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            cache_url: None,
            rca_endpoint: None,
            alert_endpoints: Vec::new(),
            predict_endpoints: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            environment: Environment::from_str_or_default(
                &std::env::var("MIRADOR_ENV").unwrap_or_default(),
            ),
            store_url: non_empty(std::env::var("MIRADOR_STORE_URL").ok()),
            store_api_key: non_empty(std::env::var("MIRADOR_STORE_API_KEY").ok()),
            store_timeout: Duration::from_secs(
                std::env::var("MIRADOR_STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_STORE_TIMEOUT_SECS),
            ),
            cache_url: non_empty(std::env::var("MIRADOR_CACHE_URL").ok()),
            rca_endpoint: non_empty(std::env::var("MIRADOR_RCA_ENDPOINT").ok()),
            alert_endpoints: split_list(std::env::var("MIRADOR_ALERT_ENDPOINTS").ok()),
            predict_endpoints: split_list(std::env::var("MIRADOR_PREDICT_ENDPOINTS").ok()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.store_url.is_none());
        assert!(config.alert_endpoints.is_empty());
    }

    #[test]
    fn list_splitting() {
        assert_eq!(
            split_list(Some("http://a:9000, http://b:9000,,".into())),
            vec!["http://a:9000".to_string(), "http://b:9000".to_string()]
        );
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn empty_strings_are_none() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(Some("x".into())), Some("x".into()));
    }
}
