//! Client configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{TrustError, TrustResult};

/// Trust core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Backend base URL (endpoints are appended, e.g. `{api_url}/auth/login`).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Persisted session record. `None` selects [`default_session_path`].
    #[serde(default)]
    pub session_path: Option<PathBuf>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// `<platform data dir>/amparo/session.json`.
pub fn default_session_path() -> TrustResult<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| TrustError::Config {
            message: "could not determine a directory for the session record".to_string(),
        })?;

    Ok(base.join("amparo").join("session.json"))
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            session_path: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl TrustConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `AMPARO_API_URL` | Backend base URL |
    /// | `AMPARO_SESSION_FILE` | Persisted session path |
    /// | `AMPARO_HTTP_TIMEOUT` | Request timeout in seconds |
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("AMPARO_API_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_api_url),
            session_path: std::env::var_os("AMPARO_SESSION_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            timeout_secs: std::env::var("AMPARO_HTTP_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
        }
    }

    /// Set the backend base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the session record path.
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Configured session path, or the platform default.
    pub fn resolved_session_path(&self) -> TrustResult<PathBuf> {
        match &self.session_path {
            Some(path) => Ok(path.clone()),
            None => default_session_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("AMPARO_API_URL");
        std::env::remove_var("AMPARO_SESSION_FILE");
        std::env::remove_var("AMPARO_HTTP_TIMEOUT");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = TrustConfig::from_env();
        assert_eq!(config, TrustConfig::default());
        assert_eq!(config.api_url, "http://localhost:3000/api");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("AMPARO_API_URL", "https://amparos.example/api");
        std::env::set_var("AMPARO_SESSION_FILE", "/var/lib/amparo/session.json");
        std::env::set_var("AMPARO_HTTP_TIMEOUT", "5");

        let config = TrustConfig::from_env();
        clear_env();

        assert_eq!(config.api_url, "https://amparos.example/api");
        assert_eq!(
            config.resolved_session_path().unwrap(),
            PathBuf::from("/var/lib/amparo/session.json")
        );
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    #[serial]
    fn test_invalid_timeout_falls_back() {
        clear_env();
        std::env::set_var("AMPARO_HTTP_TIMEOUT", "soon");
        let config = TrustConfig::from_env();
        clear_env();
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_builder() {
        let config = TrustConfig::default()
            .with_api_url("http://127.0.0.1:9000")
            .with_session_path("/tmp/s.json")
            .with_timeout_secs(2);
        assert_eq!(config.api_url, "http://127.0.0.1:9000");
        assert_eq!(config.session_path, Some(PathBuf::from("/tmp/s.json")));
        assert_eq!(config.timeout_secs, 2);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: TrustConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TrustConfig::default());
    }
}
