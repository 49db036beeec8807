//! Configuration loading and persistence.
//!
//! Settings live in `config.json` under the platform config directory.
//! Environment variables override the file, so a deployment can inject
//! runtime values without rewriting it.

use std::time::Duration;
use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::channel::transport::http_to_ws_scheme;
use crate::channel::RetryPolicy;
use crate::constants::{
    DEFAULT_BASE_URL, HTTP_REQUEST_TIMEOUT, NOTICES_WS_PATH, RECONNECT_DELAY,
    RECONNECT_FAILURE_THRESHOLD,
};

/// Configuration for the mesh console.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Console base URL. API paths are appended to it.
    pub base_url: String,
    /// Notice channel URL. Derived from `base_url` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Fixed supervisor API key. Not written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Seconds between notice channel reconnect attempts.
    pub reconnect_delay_secs: u64,
    /// Reconnect attempts tolerated before the operator is notified.
    pub retry_threshold: u32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_url: None,
            api_key: None,
            reconnect_delay_secs: RECONNECT_DELAY.as_secs(),
            retry_threshold: RECONNECT_FAILURE_THRESHOLD,
            request_timeout_secs: HTTP_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `MESH_CONSOLE_CONFIG_DIR` env var: explicit override
    /// 2. `MESH_CONSOLE_ENV=test`: `mesh-console-test` under the temp dir
    /// 3. Default: platform config dir (`~/.config/mesh-console` on Linux)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("MESH_CONSOLE_CONFIG_DIR") {
            PathBuf::from(dir)
        } else if crate::env::is_test_mode() {
            std::env::temp_dir().join("mesh-console-test")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("mesh-console")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to the defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file() {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable config file: {e:#}");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Option<Self>> {
        let config_path = Self::config_dir()?.join("config.json");
        if !config_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        Ok(Some(config))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("MESH_CONSOLE_BASE_URL") {
            self.base_url = base_url;
        }

        if let Ok(ws_url) = std::env::var("MESH_CONSOLE_WS_URL") {
            self.ws_url = Some(ws_url);
        }

        if let Ok(api_key) = std::env::var("MESH_CONSOLE_API_KEY") {
            self.api_key = Some(api_key);
        }

        if let Ok(delay) = std::env::var("MESH_CONSOLE_RECONNECT_DELAY_SECS") {
            if let Ok(delay) = delay.parse::<u64>() {
                self.reconnect_delay_secs = delay;
            }
        }

        if let Ok(threshold) = std::env::var("MESH_CONSOLE_RETRY_THRESHOLD") {
            if let Ok(threshold) = threshold.parse::<u32>() {
                self.retry_threshold = threshold;
            }
        }

        if let Ok(timeout) = std::env::var("MESH_CONSOLE_REQUEST_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.request_timeout_secs = timeout;
            }
        }
    }

    /// Persists the current configuration to disk. The API key is never
    /// written.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Notice channel URL: the explicit one, else the base URL with the
    /// notices path and a WebSocket scheme.
    pub fn notices_url(&self) -> String {
        match &self.ws_url {
            Some(url) => http_to_ws_scheme(url),
            None => http_to_ws_scheme(&format!(
                "{}{}",
                self.base_url.trim_end_matches('/'),
                NOTICES_WS_PATH
            )),
        }
    }

    /// Reconnect policy for the notice channel.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_secs(self.reconnect_delay_secs),
            failure_threshold: self.retry_threshold,
        }
    }

    /// Request timeout for the API client.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
