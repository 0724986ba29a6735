//! Service configuration.
//!
//! Loaded from YAML, then overridden by environment variables:
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `DUMPGATE_STORAGE_PATH` | Storage root (must be a directory) |
//! | `DUMPGATE_COMPOSITE_ROOT` | Root for composite-addressed dumps (default: storage root) |
//! | `DUMPGATE_EVENT_API_URL` | Capture-event backend base URL |
//! | `DUMPGATE_POLICY_PREFIX` | Prefix of policy names |
//! | `DUMPGATE_POLICY_URL` | Policy engine endpoint |
//! | `DUMPGATE_STEP_UP_URL` | Step-up service endpoint |
//! | `DUMPGATE_TIMEOUT` | Backend request timeout in seconds (default: 30) |
//! | `DUMPGATE_READ_AHEAD_THREADS` | Read-ahead workers (default: 16) |
//! | `DUMPGATE_READ_AHEAD_CHUNK_SIZE` | Read-ahead chunk size in bytes (default: 8 MiB) |
//! | `DUMPGATE_READ_AHEAD_MAX_AGE` | Read-ahead staleness window in seconds (default: 300) |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AccessResult};
use crate::readahead::ReadAheadConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpgateConfig {
    /// Storage root.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    /// Root for composite-addressed heap dumps.
    #[serde(default)]
    pub composite_root: Option<PathBuf>,

    #[serde(default)]
    pub backends: BackendConfig,

    #[serde(default)]
    pub read_ahead: ReadAheadConfig,
}

/// External backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub event_api_url: Option<String>,

    #[serde(default)]
    pub policy_prefix: String,

    #[serde(default)]
    pub policy_url: Option<String>,

    #[serde(default)]
    pub step_up_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            event_api_url: None,
            policy_prefix: String::new(),
            policy_url: None,
            step_up_url: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn event_api_url(&self) -> AccessResult<&str> {
        required(self.event_api_url.as_deref(), "backends.event_api_url")
    }

    pub fn policy_url(&self) -> AccessResult<&str> {
        required(self.policy_url.as_deref(), "backends.policy_url")
    }

    pub fn step_up_url(&self) -> AccessResult<&str> {
        required(self.step_up_url.as_deref(), "backends.step_up_url")
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> AccessResult<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AccessError::config(format!("{} must be set", field))),
    }
}

impl DumpgateConfig {
    /// Parse YAML configuration.
    pub fn from_yaml(content: &str) -> AccessResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| AccessError::config(format!("invalid configuration: {}", e)))
    }

    /// Load a YAML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> AccessResult<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    AccessError::config(format!("failed to read {}: {}", path.display(), e))
                })?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Configuration from environment variables only.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_nonempty("DUMPGATE_STORAGE_PATH") {
            self.storage_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_nonempty("DUMPGATE_COMPOSITE_ROOT") {
            self.composite_root = Some(PathBuf::from(v));
        }
        if let Some(v) = env_nonempty("DUMPGATE_EVENT_API_URL") {
            self.backends.event_api_url = Some(v);
        }
        if let Ok(v) = std::env::var("DUMPGATE_POLICY_PREFIX") {
            self.backends.policy_prefix = v;
        }
        if let Some(v) = env_nonempty("DUMPGATE_POLICY_URL") {
            self.backends.policy_url = Some(v);
        }
        if let Some(v) = env_nonempty("DUMPGATE_STEP_UP_URL") {
            self.backends.step_up_url = Some(v);
        }
        if let Some(v) = env_parsed("DUMPGATE_TIMEOUT") {
            self.backends.timeout_secs = v;
        }
        if let Some(v) = env_parsed("DUMPGATE_READ_AHEAD_THREADS") {
            self.read_ahead.threads = v;
        }
        if let Some(v) = env_parsed("DUMPGATE_READ_AHEAD_CHUNK_SIZE") {
            self.read_ahead.chunk_size = v;
        }
        if let Some(v) = env_parsed("DUMPGATE_READ_AHEAD_MAX_AGE") {
            self.read_ahead.max_age_secs = v;
        }
        self
    }

    /// Storage root, made absolute.
    pub fn storage_path(&self) -> AccessResult<PathBuf> {
        let path = self
            .storage_path
            .as_ref()
            .ok_or_else(|| AccessError::config("storage_path must be set"))?;
        std::path::absolute(path)
            .map_err(|e| AccessError::config(format!("invalid storage_path: {}", e)))
    }

    /// Check the parts every command needs: storage root and read-ahead.
    pub fn validate(&self) -> AccessResult<()> {
        let storage = self.storage_path()?;
        if !storage.is_dir() {
            return Err(AccessError::config(format!(
                "storage_path must be a directory: {}",
                storage.display()
            )));
        }
        self.read_ahead.validate()
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
