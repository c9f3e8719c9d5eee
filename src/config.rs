//! Initialization configuration
//!
//! Loaded from a TOML or JSON file (or built in code), optionally
//! overridden from the environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FetchSyncError, Result};

/// Deadline for the channel handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 2000;

pub const ENV_WORKER_URL: &str = "FETCH_SYNC_WORKER_URL";
pub const ENV_HANDSHAKE_TIMEOUT_MS: &str = "FETCH_SYNC_HANDSHAKE_TIMEOUT_MS";

/// Options forwarded to the host when registering the background context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    /// Scope the background context controls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Configuration accepted by `FetchSync::initialize`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    /// Location of the background context's code (or endpoint)
    pub worker_url: String,

    pub worker_options: WorkerOptions,

    /// Ask the host to update the background context after registering
    pub force_update: bool,

    pub handshake_timeout_ms: u64,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            worker_url: String::new(),
            worker_options: WorkerOptions::default(),
            force_update: false,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }
}

impl InitConfig {
    pub fn new(worker_url: impl Into<String>) -> Self {
        Self {
            worker_url: worker_url.into(),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.worker_options.scope = Some(scope.into());
        self
    }

    pub fn with_force_update(mut self, force_update: bool) -> Self {
        self.force_update = force_update;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_url.trim().is_empty() {
            return Err(FetchSyncError::InvalidConfig(
                "expecting `worker_url` in configuration".into(),
            ));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(FetchSyncError::InvalidConfig(
                "`handshake_timeout_ms` must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Load from `.toml` or `.json`, chosen by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FetchSyncError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str::<InitConfig>(&content)
                .map_err(|e| FetchSyncError::InvalidConfig(e.to_string()))?,
            Some("toml") => toml::from_str::<InitConfig>(&content)
                .map_err(|e| FetchSyncError::InvalidConfig(e.to_string()))?,
            other => {
                return Err(FetchSyncError::InvalidConfig(format!(
                    "unsupported config format: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };

        tracing::debug!(path = %path.display(), worker_url = %config.worker_url, "loaded config");
        Ok(config)
    }

    /// Apply `FETCH_SYNC_*` overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_WORKER_URL) {
            self.worker_url = url;
        }
        if let Some(raw) = lookup(ENV_HANDSHAKE_TIMEOUT_MS) {
            self.handshake_timeout_ms = raw.trim().parse().map_err(|_| {
                FetchSyncError::InvalidConfig(format!("{ENV_HANDSHAKE_TIMEOUT_MS}={raw} is not a number"))
            })?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = InitConfig::new("wss://worker.local/sync");
        assert_eq!(config.handshake_timeout(), Duration::from_millis(2000));
        assert!(!config.force_update);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_worker_url_is_invalid() {
        assert!(matches!(
            InitConfig::default().validate(),
            Err(FetchSyncError::InvalidConfig(_))
        ));

        let mut zero = InitConfig::new("wss://worker.local");
        zero.handshake_timeout_ms = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fetch-sync.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "worker_url = \"ws://127.0.0.1:7710\"\nforce_update = true\n\n[worker_options]\nscope = \"/app\""
        )
        .unwrap();

        let config = InitConfig::from_file(&path).unwrap();
        assert_eq!(config.worker_url, "ws://127.0.0.1:7710");
        assert!(config.force_update);
        assert_eq!(config.worker_options.scope.as_deref(), Some("/app"));
        assert_eq!(config.handshake_timeout_ms, DEFAULT_HANDSHAKE_TIMEOUT_MS);
    }

    #[test]
    fn test_load_json_and_reject_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("config.json");
        std::fs::write(&json, r#"{"worker_url": "/sw.js", "handshake_timeout_ms": 500}"#).unwrap();
        let config = InitConfig::from_file(&json).unwrap();
        assert_eq!(config.handshake_timeout_ms, 500);

        let yaml = dir.path().join("config.yaml");
        std::fs::write(&yaml, "worker_url: /sw.js").unwrap();
        assert!(InitConfig::from_file(&yaml).is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_WORKER_URL, "ws://override:1"),
            (ENV_HANDSHAKE_TIMEOUT_MS, "750"),
        ]
        .into_iter()
        .collect();

        let config = InitConfig::new("ws://from-file:1")
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.worker_url, "ws://override:1");
        assert_eq!(config.handshake_timeout_ms, 750);

        let bad = InitConfig::default()
            .apply_overrides(|key| (key == ENV_HANDSHAKE_TIMEOUT_MS).then(|| "soon".to_string()));
        assert!(bad.is_err());
    }
}
