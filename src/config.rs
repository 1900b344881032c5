//! Configuration loading and persistence.
//!
//! Reads `config.json` from the mirrorbridge config directory, falls back to
//! defaults when it is absent, then applies `MIRRORBRIDGE_*` environment
//! overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;

use crate::bridge::BridgeConfig;
use crate::constants::{
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SOCKET_NAME, HEARTBEAT_INTERVAL, PEER_DEMOTE_AFTER,
    PEER_STALE_AFTER, PRESENCE_SWEEP_INTERVAL,
};

/// File name inside [`Config::config_dir`].
pub const CONFIG_FILE: &str = "config.json";

/// Configuration for the mirrorbridge CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Unix socket the hub listens on and clients dial.
    pub socket_path: PathBuf,
    /// WebSocket listen address for the hub (e.g. `127.0.0.1:8765`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_addr: Option<String>,
    /// Milliseconds between outgoing heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Milliseconds between presence sweeps.
    pub sweep_interval_ms: u64,
    /// Milliseconds of silence before a peer is marked disconnected.
    pub stale_after_ms: u64,
    /// Milliseconds a disconnected peer waits before it is marked waiting.
    pub demote_after_ms: u64,
    /// Default request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let socket_dir = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            socket_path: socket_dir.join(DEFAULT_SOCKET_NAME),
            ws_addr: None,
            heartbeat_interval_ms: millis(HEARTBEAT_INTERVAL),
            sweep_interval_ms: millis(PRESENCE_SWEEP_INTERVAL),
            stale_after_ms: millis(PEER_STALE_AFTER),
            demote_after_ms: millis(PEER_DEMOTE_AFTER),
            request_timeout_ms: millis(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `MIRRORBRIDGE_CONFIG_DIR` overrides the platform config directory
    /// (`~/.config/mirrorbridge` on Linux).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("MIRRORBRIDGE_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("mirrorbridge"))
    }

    /// Loads configuration from the config directory, with environment
    /// variable overrides. A missing or unreadable file yields defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring config file: {e:#}");
                Self::default()
            })
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reads one config file without applying overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(socket) = var("MIRRORBRIDGE_SOCKET") {
            self.socket_path = PathBuf::from(socket);
        }

        if let Some(addr) = var("MIRRORBRIDGE_WS_ADDR") {
            self.ws_addr = Some(addr);
        }

        if let Some(timeout) = var("MIRRORBRIDGE_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                self.request_timeout_ms = ms;
            }
        }

        if let Some(heartbeat) = var("MIRRORBRIDGE_HEARTBEAT_MS") {
            if let Ok(ms) = heartbeat.parse::<u64>() {
                self.heartbeat_interval_ms = ms;
            }
        }
    }

    /// Persists the current configuration to `dir`, creating it if needed.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(config_path)
    }

    /// Bridge timings derived from this configuration.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            stale_after: Duration::from_millis(self.stale_after_ms),
            demote_after: Duration::from_millis(self.demote_after_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.socket_path.ends_with("mirrorbridge.sock"));
        assert_eq!(config.ws_addr, None);
        assert_eq!(config.bridge_config(), BridgeConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"request_timeout_ms": 250, "ws_addr": "0.0.0.0:9000"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.ws_addr.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(config.heartbeat_interval_ms, 1000);
        assert_eq!(
            config.bridge_config().request_timeout,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MIRRORBRIDGE_SOCKET", "/tmp/other.sock"),
            ("MIRRORBRIDGE_WS_ADDR", "127.0.0.1:9999"),
            ("MIRRORBRIDGE_REQUEST_TIMEOUT_MS", "750"),
            ("MIRRORBRIDGE_HEARTBEAT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.socket_path, PathBuf::from("/tmp/other.sock"));
        assert_eq!(config.ws_addr.as_deref(), Some("127.0.0.1:9999"));
        assert_eq!(config.request_timeout_ms, 750);
        // Unparseable values leave the default in place.
        assert_eq!(config.heartbeat_interval_ms, 1000);
    }

    #[test]
    fn test_save_round_trip_with_restrictive_permissions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.sweep_interval_ms = 200;

        let path = config.save_to(&tmp.path().join("nested")).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
