//! # Configuration Store
//!
//! Durable JSON configuration. Loading is tolerant by design: a missing
//! file yields defaults and counts as success, a damaged file yields
//! defaults and counts as failure, and a
//! well-formed file with individually broken fields keeps the good fields
//! and defaults the bad ones. The caller always gets a valid, post-validated
//! [`Config`] back.

use crate::Permissions;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_PATH_PREFIX: &str = "/mcp";
pub const DEFAULT_MAX_LOG_SIZE_MB: u32 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to create config directory {dir}: {source}")]
    DirectoryCreation {
        dir: String,
        source: std::io::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of [`Config::load`]. The returned `Config` is valid in every
/// case; the status records whether the file contributed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// File existed and parsed as a JSON object.
    Loaded,
    /// File absent or empty; defaults applied. Not an error.
    Defaulted,
    /// File unreadable or malformed; defaults applied.
    Failed,
}

impl LoadStatus {
    pub fn is_ok(self) -> bool {
        !matches!(self, LoadStatus::Failed)
    }
}

/// Persisted server state. Key names match the on-disk JSON format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(rename = "enabledTools")]
    pub enabled_tools: Vec<String>,
    pub permissions: Permissions,
    #[serde(rename = "sandboxRoots")]
    pub sandbox_roots: Vec<String>,
    #[serde(rename = "serverPort")]
    pub server_port: u16,
    #[serde(rename = "bindAllInterfaces")]
    pub bind_all_interfaces: bool,
    #[serde(rename = "maxLogSizeMB")]
    pub max_log_size_mb: u32,
    pub ws_path_prefix: String,
    pub use_tls: bool,
    pub tls_cert_path: String,
    pub tls_key_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled_tools: Vec::new(),
            permissions: Permissions::default(),
            sandbox_roots: Vec::new(),
            server_port: DEFAULT_PORT,
            bind_all_interfaces: false,
            max_log_size_mb: DEFAULT_MAX_LOG_SIZE_MB,
            ws_path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            use_tls: false,
            tls_cert_path: String::new(),
            tls_key_path: String::new(),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, applying the tolerance matrix:
    /// each field is decoded independently and falls back to its default on
    /// a type mismatch. The result is validated before being returned.
    pub fn load(path: &Path) -> (Config, LoadStatus) {
        let (mut config, status) = Self::load_raw(path);
        config.validate();
        (config, status)
    }

    fn load_raw(path: &Path) -> (Config, LoadStatus) {
        if !path.exists() {
            info!(
                "config file not found: {}; applying defaults",
                path.display()
            );
            return (Config::default(), LoadStatus::Defaulted);
        }
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to read config {}: {e}; applying defaults", path.display());
                return (Config::default(), LoadStatus::Failed);
            }
        };
        if content.trim().is_empty() {
            info!("config file is empty: {}; applying defaults", path.display());
            return (Config::default(), LoadStatus::Defaulted);
        }
        let value: Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    "failed to parse config {}: {e}; applying defaults",
                    path.display()
                );
                return (Config::default(), LoadStatus::Failed);
            }
        };
        let root = match value.as_object() {
            Some(o) => o,
            None => {
                warn!(
                    "config root in {} is not a JSON object; applying defaults",
                    path.display()
                );
                return (Config::default(), LoadStatus::Failed);
            }
        };

        let defaults = Config::default();
        let config = Config {
            enabled_tools: field(root, "enabledTools", defaults.enabled_tools),
            permissions: field(root, "permissions", defaults.permissions),
            sandbox_roots: field(root, "sandboxRoots", defaults.sandbox_roots),
            server_port: field(root, "serverPort", defaults.server_port),
            bind_all_interfaces: field(root, "bindAllInterfaces", defaults.bind_all_interfaces),
            max_log_size_mb: field(root, "maxLogSizeMB", defaults.max_log_size_mb),
            ws_path_prefix: field(root, "ws_path_prefix", defaults.ws_path_prefix),
            use_tls: field(root, "use_tls", defaults.use_tls),
            tls_cert_path: field(root, "tls_cert_path", defaults.tls_cert_path),
            tls_key_path: field(root, "tls_key_path", defaults.tls_key_path),
        };
        debug!("config loaded from {}", path.display());
        (config, LoadStatus::Loaded)
    }

    /// Repairs invariant violations in place: the path prefix must start
    /// with `/` and not end with one (unless it *is* `/`), the port and the
    /// log size cap must be nonzero.
    pub fn validate(&mut self) {
        if !self.ws_path_prefix.starts_with('/') {
            warn!(
                "ws_path_prefix '{}' invalid, reset to {}",
                self.ws_path_prefix, DEFAULT_PATH_PREFIX
            );
            self.ws_path_prefix = DEFAULT_PATH_PREFIX.to_string();
        }
        while self.ws_path_prefix.len() > 1 && self.ws_path_prefix.ends_with('/') {
            self.ws_path_prefix.pop();
        }
        if self.server_port == 0 {
            warn!("serverPort 0 invalid, reset to {DEFAULT_PORT}");
            self.server_port = DEFAULT_PORT;
        }
        if self.max_log_size_mb == 0 {
            warn!("maxLogSizeMB 0 invalid, reset to {DEFAULT_MAX_LOG_SIZE_MB}");
            self.max_log_size_mb = DEFAULT_MAX_LOG_SIZE_MB;
        }
    }

    /// Serializes pretty-printed JSON and writes it atomically (temp file in
    /// the same directory, then rename). Creates the parent directory if
    /// needed. On POSIX the file mode is tightened to 0600; a chmod failure
    /// is a warning, not an error.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::DirectoryCreation {
                    dir: parent.display().to_string(),
                    source,
                })?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        let write = |p: &Path, e: std::io::Error| ConfigError::Write {
            path: p.display().to_string(),
            source: e,
        };
        fs::write(&tmp, json + "\n").map_err(|e| write(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| write(path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
                warn!("failed to chmod 0600 on {}: {e}", path.display());
            }
        }

        info!("config saved to {}", path.display());
        Ok(())
    }
}

/// Decodes one field from the root object, falling back to `default` when
/// the key is absent or its value has the wrong shape.
fn field<T: DeserializeOwned>(
    root: &serde_json::Map<String, Value>,
    key: &str,
    default: T,
) -> T {
    match root.get(key) {
        None => default,
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(t) => t,
            Err(e) => {
                warn!("config field '{key}' has invalid type ({e}); using default");
                default
            }
        },
    }
}
