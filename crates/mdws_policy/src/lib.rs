//! # mdws_policy
//!
//! The two gates every tool invocation passes through, plus the durable
//! configuration that persists them across runs:
//!
//! - [`Permissions`]: a fixed set of boolean capability flags consulted by
//!   tool handlers (the core only exposes them by reference);
//! - [`SandboxSet`]: normalized path roots with a lexical containment
//!   predicate;
//! - [`Config`]: the JSON configuration store with tolerant loading and
//!   atomic save.

use serde::{Deserialize, Serialize};

pub mod config;
pub mod sandbox;

pub use config::{Config, ConfigError, LoadStatus};
pub use sandbox::{normalize_path, SandboxSet, SandboxViolation};

/// Boolean capability flags gating what kinds of effects tools may have.
///
/// All flags default to `false`. The serialized key names match the
/// persisted configuration format.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Permissions {
    #[serde(rename = "allowReadFiles")]
    pub read_files: bool,
    #[serde(rename = "allowWriteFiles")]
    pub write_files: bool,
    #[serde(rename = "allowDeleteFiles")]
    pub delete_files: bool,
    #[serde(rename = "allowRenameFiles")]
    pub rename_files: bool,
    #[serde(rename = "allowCreateDirs")]
    pub create_dirs: bool,
    #[serde(rename = "allowSearchDirs")]
    pub search_dirs: bool,
    #[serde(rename = "allowExec")]
    pub exec: bool,
    #[serde(rename = "allowNetworkAccess")]
    pub network_access: bool,
    #[serde(rename = "allowExternalStorage")]
    pub external_storage: bool,
    #[serde(rename = "allowChangeAttributes")]
    pub change_attributes: bool,
    #[serde(rename = "allowIPC")]
    pub ipc: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_default_to_all_false() {
        let p = Permissions::default();
        assert!(!p.read_files);
        assert!(!p.write_files);
        assert!(!p.delete_files);
        assert!(!p.rename_files);
        assert!(!p.create_dirs);
        assert!(!p.search_dirs);
        assert!(!p.exec);
        assert!(!p.network_access);
        assert!(!p.external_storage);
        assert!(!p.change_attributes);
        assert!(!p.ipc);
    }

    #[test]
    fn permissions_serialize_with_allow_prefix() {
        let p = Permissions {
            read_files: true,
            ..Default::default()
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["allowReadFiles"], true);
        assert_eq!(v["allowIPC"], false);
    }

    #[test]
    fn permissions_missing_fields_default() {
        let p: Permissions = serde_json::from_str(r#"{"allowExec": true}"#).unwrap();
        assert!(p.exec);
        assert!(!p.read_files);
    }
}
