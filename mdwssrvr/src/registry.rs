//! # Tool Registry
//!
//! Named handlers, the enabled subset and the manifest. The registry owns
//! every registered [`ToolDefinition`] plus a disjoint enabled set; only
//! enabled tools appear in the manifest and are callable.
//! Enabling a name that was never registered is a warning, not an error,
//! so a persisted enabled-tools list can safely reference tools a given
//! build does not ship.

use mdws_common::ManifestEntry;
use mdws_policy::{Permissions, SandboxSet, SandboxViolation};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// JSON object passed to handlers as the call arguments.
pub type ToolArgs = serde_json::Map<String, Value>;

/// A tool handler: JSON object in, any JSON value out, or a typed failure
/// whose message is forwarded to the client verbatim.
pub type ToolHandler = Box<dyn Fn(&ToolContext<'_>, &ToolArgs) -> Result<Value, ToolError> + Send>;

/// Failures a tool handler may raise. The rendered message is what the
/// client sees in the error envelope.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Argument error: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Sandbox(#[from] SandboxViolation),
    #[error("{0}")]
    Failed(String),
}

/// Narrow, per-call view handed to handlers: the capability flags, the
/// sandbox predicate and the interaction log. Handlers never see the
/// server facade.
pub struct ToolContext<'a> {
    pub permissions: &'a Permissions,
    pub sandbox: &'a SandboxSet,
    log: &'a dyn Fn(&str),
}

impl<'a> ToolContext<'a> {
    pub fn new(
        permissions: &'a Permissions,
        sandbox: &'a SandboxSet,
        log: &'a dyn Fn(&str),
    ) -> Self {
        ToolContext {
            permissions,
            sandbox,
            log,
        }
    }

    pub fn log(&self, message: &str) {
        (self.log)(message);
    }

    /// Applies the sandbox predicate to `path`, converting a violation into
    /// the handler error type.
    pub fn enforce_sandbox(&self, path: impl AsRef<Path>) -> Result<(), ToolError> {
        self.sandbox.enforce(path)?;
        Ok(())
    }
}

/// One registered tool.
pub struct ToolDefinition {
    pub description: String,
    /// Opaque JSON Schema blob forwarded to clients in the manifest.
    pub parameters: Value,
    pub handler: ToolHandler,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDefinition>,
    enabled: BTreeSet<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a tool under `name`.
    pub fn register(&mut self, name: &str, definition: ToolDefinition) {
        debug!("tool registered: {name}");
        self.tools.insert(name.to_string(), definition);
    }

    /// Adds `name` to the enabled set. A name with no registered tool is a
    /// no-op warning; the `enabled ⊆ registered` invariant always holds.
    pub fn enable(&mut self, name: &str) -> bool {
        if !self.tools.contains_key(name) {
            warn!("attempt to enable unknown tool: {name}");
            return false;
        }
        self.enabled.insert(name.to_string());
        true
    }

    /// Removes `name` from the enabled set unconditionally.
    pub fn disable(&mut self, name: &str) {
        self.enabled.remove(name);
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// The manifest payload: every enabled tool's description and parameter
    /// schema, keyed by name.
    pub fn manifest(&self) -> BTreeMap<String, ManifestEntry> {
        let mut tools = BTreeMap::new();
        for name in &self.enabled {
            match self.tools.get(name) {
                Some(def) => {
                    tools.insert(
                        name.clone(),
                        ManifestEntry {
                            description: def.description.clone(),
                            parameters: def.parameters.clone(),
                        },
                    );
                }
                None => warn!("enabled tool '{name}' missing from registry; skipped"),
            }
        }
        tools
    }
}
