//! # Server Facade
//!
//! [`McpServer`] exclusively owns the tool registry, the permission flags,
//! the sandbox set and the listener, and wires them together: on accept the
//! manifest is the first frame a client sees, text frames go through the
//! dispatcher, binary frames are logged and ignored, close and error events
//! remove the client. Everything advances inside [`McpServer::pump_events`],
//! driven by the owner loop.
//!
//! Network-shape mutators (port, bind address, path prefix, TLS) refuse
//! with a warning while the server is listening; tool enable/disable and
//! permission changes apply live and take effect on the next call.

use anyhow::{bail, Context, Result};
use mdws_common::ServerMessage;
use mdws_policy::{normalize_path, Config, Permissions, SandboxSet, SandboxViolation};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dispatch;
use crate::registry::{ToolContext, ToolDefinition, ToolRegistry};
use crate::ws::{ClientId, Listener, WsEvent};

pub type LogCallback = Box<dyn Fn(&str) + Send>;

pub struct McpServer {
    port: u16,
    path_prefix: String,
    bind_all: bool,
    use_tls: bool,
    tls_cert_path: String,
    tls_key_path: String,
    registry: ToolRegistry,
    permissions: Permissions,
    sandbox: SandboxSet,
    listener: Option<Listener>,
    log_callback: Option<LogCallback>,
}

impl McpServer {
    pub fn new(port: u16, path_prefix: &str) -> McpServer {
        McpServer {
            port,
            path_prefix: normalize_prefix(path_prefix),
            bind_all: false,
            use_tls: false,
            tls_cert_path: String::new(),
            tls_key_path: String::new(),
            registry: ToolRegistry::new(),
            permissions: Permissions::default(),
            sandbox: SandboxSet::new(),
            listener: None,
            log_callback: None,
        }
    }

    /// Routes a message into the interaction log: the installed callback if
    /// any, the tracing subscriber otherwise.
    pub fn log(&self, message: &str) {
        match &self.log_callback {
            Some(callback) => callback(message),
            None => info!("{message}"),
        }
    }

    pub fn set_log_callback(&mut self, callback: impl Fn(&str) + Send + 'static) {
        self.log_callback = Some(Box::new(callback));
    }

    pub fn set_port(&mut self, port: u16) {
        if self.is_listening() {
            self.log("Error: cannot change the port while the server is running.");
            return;
        }
        if port == 0 {
            self.log("Error: invalid port 0.");
            return;
        }
        self.port = port;
        self.log(&format!("Server port set to {port}"));
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_path_prefix(&mut self, path: &str) {
        if self.is_listening() {
            self.log("Error: cannot change the path prefix while the server is running.");
            return;
        }
        self.path_prefix = normalize_prefix(path);
        self.log(&format!("WebSocket path prefix set to {}", self.path_prefix));
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    pub fn configure_bind(&mut self, bind_all: bool) {
        if self.is_listening() {
            self.log("Error: cannot change the bind address while the server is running.");
            return;
        }
        self.bind_all = bind_all;
        self.log(&format!("Bind to all interfaces: {bind_all}"));
    }

    pub fn set_tls(&mut self, use_tls: bool, cert_path: &str, key_path: &str) {
        if self.is_listening() {
            self.log("Error: cannot change TLS settings while the server is running.");
            return;
        }
        self.use_tls = use_tls;
        self.tls_cert_path = cert_path.to_string();
        self.tls_key_path = key_path.to_string();
        self.log(&format!("TLS enabled: {use_tls}"));
    }

    pub fn add_tool(&mut self, name: &str, definition: ToolDefinition) {
        if self.is_listening() {
            self.log("Error: cannot register tools while the server is running.");
            return;
        }
        self.registry.register(name, definition);
        self.log(&format!("Tool added: {name}"));
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }

    /// Applies live; takes effect on the next `tool_call`.
    pub fn enable_tool(&mut self, name: &str) {
        if self.registry.enable(name) {
            self.log(&format!("Tool enabled: {name}"));
        } else {
            self.log(&format!("Warning: attempt to enable non-existent tool: {name}"));
        }
    }

    /// Applies live; takes effect on the next `tool_call`.
    pub fn disable_tool(&mut self, name: &str) {
        self.registry.disable(name);
        self.log(&format!("Tool disabled: {name}"));
    }

    pub fn is_tool_enabled(&self, name: &str) -> bool {
        self.registry.is_enabled(name)
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// Mutable view of the capability flags. Changes apply live.
    pub fn permissions_mut(&mut self) -> &mut Permissions {
        &mut self.permissions
    }

    pub fn sandbox_roots(&self) -> &[PathBuf] {
        self.sandbox.roots()
    }

    pub fn add_sandbox_root(&mut self, root: impl AsRef<Path>) {
        if self.is_listening() {
            self.log("Error: cannot change sandbox roots while the server is running.");
            return;
        }
        if self.sandbox.add(root.as_ref()) {
            self.log(&format!(
                "Sandbox root added: {}",
                normalize_path(root.as_ref()).display()
            ));
        }
    }

    pub fn remove_sandbox_root(&mut self, root: impl AsRef<Path>) {
        if self.is_listening() {
            self.log("Error: cannot change sandbox roots while the server is running.");
            return;
        }
        if self.sandbox.remove(root.as_ref()) {
            self.log(&format!(
                "Sandbox root removed: {}",
                normalize_path(root.as_ref()).display()
            ));
        }
    }

    /// The containment predicate over the configured roots.
    pub fn enforce_sandbox(&self, path: impl AsRef<Path>) -> Result<(), SandboxViolation> {
        self.sandbox.enforce(path)
    }

    /// Hydrates the facade from a loaded configuration. Tools must already
    /// be registered for the enabled set to stick.
    pub fn apply_config(&mut self, config: &Config) {
        if self.is_listening() {
            self.log("Error: cannot apply configuration while the server is running.");
            return;
        }
        self.port = config.server_port;
        self.bind_all = config.bind_all_interfaces;
        self.path_prefix = normalize_prefix(&config.ws_path_prefix);
        self.use_tls = config.use_tls;
        self.tls_cert_path = config.tls_cert_path.clone();
        self.tls_key_path = config.tls_key_path.clone();
        self.permissions = config.permissions.clone();
        self.sandbox.clear();
        for root in &config.sandbox_roots {
            self.add_sandbox_root(root);
        }
        for tool in &config.enabled_tools {
            self.enable_tool(tool);
        }
    }

    /// Binds the listening socket. Idempotent when already running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_listening() {
            self.log("Server already running.");
            return Ok(());
        }
        if self.use_tls {
            bail!(
                "TLS is enabled in the configuration but this build ships no TLS transport; \
                 disable use_tls or terminate TLS in front of the server"
            );
        }
        let listener = Listener::bind(self.port, self.bind_all, &self.path_prefix)
            .with_context(|| format!("failed to bind port {}", self.port))?;
        let bound = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| format!("port {}", self.port));
        self.listener = Some(listener);
        self.log(&format!(
            "Server listening on {bound}{}",
            self.path_prefix
        ));
        Ok(())
    }

    /// Sends CLOSE(1001, "shutdown") to every live client and closes the
    /// listening socket.
    pub fn stop(&mut self) {
        match self.listener.take() {
            Some(mut listener) => {
                listener.stop();
                self.log("Server stopped.");
            }
            None => self.log("Server is not running."),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// The bound address while listening. Differs from the configured port
    /// when an ephemeral port was requested.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn client_count(&self) -> usize {
        self.listener.as_ref().map_or(0, Listener::client_count)
    }

    /// Advances accept, per-client I/O and dispatch one round. Nonblocking;
    /// must be called periodically from the owner loop.
    pub fn pump_events(&mut self) {
        let listener = match self.listener.as_mut() {
            Some(listener) => listener,
            None => return,
        };
        let mut events = Vec::new();
        listener.pump(&mut events);
        if events.is_empty() {
            return;
        }

        let callback = &self.log_callback;
        let log = move |message: &str| match callback {
            Some(cb) => cb(message),
            None => info!("{message}"),
        };

        for (id, event) in events {
            match event {
                WsEvent::Open => {
                    log(&format!("Client connected: {id}"));
                    let manifest = ServerMessage::Manifest {
                        tools: self.registry.manifest(),
                    };
                    send_message(listener, id, &manifest, &log);
                    log(&format!("Manifest sent to {id}"));
                }
                WsEvent::Text(text) => {
                    log(&format!("Message from {id}: {text}"));
                    let ctx = ToolContext::new(&self.permissions, &self.sandbox, &log);
                    let response = dispatch::handle_message(&text, &self.registry, &ctx);
                    send_message(listener, id, &response, &log);
                }
                WsEvent::Binary(data) => {
                    log(&format!(
                        "Binary message from {id} ignored ({} bytes).",
                        data.len()
                    ));
                }
                WsEvent::Close { code, reason } => {
                    log(&format!(
                        "Client {id} closed connection. Code: {code}, Reason: '{reason}'"
                    ));
                }
                WsEvent::Error(kind) => {
                    log(&format!("Client {id} error: {kind}"));
                }
            }
        }
    }
}

fn send_message(
    listener: &mut Listener,
    id: ClientId,
    message: &ServerMessage,
    log: &dyn Fn(&str),
) {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!("failed to serialize outbound message: {e}");
            return;
        }
    };
    match listener.endpoint_mut(id) {
        Some(endpoint) => endpoint.send_text(&json),
        None => {
            debug!("dropping message for {id}; endpoint already removed");
            log(&format!("Warning: response dropped, {id} is gone."));
        }
    }
}

/// Leading `/` enforced, trailing `/` stripped unless the prefix is `/`.
fn normalize_prefix(path: &str) -> String {
    let mut prefix = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while prefix.len() > 1 && prefix.ends_with('/') {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn noop_tool() -> ToolDefinition {
        ToolDefinition {
            description: "does nothing".to_string(),
            parameters: json!({}),
            handler: Box::new(|_, _| Ok(serde_json::Value::Null)),
        }
    }

    #[test]
    fn prefix_is_normalized_on_construction() {
        assert_eq!(McpServer::new(5000, "mcp").path_prefix(), "/mcp");
        assert_eq!(McpServer::new(5000, "/mcp/").path_prefix(), "/mcp");
        assert_eq!(McpServer::new(5000, "/").path_prefix(), "/");
    }

    #[test]
    fn network_mutators_refuse_while_listening() {
        let mut server = McpServer::new(0, "/mcp");
        server.add_sandbox_root("/srv/ok");
        server.start().unwrap();
        let bound_port = server.local_addr().unwrap().port();

        server.set_port(9999);
        server.set_path_prefix("/other");
        server.configure_bind(true);
        server.set_tls(true, "cert", "key");
        server.add_tool("late", noop_tool());
        server.add_sandbox_root("/srv/late");
        server.remove_sandbox_root("/srv/ok");

        assert_eq!(server.local_addr().unwrap().port(), bound_port);
        assert_eq!(server.path_prefix(), "/mcp");
        assert!(server.tool_names().is_empty());
        assert_eq!(server.sandbox_roots().len(), 1);
        server.stop();

        // after stop the same mutators work again
        server.set_port(9999);
        assert_eq!(server.port(), 9999);
        server.remove_sandbox_root("/srv/ok");
        assert!(server.sandbox_roots().is_empty());
    }

    #[test]
    fn tool_and_permission_toggles_apply_while_listening() {
        let mut server = McpServer::new(0, "/mcp");
        server.add_tool("noop", noop_tool());
        server.start().unwrap();

        server.enable_tool("noop");
        assert!(server.is_tool_enabled("noop"));
        server.disable_tool("noop");
        assert!(!server.is_tool_enabled("noop"));

        server.permissions_mut().read_files = true;
        assert!(server.permissions().read_files);
        server.stop();
    }

    #[test]
    fn start_refuses_tls() {
        let mut server = McpServer::new(0, "/mcp");
        server.set_tls(true, "/no/cert.pem", "/no/key.pem");
        assert!(server.start().is_err());
        assert!(!server.is_listening());
    }

    #[test]
    fn start_is_idempotent_and_stop_clears() {
        let mut server = McpServer::new(0, "/mcp");
        server.start().unwrap();
        assert!(server.is_listening());
        server.start().unwrap();
        server.stop();
        assert!(!server.is_listening());
        assert!(server.local_addr().is_none());
        server.stop();
    }

    #[test]
    fn apply_config_hydrates_everything() {
        let mut server = McpServer::new(1, "/x");
        server.add_tool("noop", noop_tool());

        let config = Config {
            enabled_tools: vec!["noop".into(), "ghost".into()],
            permissions: mdws_policy::Permissions {
                exec: true,
                ..Default::default()
            },
            sandbox_roots: vec!["/srv/ok".into()],
            server_port: 7000,
            bind_all_interfaces: true,
            ws_path_prefix: "/tools".into(),
            ..Default::default()
        };
        server.apply_config(&config);

        assert_eq!(server.port(), 7000);
        assert_eq!(server.path_prefix(), "/tools");
        assert!(server.is_tool_enabled("noop"));
        assert!(!server.is_tool_enabled("ghost"));
        assert!(server.permissions().exec);
        assert_eq!(server.sandbox_roots().len(), 1);
        assert!(server.enforce_sandbox("/srv/ok/file").is_ok());
        assert!(server.enforce_sandbox("/elsewhere").is_err());
    }

    #[test]
    fn log_callback_receives_messages() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let mut server = McpServer::new(5000, "/mcp");
        server.set_log_callback(move |m| sink.lock().unwrap().push(m.to_string()));
        server.add_tool("noop", noop_tool());
        let logged = lines.lock().unwrap();
        assert_eq!(logged.as_slice(), ["Tool added: noop"]);
    }
}
