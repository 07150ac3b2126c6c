//! # mdwssrvr
//!
//! A local tool-exposure server: named, capability-gated tools published to
//! WebSocket clients. On connect a client receives a manifest of the
//! enabled tools; it invokes them with JSON `tool_call` messages and gets a
//! `tool_response` or `error` envelope back. Every invocation is mediated
//! by two orthogonal gates: the static permission flags and the filesystem
//! sandbox.
//!
//! ## Architecture
//!
//! - [`ws`]: RFC 6455 framing, per-connection endpoints, the nonblocking
//!   listener and a client-side connector;
//! - [`registry`]: named handlers, the enabled set and the manifest;
//! - [`dispatch`]: message parsing, routing and the error envelope;
//! - [`server`]: the facade that owns everything and coordinates sessions;
//! - [`logsink`]: the rotating interaction log;
//! - [`tools`]: the standard tool set bound to filesystem primitives.
//!
//! The whole pipeline is single-threaded and cooperative: the owner loop
//! calls [`McpServer::pump_events`] periodically, and all I/O, parsing and
//! handler invocation happens on that one thread, in per-connection
//! arrival order.

pub mod dispatch;
pub mod logsink;
pub mod registry;
pub mod server;
pub mod tools;
pub mod ws;

pub use logsink::LogSink;
pub use registry::{ToolArgs, ToolContext, ToolDefinition, ToolError, ToolRegistry};
pub use server::McpServer;
