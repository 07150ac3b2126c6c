//! # Message Dispatcher
//!
//! Message parsing, routing and the error envelope. Every inbound text
//! frame goes through [`handle_message`], which parses the JSON by hand to
//! produce the fine-grained failure taxonomy, resolves the tool, checks
//! enablement, and invokes the handler with a per-call
//! [`ToolContext`]. Every failure of any layer is serialized to the same
//! `{"type":"error","message":...}` envelope; a call failure never
//! disconnects the client.

use mdws_common::ServerMessage;
use serde_json::Value;
use thiserror::Error;

use crate::registry::{ToolArgs, ToolContext, ToolError, ToolRegistry};

/// Per-call failures, in the order they are detected. The rendered message
/// is the wire-visible `message` field.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Payload must be a JSON object.")]
    NotAnObject,
    #[error("'type' field missing.")]
    MissingType,
    #[error("Unknown type: {0}")]
    UnknownType(String),
    #[error("'tool' field missing.")]
    MissingTool,
    #[error("Tool '{0}' not found.")]
    UnknownTool(String),
    #[error("Tool '{0}' not enabled.")]
    ToolDisabled(String),
    #[error("'args' must be a JSON object.")]
    InvalidArgs,
    #[error("{0}")]
    Tool(#[from] ToolError),
}

/// Processes one inbound text frame and produces the response envelope.
pub fn handle_message(
    text: &str,
    registry: &ToolRegistry,
    ctx: &ToolContext<'_>,
) -> ServerMessage {
    match process(text, registry, ctx) {
        Ok(result) => ServerMessage::ToolResponse { result },
        Err(e) => {
            ctx.log(&format!("Request failed: {e}"));
            ServerMessage::error(e.to_string())
        }
    }
}

fn process(
    text: &str,
    registry: &ToolRegistry,
    ctx: &ToolContext<'_>,
) -> Result<Value, DispatchError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DispatchError::InvalidJson(e.to_string()))?;
    let message = value.as_object().ok_or(DispatchError::NotAnObject)?;

    let msg_type = message
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    match msg_type {
        "tool_call" => {}
        "" => return Err(DispatchError::MissingType),
        other => return Err(DispatchError::UnknownType(other.to_string())),
    }

    let tool = message
        .get("tool")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if tool.is_empty() {
        return Err(DispatchError::MissingTool);
    }

    let definition = registry
        .get(tool)
        .ok_or_else(|| DispatchError::UnknownTool(tool.to_string()))?;
    if !registry.is_enabled(tool) {
        return Err(DispatchError::ToolDisabled(tool.to_string()));
    }

    // A missing args field is equivalent to an empty object; any other
    // non-object shape is rejected.
    let empty = ToolArgs::new();
    let args: &ToolArgs = match message.get("args") {
        None => &empty,
        Some(Value::Object(map)) => map,
        Some(_) => return Err(DispatchError::InvalidArgs),
    };

    ctx.log(&format!("Executing tool '{tool}'"));
    let result = (definition.handler)(ctx, args)?;
    Ok(result)
}
