//! # mdws_common
//!
//! Wire-level message types for the mdws tool protocol. Every message is a
//! single JSON object carried in one WebSocket text frame, discriminated by
//! its `"type"` field. This crate provides the foundational data structures
//! used by both the server and client components.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One enabled tool as advertised in the connect-time manifest.
///
/// `parameters` is an opaque JSON Schema blob forwarded to clients as-is;
/// the server never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub description: String,
    pub parameters: Value,
}

/// Server-to-client messages, tagged by the `"type"` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, immediately after the handshake completes. Guaranteed to
    /// be the first frame a client sees.
    Manifest {
        tools: BTreeMap<String, ManifestEntry>,
    },
    /// Successful result of a `tool_call`.
    ToolResponse { result: Value },
    /// Any per-call failure. The connection stays open.
    Error { message: String },
}

/// Client-to-server messages, tagged by the `"type"` field.
///
/// The server parses incoming text by hand to produce the fine-grained
/// error taxonomy; this enum is the constructor side, used by clients
/// and tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ToolCall {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
}

impl ServerMessage {
    /// Convenience constructor for the error envelope.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manifest_serializes_with_type_tag() {
        let mut tools = BTreeMap::new();
        tools.insert(
            "echo".to_string(),
            ManifestEntry {
                description: "returns args".to_string(),
                parameters: json!({}),
            },
        );
        let msg = ServerMessage::Manifest { tools };
        let v: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "manifest");
        assert_eq!(v["tools"]["echo"]["description"], "returns args");
    }

    #[test]
    fn tool_response_round_trips() {
        let msg = ServerMessage::ToolResponse {
            result: json!({"x": 1}),
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn tool_call_without_args_omits_field() {
        let msg = ClientMessage::ToolCall {
            tool: "echo".to_string(),
            args: None,
        };
        let text = serde_json::to_string(&msg).unwrap();
        assert!(!text.contains("args"));
        assert_eq!(text, r#"{"type":"tool_call","tool":"echo"}"#);
    }

    #[test]
    fn error_envelope_shape() {
        let v: Value = serde_json::to_value(ServerMessage::error("boom")).unwrap();
        assert_eq!(v, json!({"type": "error", "message": "boom"}));
    }
}
