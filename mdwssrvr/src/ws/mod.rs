//! WebSocket transport layer: RFC 6455 framing, per-connection endpoints,
//! the nonblocking listener and a client-side connector.

pub mod client;
pub mod endpoint;
pub mod frame;
pub mod listener;

pub use client::WsClient;
pub use endpoint::{Endpoint, Role, State, WsErrorKind, WsEvent};
pub use frame::{Frame, Opcode, ProtocolError};
pub use listener::{ClientId, Listener};
