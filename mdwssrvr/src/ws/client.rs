//! # WebSocket Client Connector
//!
//! Thin wrapper around [`Endpoint`] that dials a `ws://` URL and speaks the
//! client half of the upgrade. Driven by the same pump discipline as the
//! server side; used by tooling and the end-to-end tests.

use anyhow::{bail, Context, Result};
use std::net::TcpStream;
use url::Url;

use super::endpoint::{Endpoint, State, WsEvent};

pub struct WsClient {
    endpoint: Endpoint,
}

impl WsClient {
    /// Connects to a `ws://host:port/path` URL and queues the upgrade
    /// request. The handshake completes during subsequent [`WsClient::pump`]
    /// calls, signalled by [`WsEvent::Open`].
    pub fn connect(url: &str) -> Result<WsClient> {
        let parsed = Url::parse(url).with_context(|| format!("invalid WebSocket URL: {url}"))?;
        if parsed.scheme() != "ws" {
            bail!("unsupported URL scheme '{}' (only ws:// is supported)", parsed.scheme());
        }
        let host = parsed
            .host_str()
            .context("WebSocket URL is missing a host")?;
        let port = parsed.port().unwrap_or(80);
        let path = if parsed.path().is_empty() {
            "/"
        } else {
            parsed.path()
        };

        let stream = TcpStream::connect((host, port))
            .with_context(|| format!("failed to connect to {host}:{port}"))?;
        let endpoint = Endpoint::connect(stream, &format!("{host}:{port}"), path)?;
        Ok(WsClient { endpoint })
    }

    /// Advances I/O one round. Returns `false` on a fatal connection error.
    pub fn pump(&mut self) -> bool {
        self.endpoint.pump()
    }

    pub fn next_event(&mut self) -> Option<WsEvent> {
        self.endpoint.next_event()
    }

    pub fn send_text(&mut self, text: &str) {
        self.endpoint.send_text(text);
    }

    pub fn send_binary(&mut self, payload: Vec<u8>) {
        self.endpoint.send_binary(payload);
    }

    pub fn close(&mut self, code: u16, reason: &str) {
        self.endpoint.close(code, reason);
    }

    pub fn is_open(&self) -> bool {
        self.endpoint.state() == State::Open
    }

    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    pub fn tx_bytes(&self) -> u64 {
        self.endpoint.tx_bytes()
    }

    pub fn rx_bytes(&self) -> u64 {
        self.endpoint.rx_bytes()
    }
}
