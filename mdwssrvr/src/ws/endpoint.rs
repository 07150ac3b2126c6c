//! # WebSocket Endpoint
//!
//! One `Endpoint` owns its nonblocking socket and its inbound/outbound byte
//! buffers, and advances through `Handshaking → Open → Closing → Closed`.
//! All progress happens inside [`Endpoint::pump`], which must be driven from
//! the owner loop; everything the connection produces surfaces as a queue of
//! [`WsEvent`]s drained with [`Endpoint::next_event`], so handlers never
//! re-enter endpoint state.
//!
//! Client and server endpoints differ only in masking direction and in which
//! half of the HTTP upgrade they speak.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha1::{Digest, Sha1};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use super::frame::{Frame, Opcode};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_HANDSHAKE_BYTES: usize = 8192;
const READ_CHUNK: usize = 4096;

/// Which side of the connection this endpoint is. Client endpoints mask
/// outbound frames and expect unmasked inbound; server endpoints the
/// reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Handshaking,
    Open,
    Closing,
    Closed,
}

/// Failure classes surfaced through [`WsEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsErrorKind {
    Read,
    Write,
    Protocol,
    Handshake,
}

impl std::fmt::Display for WsErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WsErrorKind::Read => "read-error",
            WsErrorKind::Write => "write-error",
            WsErrorKind::Protocol => "protocol-violation",
            WsErrorKind::Handshake => "handshake-failed",
        })
    }
}

/// Tagged connection events, dequeued in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// Handshake completed; the connection is open.
    Open,
    Text(String),
    Binary(Vec<u8>),
    Close { code: u16, reason: String },
    Error(WsErrorKind),
}

#[derive(Error, Debug)]
enum HandshakeError {
    #[error("malformed upgrade request")]
    BadRequest,
    #[error("request path '{0}' does not match the WebSocket endpoint")]
    PathMismatch(String),
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

enum Handshake {
    Server { path_prefix: String },
    Client { expected_accept: String },
}

pub struct Endpoint {
    stream: TcpStream,
    role: Role,
    state: State,
    handshake: Option<Handshake>,
    inbuf: Vec<u8>,
    outbuf: Vec<u8>,
    events: VecDeque<WsEvent>,
    close_sent: bool,
    peer_closed: bool,
    peer_eof: bool,
    last_pong: Option<Instant>,
    tx_bytes: u64,
    rx_bytes: u64,
}

impl Endpoint {
    /// Wraps a freshly accepted socket as a server-side endpoint. The
    /// upgrade request is consumed on subsequent pumps; the path must equal
    /// `path_prefix` or the handshake answers 404 and fails.
    pub fn accept(stream: TcpStream, path_prefix: &str) -> io::Result<Endpoint> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true).ok();
        Ok(Endpoint {
            stream,
            role: Role::Server,
            state: State::Handshaking,
            handshake: Some(Handshake::Server {
                path_prefix: path_prefix.to_string(),
            }),
            inbuf: Vec::new(),
            outbuf: Vec::new(),
            events: VecDeque::new(),
            close_sent: false,
            peer_closed: false,
            peer_eof: false,
            last_pong: None,
            tx_bytes: 0,
            rx_bytes: 0,
        })
    }

    /// Wraps a connected socket as a client-side endpoint and queues the
    /// upgrade request. The 101 response is verified on subsequent pumps.
    pub fn connect(stream: TcpStream, host: &str, path: &str) -> io::Result<Endpoint> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true).ok();
        let nonce: [u8; 16] = rand::random();
        let key = BASE64.encode(nonce);
        let expected_accept = accept_key(&key);
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Key: {key}\r\n\r\n"
        );
        let outbuf = request.into_bytes();
        Ok(Endpoint {
            tx_bytes: outbuf.len() as u64,
            stream,
            role: Role::Client,
            state: State::Handshaking,
            handshake: Some(Handshake::Client { expected_accept }),
            inbuf: Vec::new(),
            outbuf,
            events: VecDeque::new(),
            close_sent: false,
            peer_closed: false,
            peer_eof: false,
            last_pong: None,
            rx_bytes: 0,
        })
    }

    /// Drives one round of outbound write, inbound read and frame parsing.
    /// Returns `false` on a fatal condition; the corresponding
    /// [`WsEvent::Error`] is already queued when it does.
    pub fn pump(&mut self) -> bool {
        if self.state == State::Closed {
            return true;
        }
        if !self.write_pending() {
            return false;
        }
        if !self.read_inbound() {
            return false;
        }
        let ok = match self.state {
            State::Handshaking => self.advance_handshake(),
            State::Open | State::Closing => self.parse_frames(),
            State::Closed => true,
        };
        if !ok {
            return false;
        }
        // EOF is deferred until buffered frames have been parsed, so a
        // CLOSE followed by an immediate disconnect still surfaces as a
        // Close event rather than a read error.
        if self.peer_eof && self.state != State::Closed {
            if self.close_sent || self.peer_closed {
                self.state = State::Closed;
            } else {
                self.fatal(WsErrorKind::Read);
                return false;
            }
        }
        if self.state == State::Closed {
            return true;
        }
        self.write_pending()
    }

    /// Enqueues a TEXT frame. Dropped silently unless the connection is
    /// open.
    pub fn send_text(&mut self, text: &str) {
        if self.state != State::Open || self.close_sent {
            debug!("dropping text send on non-open endpoint");
            return;
        }
        self.queue_frame(Frame::text(text));
    }

    /// Enqueues a BINARY frame. Same drop semantics as [`send_text`].
    ///
    /// [`send_text`]: Endpoint::send_text
    pub fn send_binary(&mut self, payload: Vec<u8>) {
        if self.state != State::Open || self.close_sent {
            debug!("dropping binary send on non-open endpoint");
            return;
        }
        self.queue_frame(Frame::binary(payload));
    }

    /// Enqueues a CLOSE frame and refuses further sends. The transport shuts
    /// down once the frame drains.
    pub fn close(&mut self, code: u16, reason: &str) {
        if self.close_sent || self.state == State::Closed {
            return;
        }
        if self.state == State::Handshaking {
            self.state = State::Closed;
            return;
        }
        self.queue_frame(Frame::close(code, reason));
        self.close_sent = true;
        self.state = State::Closing;
    }

    /// Next queued connection event, in arrival order.
    pub fn next_event(&mut self) -> Option<WsEvent> {
        self.events.pop_front()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.close_sent || self.peer_closed || self.state == State::Closed
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes
    }

    /// Time of the most recent PONG from the peer, if any.
    pub fn last_pong(&self) -> Option<Instant> {
        self.last_pong
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    fn queue_frame(&mut self, frame: Frame) {
        let bytes = frame.encode(self.role == Role::Client);
        self.tx_bytes += bytes.len() as u64;
        self.outbuf.extend_from_slice(&bytes);
    }

    fn queue_raw(&mut self, bytes: &[u8]) {
        self.tx_bytes += bytes.len() as u64;
        self.outbuf.extend_from_slice(bytes);
    }

    fn fatal(&mut self, kind: WsErrorKind) {
        self.state = State::Closed;
        self.events.push_back(WsEvent::Error(kind));
    }

    fn write_pending(&mut self) -> bool {
        while !self.outbuf.is_empty() {
            match self.stream.write(&self.outbuf) {
                Ok(0) => {
                    self.fatal(WsErrorKind::Write);
                    return false;
                }
                Ok(n) => {
                    self.outbuf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("write error: {e}");
                    self.fatal(WsErrorKind::Write);
                    return false;
                }
            }
        }
        if self.close_sent && self.outbuf.is_empty() && self.state != State::Closed {
            self.stream.shutdown(Shutdown::Write).ok();
            self.state = State::Closed;
        }
        true
    }

    fn read_inbound(&mut self) -> bool {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    // EOF. Handled after the parse step so buffered frames
                    // are not lost.
                    self.peer_eof = true;
                    break;
                }
                Ok(n) => {
                    self.rx_bytes += n as u64;
                    self.inbuf.extend_from_slice(&buf[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("read error: {e}");
                    self.fatal(WsErrorKind::Read);
                    return false;
                }
            }
        }
        true
    }

    fn advance_handshake(&mut self) -> bool {
        let end = match find_header_end(&self.inbuf) {
            Some(end) => end,
            None => {
                if self.inbuf.len() > MAX_HANDSHAKE_BYTES {
                    warn!("handshake headers exceed {MAX_HANDSHAKE_BYTES} bytes");
                    self.fatal(WsErrorKind::Handshake);
                    return false;
                }
                return true;
            }
        };
        let head = String::from_utf8_lossy(&self.inbuf[..end]).into_owned();
        self.inbuf.drain(..end + 4);

        match self.handshake.take() {
            Some(Handshake::Server { path_prefix }) => {
                match server_handshake_response(&head, &path_prefix) {
                    Ok(response) => {
                        self.queue_raw(response.as_bytes());
                        self.state = State::Open;
                        self.events.push_back(WsEvent::Open);
                        true
                    }
                    Err(HandshakeError::PathMismatch(path)) => {
                        warn!("upgrade request for '{path}' rejected (expected '{path_prefix}')");
                        self.queue_raw(
                            b"HTTP/1.1 404 Not Found\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
                        );
                        self.write_pending();
                        self.fatal(WsErrorKind::Handshake);
                        false
                    }
                    Err(e) => {
                        warn!("server handshake failed: {e}");
                        self.fatal(WsErrorKind::Handshake);
                        false
                    }
                }
            }
            Some(Handshake::Client { expected_accept }) => {
                if client_response_valid(&head, &expected_accept) {
                    self.state = State::Open;
                    self.events.push_back(WsEvent::Open);
                    true
                } else {
                    warn!("client handshake rejected by server");
                    self.fatal(WsErrorKind::Handshake);
                    false
                }
            }
            None => {
                self.fatal(WsErrorKind::Handshake);
                false
            }
        }
    }

    fn parse_frames(&mut self) -> bool {
        loop {
            match Frame::decode(&self.inbuf, self.role == Role::Server) {
                Ok(None) => return true,
                Ok(Some((frame, used))) => {
                    self.inbuf.drain(..used);
                    if !self.handle_frame(frame) {
                        return false;
                    }
                    if self.state == State::Closed {
                        return true;
                    }
                }
                Err(e) => {
                    debug!("protocol violation: {e}");
                    self.fatal(WsErrorKind::Protocol);
                    return false;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> bool {
        match frame.opcode {
            Opcode::Text => {
                if !frame.fin {
                    debug!("fragmented text frame");
                    self.fatal(WsErrorKind::Protocol);
                    return false;
                }
                match String::from_utf8(frame.payload) {
                    Ok(text) => {
                        self.events.push_back(WsEvent::Text(text));
                        true
                    }
                    Err(_) => {
                        debug!("text frame payload is not valid UTF-8");
                        self.fatal(WsErrorKind::Protocol);
                        false
                    }
                }
            }
            Opcode::Binary => {
                if !frame.fin {
                    debug!("fragmented binary frame");
                    self.fatal(WsErrorKind::Protocol);
                    return false;
                }
                self.events.push_back(WsEvent::Binary(frame.payload));
                true
            }
            // Application messages are never fragmented on this wire.
            Opcode::Continuation => {
                debug!("unexpected continuation frame");
                self.fatal(WsErrorKind::Protocol);
                false
            }
            Opcode::Ping => {
                if !self.close_sent {
                    self.queue_frame(Frame::pong(frame.payload));
                }
                true
            }
            Opcode::Pong => {
                self.last_pong = Some(Instant::now());
                true
            }
            Opcode::Close => {
                let (code, reason) = frame.close_code_reason();
                self.peer_closed = true;
                if !self.close_sent {
                    // Mirror the close, echoing the peer's code.
                    self.queue_frame(Frame::close(code, ""));
                    self.close_sent = true;
                    self.state = State::Closing;
                }
                self.events.push_back(WsEvent::Close { code, reason });
                true
            }
        }
    }
}

/// `base64(SHA1(key || RFC 6455 GUID))`.
fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn server_handshake_response(head: &str, path_prefix: &str) -> Result<String, HandshakeError> {
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");
    if method != "GET" || path.is_empty() {
        return Err(HandshakeError::BadRequest);
    }
    if path != path_prefix {
        return Err(HandshakeError::PathMismatch(path.to_string()));
    }

    let mut key = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("sec-websocket-key") {
                key = Some(value.trim().to_string());
                break;
            }
        }
    }
    let key = key.ok_or(HandshakeError::MissingKey)?;
    let accept = accept_key(&key);
    Ok(format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    ))
}

fn client_response_valid(head: &str, expected_accept: &str) -> bool {
    let mut lines = head.lines();
    let status_line = lines.next().unwrap_or("");
    if status_line.split_whitespace().nth(1) != Some("101") {
        return false;
    }
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("sec-websocket-accept") {
                return value.trim() == expected_accept;
            }
        }
    }
    false
}
