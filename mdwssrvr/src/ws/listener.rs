//! # WebSocket Listener
//!
//! Nonblocking accept loop and per-connection bookkeeping. The listener
//! exclusively owns every server-side endpoint. Each call to
//! [`Listener::pump`] drains pending accepts, advances every client one
//! round, surfaces their events tagged with a [`ClientId`], and reaps
//! connections that finished or failed.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use tracing::{debug, warn};

use super::endpoint::{Endpoint, State, WsEvent};

/// Stable handle for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

pub struct Listener {
    listener: TcpListener,
    path_prefix: String,
    clients: BTreeMap<ClientId, Endpoint>,
    next_id: u64,
}

impl Listener {
    /// Binds to the loopback interface, or all interfaces when `bind_all`
    /// is set. Port 0 requests an ephemeral port; the bound address is
    /// available via [`Listener::local_addr`].
    pub fn bind(port: u16, bind_all: bool, path_prefix: &str) -> io::Result<Listener> {
        let ip = if bind_all {
            Ipv4Addr::UNSPECIFIED
        } else {
            Ipv4Addr::LOCALHOST
        };
        let listener = TcpListener::bind((ip, port))?;
        listener.set_nonblocking(true)?;
        Ok(Listener {
            listener,
            path_prefix: path_prefix.to_string(),
            clients: BTreeMap::new(),
            next_id: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn endpoint_mut(&mut self, id: ClientId) -> Option<&mut Endpoint> {
        self.clients.get_mut(&id)
    }

    /// Accepts pending connections, pumps every client and appends their
    /// events to `events` in per-connection arrival order. Closed and
    /// failed endpoints are removed after their last events are drained.
    pub fn pump(&mut self, events: &mut Vec<(ClientId, WsEvent)>) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => match Endpoint::accept(stream, &self.path_prefix) {
                    Ok(endpoint) => {
                        let id = ClientId(self.next_id);
                        self.next_id += 1;
                        debug!("accepted {peer} as {id}");
                        self.clients.insert(id, endpoint);
                    }
                    Err(e) => warn!("failed to wrap accepted socket from {peer}: {e}"),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }

        let mut finished = Vec::new();
        for (id, endpoint) in self.clients.iter_mut() {
            let ok = endpoint.pump();
            while let Some(event) = endpoint.next_event() {
                events.push((*id, event));
            }
            if !ok || endpoint.state() == State::Closed {
                finished.push(*id);
            }
        }
        for id in finished {
            debug!("removing {id}");
            self.clients.remove(&id);
        }
    }

    /// Sends CLOSE(1001, "shutdown") to every live client with a
    /// best-effort flush, then drops them. The listening socket closes when
    /// the `Listener` itself is dropped.
    pub fn stop(&mut self) {
        for (id, endpoint) in self.clients.iter_mut() {
            debug!("closing {id} for shutdown");
            endpoint.close(1001, "shutdown");
            endpoint.pump();
        }
        self.clients.clear();
    }
}
