// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory transport.
//!
//! A [`LoopbackTransport`] is a tiny in-process "network": broker endpoints
//! call [`LoopbackTransport::listen`] on a host name and receive one
//! [`LoopbackConnection`] per client link. Connecting to a host nobody
//! listens on is refused immediately.
//!
//! ```ignore
//! let net = LoopbackTransport::new();
//! let listener = net.listen("broker-a");
//! // ... session connects to "broker-a" ...
//! let conn = listener.accept(Duration::from_secs(1)).unwrap();
//! assert!(matches!(conn.recv(Duration::from_secs(1)), Some(Frame::Login { .. })));
//! conn.send(&Frame::LoginAck { capabilities: Capabilities::full("router") });
//! ```

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Transport, TransportLink, TransportSink};
use crate::session::HostAddr;
use crate::wire::Frame;

/// In-process transport and host registry.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    hosts: Arc<Mutex<HashMap<String, Sender<LoopbackConnection>>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting links for `host` (`name` or `name:port`).
    ///
    /// Replaces any previous listener for the same host.
    pub fn listen(&self, host: &str) -> LoopbackListener {
        let key = host_key(host);
        let (tx, rx) = unbounded();
        self.hosts.lock().insert(key.clone(), tx);
        LoopbackListener { rx, host: key }
    }

    /// Refuse future links to `host`. Existing connections are unaffected.
    pub fn stop_listening(&self, host: &str) {
        self.hosts.lock().remove(&host_key(host));
    }
}

fn host_key(host: &str) -> String {
    match HostAddr::parse(host) {
        Ok(addr) => addr.authority(),
        Err(_) => host.to_string(),
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self, host: &HostAddr, sink: TransportSink) -> io::Result<Box<dyn TransportLink>> {
        let key = host.authority();
        let listener = self.hosts.lock().get(&key).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no loopback listener on {}", key),
            )
        })?;

        let (to_broker, from_client) = unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let conn = LoopbackConnection {
            host: key.clone(),
            from_client,
            sink: sink.clone(),
            client_closed: Arc::clone(&closed),
        };
        if listener.send(conn).is_err() {
            self.hosts.lock().remove(&key);
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("loopback listener on {} is gone", key),
            ));
        }
        log::debug!("[loopback] link {:?} -> {}", sink.link_id(), key);
        sink.up();

        Ok(Box::new(LoopbackLink { to_broker, closed }))
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

struct LoopbackLink {
    to_broker: Sender<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl TransportLink for LoopbackLink {
    fn send(&mut self, body: Vec<u8>) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        self.to_broker
            .send(body)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "broker endpoint dropped"))
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Accepts client links for one host.
pub struct LoopbackListener {
    rx: Receiver<LoopbackConnection>,
    host: String,
}

impl LoopbackListener {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Wait up to `timeout` for the next client link.
    pub fn accept(&self, timeout: Duration) -> Option<LoopbackConnection> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_accept(&self) -> Option<LoopbackConnection> {
        self.rx.try_recv().ok()
    }
}

/// Broker side of one client link.
pub struct LoopbackConnection {
    host: String,
    from_client: Receiver<Vec<u8>>,
    sink: TransportSink,
    client_closed: Arc<AtomicBool>,
}

impl LoopbackConnection {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Next frame sent by the client, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout, when the client closed the link, or when
    /// the body does not decode.
    pub fn recv(&self, timeout: Duration) -> Option<Frame> {
        match self.from_client.recv_timeout(timeout) {
            Ok(body) => decode_logged(&body),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<Frame> {
        self.from_client
            .try_recv()
            .ok()
            .and_then(|body| decode_logged(&body))
    }

    /// Deliver `frame` to the client.
    pub fn send(&self, frame: &Frame) {
        self.sink.frame(frame.encode(0));
    }

    /// Deliver a raw body (for malformed-frame tests).
    pub fn send_raw(&self, body: Vec<u8>) {
        self.sink.frame(body);
    }

    /// Drop the link from the broker side.
    pub fn close(&self) {
        self.sink.down("closed by peer");
    }

    /// True once the client closed its end.
    pub fn is_closed_by_client(&self) -> bool {
        self.client_closed.load(Ordering::Acquire)
    }
}

fn decode_logged(body: &[u8]) -> Option<Frame> {
    match Frame::decode(body) {
        Ok(frame) => Some(frame),
        Err(e) => {
            log::warn!("[loopback] undecodable client frame: {}", e);
            None
        }
    }
}
