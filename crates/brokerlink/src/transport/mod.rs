// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport boundary.
//!
//! A [`Transport`] opens links to broker hosts. Links move opaque frame
//! bodies (see [`crate::wire`]) and report what happens to them through the
//! [`TransportSink`] handed over at connect time:
//!
//! ```text
//!  Session core ──connect(host, sink)──> Transport ──> Box<dyn TransportLink>
//!                                              │
//!      driver <──Up / Frame(bytes) / Down──────┘   (any thread)
//! ```
//!
//! Sinks are tagged with a link id; events from a link the session already
//! replaced are dropped by the session, so transports never need to
//! coordinate with reconnect logic.

pub mod loopback;
pub mod tcp;

use crossbeam::channel::Sender;
use std::fmt;
use std::io;

use crate::context::{DriverMsg, SessionId};
use crate::session::HostAddr;

pub use loopback::{LoopbackConnection, LoopbackListener, LoopbackTransport};
pub use tcp::{TcpConfig, TcpTransport};

/// Identifies one link of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub(crate) u64);

/// What a link reports to its session.
#[derive(Debug)]
pub enum TransportEvent {
    /// Link is connected and can carry frames.
    Up,
    /// One complete frame body.
    Frame(Vec<u8>),
    /// Link is gone (refused, reset, closed by peer).
    Down(String),
}

/// Opens links to broker hosts.
pub trait Transport: Send + Sync {
    /// Start connecting to `host`.
    ///
    /// Completion is reported asynchronously through `sink`. An `Err` here
    /// means the attempt failed immediately and no event will follow.
    fn connect(&self, host: &HostAddr, sink: TransportSink) -> io::Result<Box<dyn TransportLink>>;

    /// Name for logs.
    fn name(&self) -> &'static str;
}

/// One open (or opening) link.
pub trait TransportLink: Send {
    /// Queue one frame body for transmission.
    fn send(&mut self, body: Vec<u8>) -> io::Result<()>;

    /// Close the link. No further events are reported for it.
    fn close(&mut self);
}

/// Event sink handed to a transport for one link.
#[derive(Clone)]
pub struct TransportSink {
    session: SessionId,
    link: LinkId,
    tx: Sender<DriverMsg>,
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink")
            .field("session", &self.session)
            .field("link", &self.link)
            .finish()
    }
}

impl TransportSink {
    pub(crate) fn new(session: SessionId, link: LinkId, tx: Sender<DriverMsg>) -> Self {
        Self { session, link, tx }
    }

    pub fn link_id(&self) -> LinkId {
        self.link
    }

    pub fn up(&self) {
        self.post(TransportEvent::Up);
    }

    pub fn frame(&self, body: Vec<u8>) {
        self.post(TransportEvent::Frame(body));
    }

    pub fn down(&self, reason: impl Into<String>) {
        self.post(TransportEvent::Down(reason.into()));
    }

    fn post(&self, event: TransportEvent) {
        // A closed context has no one left to tell.
        let _ = self.tx.send(DriverMsg::Transport {
            session: self.session,
            link: self.link,
            event,
        });
    }
}
