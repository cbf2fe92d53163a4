// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport to a broker.
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                      TcpTransport                            |
//! |   connect(host) --> resolve --> IoCommand::Connect           |
//! |                                        |                     |
//! |  +-------------------------------------v-----------------+  |
//! |  |                     IoThread                           |  |
//! |  |  - mio::Poll event loop                               |  |
//! |  |  - non-blocking connect, read, write                  |  |
//! |  |  - FrameCodec (4-byte BE length prefix)               |  |
//! |  +-------------------------------------------------------+  |
//! +-------------------------------------------------------------+
//! ```
//!
//! Only plain `tcp://` hosts are supported; `tcps://` is refused with
//! `ErrorKind::Unsupported`.

mod config;
mod frame_codec;
mod io_thread;

pub use config::TcpConfig;
pub use frame_codec::{FrameCodec, DEFAULT_MAX_MESSAGE_SIZE, FRAME_HEADER_SIZE};

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use io_thread::{IoCommand, IoThread, IoThreadHandle};

use super::{Transport, TransportLink, TransportSink};
use crate::session::{HostAddr, Scheme};

/// TCP transport backed by one I/O thread.
pub struct TcpTransport {
    io: Arc<IoThreadHandle>,
    next_conn_id: AtomicU64,
}

impl TcpTransport {
    /// Start the I/O thread.
    pub fn new(config: TcpConfig) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Ok(Self {
            io: Arc::new(IoThread::spawn(config)?),
            next_conn_id: AtomicU64::new(1),
        })
    }

    pub fn is_running(&self) -> bool {
        self.io.is_running()
    }
}

fn resolve(host: &HostAddr) -> io::Result<SocketAddr> {
    (host.host(), host.port())
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} resolved to no address", host.authority()),
            )
        })
}

impl Transport for TcpTransport {
    fn connect(&self, host: &HostAddr, sink: TransportSink) -> io::Result<Box<dyn TransportLink>> {
        if host.scheme() == Scheme::Tcps {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "tcps:// hosts are not supported",
            ));
        }
        let addr = resolve(host)?;
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        self.io.command(IoCommand::Connect {
            addr,
            conn_id,
            sink,
        })?;

        Ok(Box::new(TcpLink {
            conn_id,
            io: Arc::clone(&self.io),
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

struct TcpLink {
    conn_id: u64,
    io: Arc<IoThreadHandle>,
    closed: bool,
}

impl TransportLink for TcpLink {
    fn send(&mut self, body: Vec<u8>) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        self.io.command(IoCommand::Send {
            conn_id: self.conn_id,
            body,
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.io.command(IoCommand::Close {
                conn_id: self.conn_id,
            });
        }
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.close();
    }
}
