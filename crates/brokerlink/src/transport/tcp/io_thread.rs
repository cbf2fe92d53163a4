// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! I/O thread for the TCP transport.
//!
//! One mio poll loop multiplexes every link opened through a
//! [`TcpTransport`](super::TcpTransport). Decoded frame bodies and link
//! state changes go straight to each link's [`TransportSink`].
//!
//! ```text
//!  driver thread                     I/O thread
//!  -------------                     ----------
//!  TcpLink::send --IoCommand--+
//!                             |--> cmd_rx --> Poll(WAKER_TOKEN)
//!  Waker::wake ---------------+                  |
//!                                   readable --> FrameCodec --> sink.frame()
//!                                   writable --> send_queue flush
//!                                   connected -> sink.up()
//!                                   error/EOF -> sink.down()
//! ```

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use socket2::{SockRef, TcpKeepalive};

use super::frame_codec::FrameCodec;
use super::TcpConfig;
use crate::transport::TransportSink;

// ============================================================================
// Constants
// ============================================================================

/// Token for the waker (command channel)
const WAKER_TOKEN: Token = Token(0);

/// Starting token for connections
const CONNECTION_TOKEN_START: usize = 1;

/// Poll timeout; bounds shutdown latency when no wake arrives
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum events to process per poll
const MAX_EVENTS: usize = 128;

// ============================================================================
// Commands
// ============================================================================

/// Commands sent to the I/O thread.
pub(crate) enum IoCommand {
    /// Open an outbound connection
    Connect {
        addr: SocketAddr,
        conn_id: u64,
        sink: TransportSink,
    },

    /// Queue a frame body on a connection
    Send { conn_id: u64, body: Vec<u8> },

    /// Close a connection without reporting it down
    Close { conn_id: u64 },

    /// Stop the I/O thread
    Shutdown,
}

// ============================================================================
// I/O Thread Handle
// ============================================================================

/// Shared handle to the I/O thread; the last owner stops the thread.
pub(crate) struct IoThreadHandle {
    cmd_tx: Sender<IoCommand>,
    waker: Arc<Waker>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl IoThreadHandle {
    pub(crate) fn command(&self, cmd: IoCommand) -> io::Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "I/O thread stopped"))?;
        self.waker.wake()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub(crate) fn shutdown(&self) -> io::Result<()> {
        let handle = self.thread_handle.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        let _ = self.cmd_tx.send(IoCommand::Shutdown);
        let _ = self.waker.wake();
        handle
            .join()
            .map_err(|_| io::Error::other("I/O thread panicked"))
    }
}

impl Drop for IoThreadHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

// ============================================================================
// I/O Thread
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Connecting,
    Connected,
}

struct IoConnection {
    stream: TcpStream,
    conn_id: u64,
    remote_addr: SocketAddr,
    state: LinkState,
    codec: FrameCodec,
    sink: TransportSink,
    send_queue: Vec<u8>,
    send_offset: usize,
}

impl IoConnection {
    fn queued_bytes(&self) -> usize {
        self.send_queue.len() - self.send_offset
    }
}

pub(crate) struct IoThread {
    config: TcpConfig,
    poll: Poll,
    connections: HashMap<Token, IoConnection>,
    conn_id_to_token: HashMap<u64, Token>,
    next_token: usize,
    cmd_rx: Receiver<IoCommand>,
    running: Arc<AtomicBool>,
}

impl IoThread {
    /// Spawn the poll loop on its own thread.
    pub(crate) fn spawn(config: TcpConfig) -> io::Result<IoThreadHandle> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let (cmd_tx, cmd_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let io_thread = Self {
            config,
            poll,
            connections: HashMap::new(),
            conn_id_to_token: HashMap::new(),
            next_token: CONNECTION_TOKEN_START,
            cmd_rx,
            running: Arc::clone(&running),
        };

        let thread_handle = thread::Builder::new()
            .name("brokerlink-tcp-io".to_string())
            .spawn(move || io_thread.run())?;

        Ok(IoThreadHandle {
            cmd_tx,
            waker,
            thread_handle: Mutex::new(Some(thread_handle)),
            running,
        })
    }

    fn run(mut self) {
        log::debug!("[tcp-io] started");
        let mut events = Events::with_capacity(MAX_EVENTS);

        while self.running.load(Ordering::Relaxed) {
            if let Err(e) = self.poll.poll(&mut events, Some(DEFAULT_POLL_TIMEOUT)) {
                if e.kind() != io::ErrorKind::Interrupted {
                    log::warn!("[tcp-io] poll error: {}", e);
                }
                continue;
            }

            for event in events.iter() {
                match event.token() {
                    WAKER_TOKEN => self.handle_commands(),
                    token => {
                        if self.is_connecting(token) {
                            self.check_connect(token);
                        }
                        if event.is_readable() {
                            self.handle_readable(token);
                        }
                        if event.is_writable() {
                            self.try_flush(token);
                        }
                    }
                }
            }
        }

        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close_connection(token, Some("I/O thread shutdown".to_string()));
        }
        log::debug!("[tcp-io] stopped");
    }

    fn handle_commands(&mut self) {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(IoCommand::Connect {
                    addr,
                    conn_id,
                    sink,
                }) => self.handle_connect(addr, conn_id, sink),
                Ok(IoCommand::Send { conn_id, body }) => self.handle_send(conn_id, body),
                Ok(IoCommand::Close { conn_id }) => {
                    if let Some(token) = self.conn_id_to_token.get(&conn_id).copied() {
                        self.close_connection(token, None);
                    }
                }
                Ok(IoCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::Relaxed);
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
    }

    fn handle_connect(&mut self, addr: SocketAddr, conn_id: u64, sink: TransportSink) {
        let mut stream = match TcpStream::connect(addr) {
            Ok(s) => s,
            Err(e) => {
                sink.down(format!("connect to {} failed: {}", addr, e));
                return;
            }
        };

        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(e) =
            self.poll
                .registry()
                .register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)
        {
            sink.down(format!("failed to register connection: {}", e));
            return;
        }

        log::debug!("[tcp-io] conn {} connecting to {}", conn_id, addr);
        self.connections.insert(
            token,
            IoConnection {
                stream,
                conn_id,
                remote_addr: addr,
                state: LinkState::Connecting,
                codec: FrameCodec::new(self.config.max_message_size),
                sink,
                send_queue: Vec::new(),
                send_offset: 0,
            },
        );
        self.conn_id_to_token.insert(conn_id, token);
    }

    fn is_connecting(&self, token: Token) -> bool {
        self.connections
            .get(&token)
            .is_some_and(|c| c.state == LinkState::Connecting)
    }

    /// Resolve a pending non-blocking connect.
    fn check_connect(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        match conn.stream.take_error() {
            Ok(None) => {}
            Ok(Some(e)) | Err(e) => {
                self.close_connection(token, Some(format!("connect failed: {}", e)));
                return;
            }
        }
        match conn.stream.peer_addr() {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => return,
            Err(e) => {
                self.close_connection(token, Some(format!("connect failed: {}", e)));
                return;
            }
        }

        if let Err(e) = apply_socket_options(&conn.stream, &self.config) {
            log::warn!(
                "[tcp-io] conn {}: socket options not applied: {}",
                conn.conn_id,
                e
            );
        }
        conn.state = LinkState::Connected;
        log::debug!("[tcp-io] conn {} up ({})", conn.conn_id, conn.remote_addr);
        conn.sink.up();
    }

    fn handle_send(&mut self, conn_id: u64, body: Vec<u8>) {
        let Some(token) = self.conn_id_to_token.get(&conn_id).copied() else {
            return;
        };
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        if conn.queued_bytes() + body.len() > self.config.max_send_queue {
            self.close_connection(token, Some("send queue overflow".to_string()));
            return;
        }
        FrameCodec::encode_into(&body, &mut conn.send_queue);

        if conn.state == LinkState::Connected {
            self.try_flush(token);
        }
    }

    fn handle_readable(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if conn.state != LinkState::Connected {
            return;
        }

        loop {
            match conn.codec.decode(&mut conn.stream) {
                Ok(Some(body)) => conn.sink.frame(body),
                Ok(None) => break,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.close_connection(token, Some("connection closed by peer".to_string()));
                    return;
                }
                Err(e) => {
                    self.close_connection(token, Some(format!("read error: {}", e)));
                    return;
                }
            }
        }
    }

    fn try_flush(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if conn.state != LinkState::Connected {
            return;
        }

        while conn.send_offset < conn.send_queue.len() {
            match conn.stream.write(&conn.send_queue[conn.send_offset..]) {
                Ok(0) => {
                    self.close_connection(token, Some("write returned 0".to_string()));
                    return;
                }
                Ok(n) => conn.send_offset += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.close_connection(token, Some(format!("write error: {}", e)));
                    return;
                }
            }
        }
        conn.send_queue.clear();
        conn.send_offset = 0;
    }

    /// Drop a connection; `reason` is reported to the sink unless the
    /// close was requested locally.
    fn close_connection(&mut self, token: Token, reason: Option<String>) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        self.conn_id_to_token.remove(&conn.conn_id);
        let _ = self.poll.registry().deregister(&mut conn.stream);
        let _ = conn.stream.shutdown(std::net::Shutdown::Both);

        match reason {
            Some(reason) => {
                log::debug!("[tcp-io] conn {} down: {}", conn.conn_id, reason);
                conn.sink.down(reason);
            }
            None => log::debug!("[tcp-io] conn {} closed locally", conn.conn_id),
        }
    }
}

fn apply_socket_options(stream: &TcpStream, config: &TcpConfig) -> io::Result<()> {
    let sock = SockRef::from(stream);
    sock.set_nodelay(config.nodelay)?;
    if let Some(idle) = config.keepalive {
        sock.set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
    }
    if config.send_buffer_size > 0 {
        sock.set_send_buffer_size(config.send_buffer_size)?;
    }
    if config.recv_buffer_size > 0 {
        sock.set_recv_buffer_size(config.recv_buffer_size)?;
    }
    Ok(())
}
