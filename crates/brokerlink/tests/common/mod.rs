// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fake broker helpers over the loopback transport.

#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use brokerlink::transport::{LoopbackConnection, LoopbackListener};
use brokerlink::wire::Frame;
use brokerlink::{
    Capabilities, Context, LoopbackTransport, Message, Session, SessionConfig,
    SessionEvent,
};
use crossbeam::channel::{unbounded, Receiver};

pub const WAIT: Duration = Duration::from_secs(2);
pub const QUIET: Duration = Duration::from_millis(150);

/// Session config with short timers and keepalives off.
pub fn fast_config(hosts: &str) -> SessionConfig {
    SessionConfig::new(hosts)
        .with_keepalive(Duration::ZERO, 0)
        .with_connect_timeout(Duration::from_millis(500))
        .with_reconnect_retry_wait(Duration::from_millis(20))
}

/// A session plus the channels its callbacks feed.
pub struct Harness {
    pub ctx: Context,
    pub net: LoopbackTransport,
    pub session: Session,
    pub events: Receiver<SessionEvent>,
    pub messages: Receiver<(Message, u64)>,
}

pub fn harness(config: SessionConfig) -> Harness {
    let ctx = Context::new().expect("context");
    let net = LoopbackTransport::new();
    let (ev_tx, events) = unbounded();
    let (msg_tx, messages) = unbounded();
    let session = ctx
        .session_builder(config)
        .transport(net.clone())
        .on_event(move |e: &SessionEvent| {
            let _ = ev_tx.send(e.clone());
        })
        .on_message(move |m: &Message, c: u64| {
            let _ = msg_tx.send((m.clone(), c));
        })
        .build()
        .expect("session");
    Harness {
        ctx,
        net,
        session,
        events,
        messages,
    }
}

/// Run a blocking call on another thread.
pub fn spawn<T, F>(f: F) -> thread::JoinHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::spawn(f)
}

/// Next frame matching `pred`, skipping keepalives and anything else.
pub fn recv_until<F>(conn: &LoopbackConnection, mut pred: F) -> Frame
where
    F: FnMut(&Frame) -> bool,
{
    let deadline = Instant::now() + WAIT;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match conn.recv(left) {
            Some(frame) if pred(&frame) => return frame,
            Some(_) => {}
            None => break,
        }
    }
    panic!("expected frame not received");
}

/// Accept the next link and answer its login.
pub fn accept_login(listener: &LoopbackListener, caps: Capabilities) -> LoopbackConnection {
    let conn = listener.accept(WAIT).expect("client link");
    recv_until(&conn, |f| matches!(f, Frame::Login { .. }));
    conn.send(&Frame::LoginAck { capabilities: caps });
    conn
}

/// Answer the publisher flow handshake that follows login.
pub fn open_publisher(conn: &LoopbackConnection, flow_id: u32, window: u8) {
    recv_until(conn, |f| matches!(f, Frame::OpenPublisherFlow { .. }));
    conn.send(&Frame::PublisherFlowUp { flow_id, window });
}

/// Connect `session` against `listener` and complete the handshake.
pub fn connect(
    session: &Session,
    listener: &LoopbackListener,
    caps: Capabilities,
) -> LoopbackConnection {
    let s = session.clone();
    let handle = spawn(move || s.connect());
    let conn = accept_login(listener, caps);
    handle.join().expect("connect thread").expect("connect");
    conn
}

/// Wait for the first event matching `pred`, discarding others.
pub fn wait_event<F>(events: &Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = Instant::now() + WAIT;
    while let Ok(event) = events.recv_deadline(deadline) {
        if pred(&event) {
            return event;
        }
    }
    panic!("expected event not received");
}

/// Poll `f` until it holds or the wait expires.
pub fn eventually<F: FnMut() -> bool>(mut f: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

pub fn publish_seqs(frames: &[Frame]) -> Vec<u64> {
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Publish { message, .. } => message.sequence_id(),
            _ => None,
        })
        .collect()
}

pub fn take_publishes(conn: &LoopbackConnection, n: usize) -> Vec<Frame> {
    (0..n)
        .map(|_| recv_until(conn, |f| matches!(f, Frame::Publish { .. })))
        .collect()
}
