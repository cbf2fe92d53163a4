// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event/callback dispatcher.
//!
//! A [`Context`] owns one driving thread. Every callback of every session
//! created from it (messages, session/flow/cache events, timer work) runs on
//! that thread, one at a time.
//!
//! ```text
//!   app threads            transport threads          driver thread
//!   -----------            -----------------          -------------
//!   Session::send ─┐                                  loop {
//!     lock core    │       sink.frame(bytes) ──┐        recv_deadline(next timer)
//!     queue work   │                           ├──>     Transport -> session core
//!     Pump ────────┴───────────────────────────┘        Pump      -> run callbacks
//!                                                       fire due timers
//!                                                     }
//! ```
//!
//! Blocking calls made on the driving thread would wait for work only that
//! thread can do; they fail with [`Error::BlockedInCallback`].

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::session::{SessionBuilder, SessionShared};
use crate::timer::{TimerQueue, TimerToken};
use crate::transport::{LinkId, TransportEvent};

/// Identifies a session within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl SessionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Work items for the driving thread.
pub(crate) enum DriverMsg {
    Transport {
        session: SessionId,
        link: LinkId,
        event: TransportEvent,
    },
    /// Run whatever callbacks the session has queued.
    Pump(Arc<SessionShared>),
    /// A timer earlier than the one the driver sleeps on was scheduled.
    Wake,
    Shutdown,
}

/// State shared by a context, its driver and its sessions.
pub(crate) struct ContextShared {
    tx: Sender<DriverMsg>,
    timers: Mutex<TimerQueue>,
    driver_thread: OnceLock<ThreadId>,
    sessions: DashMap<SessionId, Arc<SessionShared>>,
    next_link: AtomicU64,
}

impl ContextShared {
    pub(crate) fn sender(&self) -> Sender<DriverMsg> {
        self.tx.clone()
    }

    pub(crate) fn next_session_id(&self) -> SessionId {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_link_id(&self) -> LinkId {
        LinkId(self.next_link.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn schedule(&self, deadline: Instant, token: TimerToken) {
        let earliest = {
            let mut timers = self.timers.lock();
            let before = timers.next_deadline();
            timers.schedule(deadline, token);
            before.map_or(true, |b| deadline < b)
        };
        if earliest && !self.on_driver_thread() {
            let _ = self.tx.send(DriverMsg::Wake);
        }
    }

    pub(crate) fn purge_timers(&self, session: SessionId) {
        self.timers.lock().purge(session);
    }

    /// Ask the driver to run `session`'s queued callbacks.
    pub(crate) fn pump(&self, session: &Arc<SessionShared>) {
        let _ = self.tx.send(DriverMsg::Pump(Arc::clone(session)));
    }

    pub(crate) fn on_driver_thread(&self) -> bool {
        self.driver_thread.get() == Some(&thread::current().id())
    }

    /// Fail fast when a blocking wait would deadlock the driver.
    pub(crate) fn check_can_block(&self) -> Result<()> {
        if self.on_driver_thread() {
            Err(Error::BlockedInCallback)
        } else {
            Ok(())
        }
    }

    pub(crate) fn register(&self, id: SessionId, session: Arc<SessionShared>) {
        self.sessions.insert(id, session);
    }

    pub(crate) fn unregister(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    fn session(&self, id: SessionId) -> Option<Arc<SessionShared>> {
        self.sessions.get(&id).map(|e| Arc::clone(e.value()))
    }
}

/// Owner of a driving thread and the sessions it serves.
///
/// Dropping the context destroys its sessions, drains their final
/// callbacks and joins the driver.
pub struct Context {
    shared: Arc<ContextShared>,
    driver: Option<JoinHandle<()>>,
}

impl Context {
    /// Spawn the driving thread.
    pub fn new() -> Result<Self> {
        let (tx, rx) = unbounded();
        let shared = Arc::new(ContextShared {
            tx,
            timers: Mutex::new(TimerQueue::new()),
            driver_thread: OnceLock::new(),
            sessions: DashMap::new(),
            next_link: AtomicU64::new(1),
        });

        let driver_shared = Arc::clone(&shared);
        let driver = thread::Builder::new()
            .name("brokerlink-driver".to_string())
            .spawn(move || run(driver_shared, rx))?;
        let _ = shared.driver_thread.set(driver.thread().id());
        log::debug!("[context] driver started");

        Ok(Self {
            shared,
            driver: Some(driver),
        })
    }

    /// Start building a session served by this context.
    pub fn session_builder(&self, config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(Arc::clone(&self.shared), config)
    }

    /// Number of live (not destroyed) sessions.
    pub fn session_count(&self) -> usize {
        self.shared.sessions.len()
    }

    /// True when called from inside a callback of this context.
    pub fn is_driver_thread(&self) -> bool {
        self.shared.on_driver_thread()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let sessions: Vec<Arc<SessionShared>> = self
            .shared
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for session in sessions {
            session.destroy();
        }
        self.shared.sessions.clear();

        let _ = self.shared.tx.send(DriverMsg::Shutdown);
        if self.shared.on_driver_thread() {
            // Dropped from a callback; the loop exits on its own.
            return;
        }
        if let Some(handle) = self.driver.take() {
            if handle.join().is_err() {
                log::warn!("[context] driver thread panicked");
            }
        }
        log::debug!("[context] driver stopped");
    }
}

fn run(shared: Arc<ContextShared>, rx: Receiver<DriverMsg>) {
    loop {
        let next = shared.timers.lock().next_deadline();
        let msg = match next {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match msg {
            Ok(DriverMsg::Transport {
                session,
                link,
                event,
            }) => {
                if let Some(s) = shared.session(session) {
                    s.handle_transport(link, event);
                    s.run_callbacks();
                }
            }
            Ok(DriverMsg::Pump(s)) => s.run_callbacks(),
            Ok(DriverMsg::Wake) | Err(RecvTimeoutError::Timeout) => {}
            Ok(DriverMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let due = shared.timers.lock().pop_due(Instant::now());
        for token in due {
            if let Some(s) = shared.session(token.session) {
                s.handle_timer(token);
                s.run_callbacks();
            }
        }
    }

    // Work queued before shutdown (final cancellation events).
    while let Ok(msg) = rx.try_recv() {
        if let DriverMsg::Pump(s) = msg {
            s.run_callbacks();
        }
    }
}
