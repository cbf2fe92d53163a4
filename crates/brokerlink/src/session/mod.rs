// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sessions: one logical connection to a broker.
//!
//! A [`Session`] is created from a [`crate::Context`] with
//! [`crate::Context::session_builder`]. It owns the connection state
//! machine, the guaranteed publisher window, the subscription set, its
//! consumer flows and cache sessions. All of its callbacks run on the
//! context's driving thread.
//!
//! # Example
//!
//! ```rust,no_run
//! use brokerlink::{Context, Message, SessionConfig, SubscribeFlags};
//!
//! let ctx = Context::new()?;
//! let session = ctx
//!     .session_builder(SessionConfig::new("tcp://broker:55555"))
//!     .on_message(|msg: &brokerlink::Message, _ctx: u64| {
//!         println!("{:?}: {} bytes", msg.topic(), msg.attachment().len());
//!     })
//!     .build()?;
//! session.connect()?;
//! session.subscribe("prices/>", SubscribeFlags::WAIT_FOR_CONFIRM)?;
//! session.send(Message::to_topic("prices/eur", b"1.08".to_vec()))?;
//! # Ok::<(), brokerlink::Error>(())
//! ```

mod capabilities;
pub(crate) mod core;
mod events;
mod hosts;
mod state;

pub use capabilities::Capabilities;
pub use events::{SessionEvent, SessionEventHandler};
pub use hosts::{HostAddr, HostList, Scheme};
pub use state::SessionState;

use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use self::core::{Callback, ParkedWait, SessionCore};
use crate::cache::{CacheEventHandler, CacheSession};
use crate::config::{CacheConfig, FlowConfig, SessionConfig};
use crate::context::{ContextShared, SessionId};
use crate::dispatch::{DispatchHandler, MessageHandler, SubscribeFlags};
use crate::error::{Error, Result};
use crate::flow::{Flow, FlowEventHandler, FlowMessageHandler};
use crate::message::Message;
use crate::stats::{SessionStats, StatsSnapshot};
use crate::transport::{TcpConfig, TcpTransport, Transport, TransportEvent, LinkId};
use crate::timer::TimerToken;

// ============================================================================
// Shared state
// ============================================================================

/// State shared between a session's handles and the driving thread.
pub(crate) struct SessionShared {
    id: SessionId,
    ctx: Arc<ContextShared>,
    core: Mutex<SessionCore>,
    destroyed: AtomicBool,
    capabilities: Arc<ArcSwap<Capabilities>>,
    stats: Arc<SessionStats>,
}

impl SessionShared {
    pub(crate) fn context(&self) -> &Arc<ContextShared> {
        &self.ctx
    }

    /// Run `f` under the core lock, then hand any queued callbacks to the
    /// driver.
    pub(crate) fn with_core<R>(self: &Arc<Self>, f: impl FnOnce(&mut SessionCore) -> R) -> R {
        let (result, pending) = {
            let mut core = self.core.lock();
            let result = f(&mut core);
            (result, core.has_pending())
        };
        // On the driver thread the loop drains callbacks after this event.
        if pending && !self.ctx.on_driver_thread() {
            self.ctx.pump(self);
        }
        result
    }

    pub(crate) fn handle_transport(&self, link: LinkId, event: TransportEvent) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        self.core.lock().handle_transport(link, event);
    }

    pub(crate) fn handle_timer(&self, token: TimerToken) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        self.core.lock().handle_timer(token);
    }

    /// Drain queued callbacks, one at a time, outside the core lock.
    pub(crate) fn run_callbacks(self: &Arc<Self>) {
        loop {
            let Some(callback) = self.core.lock().pop_callback() else {
                return;
            };
            let destroyed = self.destroyed.load(Ordering::Acquire);
            match callback {
                Callback::Cache { handler, event } => handler.on_event(&event),
                _ if destroyed => {}
                Callback::Message { handlers, message } => {
                    for (handler, context) in handlers {
                        handler.on_message(&message, context);
                    }
                }
                Callback::Session { handler, event } => handler.on_event(&event),
                Callback::FlowMessage {
                    key,
                    alive,
                    handler,
                    message,
                    auto_ack,
                } => {
                    if !alive.load(Ordering::Acquire) {
                        continue;
                    }
                    handler.on_message(&Flow::new(Arc::clone(self), key), &message);
                    if let Some(msg_id) = auto_ack {
                        // The flow may have been destroyed by its own handler.
                        let _ = self.with_core(|core| core.flow_ack(key, msg_id, true));
                    }
                }
                Callback::FlowEvent {
                    key,
                    alive,
                    handler,
                    event,
                } => {
                    if alive.load(Ordering::Acquire) {
                        handler.on_event(&Flow::new(Arc::clone(self), key), &event);
                    }
                }
            }
        }
    }

    /// Idempotent teardown; outstanding cache requests report `Cancelled`.
    pub(crate) fn destroy(self: &Arc<Self>) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.core.lock().destroy();
        self.ctx.unregister(self.id);
        self.ctx.pump(self);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

// ============================================================================
// Session handle
// ============================================================================

/// Handle to a session. Cheap to clone; clones address the same session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.core.lock().state()
    }

    /// Capabilities of the router at the last login.
    pub fn capabilities(&self) -> Arc<Capabilities> {
        self.shared.capabilities.load_full()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }

    /// Connect, walking the host list.
    ///
    /// With `connect_blocking` the call returns once the session is
    /// established or the retry schedule is exhausted; otherwise it returns
    /// at once and the outcome arrives as `UpNotice` / `ConnectFailedError`.
    pub fn connect(&self) -> Result<()> {
        let blocking = self.shared.core.lock().config().connect_blocking;
        let rx = self.shared.with_core(|core| core.connect(blocking))?;
        match rx {
            Some(rx) => wait(&rx),
            None => Ok(()),
        }
    }

    /// Close the link. The publisher window and subscriptions are kept for a
    /// later `connect()`.
    pub fn disconnect(&self) -> Result<()> {
        self.shared.with_core(|core| core.disconnect())
    }

    /// Release the session. Flows and cache sessions are destroyed with it;
    /// outstanding cache requests complete with `Cancelled`. Idempotent.
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    /// Send one message.
    ///
    /// Direct messages go out immediately. Guaranteed messages enter the
    /// publisher window; when it is full, a blocking session waits up to
    /// `blocking_write_timeout` for room and a non-blocking one fails with
    /// [`Error::WouldBlock`] (a `CanSend` event follows).
    pub fn send(&self, message: Message) -> Result<()> {
        let parked = self.shared.with_core(|core| core.send(message))?;
        match parked {
            Some(parked) => self.wait_parked(parked),
            None => Ok(()),
        }
    }

    fn wait_parked(&self, parked: ParkedWait) -> Result<()> {
        let ParkedWait { id, rx, timeout } = parked;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Disconnected) => Err(Error::Cancelled),
            Err(RecvTimeoutError::Timeout) => {
                if self.shared.with_core(|core| core.unpark(id)) {
                    return Err(Error::Timeout);
                }
                // Admitted or failed while we were timing out.
                rx.recv().unwrap_or(Err(Error::Cancelled))
            }
        }
    }

    /// Send messages in order, stopping at the first failure.
    ///
    /// Fails with [`Error::PartialSend`] when some but not all were sent.
    pub fn send_multiple(&self, messages: Vec<Message>) -> Result<usize> {
        let mut sent = 0;
        for message in messages {
            if let Err(e) = self.send(message) {
                if sent == 0 {
                    return Err(e);
                }
                return Err(Error::PartialSend {
                    sent,
                    cause: Box::new(e),
                });
            }
            sent += 1;
        }
        Ok(sent)
    }

    /// Sequence ids of guaranteed messages still awaiting an ack.
    pub fn unacked_sequence_ids(&self) -> Result<Vec<u64>> {
        self.shared.with_core(|core| core.unacked_sequence_ids())
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Subscribe with the broker; matching messages go to the default
    /// handler unless a dispatch entry claims them.
    pub fn subscribe(&self, pattern: &str, flags: SubscribeFlags) -> Result<()> {
        let rx = self
            .shared
            .with_core(|core| core.subscribe(pattern, None, 0, flags))?;
        rx.map_or(Ok(()), |rx| wait(&rx))
    }

    pub fn unsubscribe(&self, pattern: &str, flags: SubscribeFlags) -> Result<()> {
        let rx = self
            .shared
            .with_core(|core| core.unsubscribe(pattern, None, 0, flags))?;
        rx.map_or(Ok(()), |rx| wait(&rx))
    }

    /// Subscribe and route matching messages to `handler` with `context`.
    ///
    /// With [`SubscribeFlags::LOCAL_DISPATCH_ONLY`] only the dispatch entry
    /// is added; nothing is sent to the broker.
    pub fn subscribe_with_handler(
        &self,
        pattern: &str,
        handler: &DispatchHandler,
        context: u64,
        flags: SubscribeFlags,
    ) -> Result<()> {
        let rx = self
            .shared
            .with_core(|core| core.subscribe(pattern, Some(handler), context, flags))?;
        rx.map_or(Ok(()), |rx| wait(&rx))
    }

    pub fn unsubscribe_with_handler(
        &self,
        pattern: &str,
        handler: &DispatchHandler,
        context: u64,
        flags: SubscribeFlags,
    ) -> Result<()> {
        let id = handler.id();
        let rx = self
            .shared
            .with_core(|core| core.unsubscribe(pattern, Some(id), context, flags))?;
        rx.map_or(Ok(()), |rx| wait(&rx))
    }

    // ------------------------------------------------------------------------
    // Flows and cache sessions
    // ------------------------------------------------------------------------

    /// Bind a consumer flow.
    ///
    /// With `bind_blocking` (the default) the call returns once the bind
    /// is acknowledged, refused or timed out.
    pub fn create_flow<H>(&self, config: FlowConfig, handler: H) -> Result<Flow>
    where
        H: FlowMessageHandler + 'static,
    {
        self.create_flow_inner(config, Arc::new(handler), None)
    }

    pub fn create_flow_with_events<H, E>(&self, config: FlowConfig, handler: H, events: E) -> Result<Flow>
    where
        H: FlowMessageHandler + 'static,
        E: FlowEventHandler + 'static,
    {
        self.create_flow_inner(config, Arc::new(handler), Some(Arc::new(events)))
    }

    fn create_flow_inner(
        &self,
        config: FlowConfig,
        handler: Arc<dyn FlowMessageHandler>,
        events: Option<Arc<dyn FlowEventHandler>>,
    ) -> Result<Flow> {
        if config.bind_blocking {
            self.shared.context().check_can_block()?;
        }
        let (key, rx) = self
            .shared
            .with_core(|core| core.create_flow(config, handler, events))?;
        let flow = Flow::new(Arc::clone(&self.shared), key);
        if let Some(rx) = rx {
            if let Err(e) = wait(&rx) {
                flow.destroy();
                return Err(e);
            }
        }
        Ok(flow)
    }

    /// Open a cache session. Blocking requests report their outcome as the
    /// return value of [`CacheSession::request`].
    pub fn create_cache_session(&self, config: CacheConfig) -> Result<CacheSession> {
        let key = self
            .shared
            .with_core(|core| core.create_cache_session(config, None))?;
        Ok(CacheSession::new(Arc::clone(&self.shared), key))
    }

    /// Open a cache session whose `NOWAIT_REPLY` requests report to
    /// `handler`.
    pub fn create_cache_session_with_handler<H>(&self, config: CacheConfig, handler: H) -> Result<CacheSession>
    where
        H: CacheEventHandler + 'static,
    {
        let handler: Arc<dyn CacheEventHandler> = Arc::new(handler);
        let key = self
            .shared
            .with_core(|core| core.create_cache_session(config, Some(handler)))?;
        Ok(CacheSession::new(Arc::clone(&self.shared), key))
    }
}

fn wait(rx: &Receiver<Result<()>>) -> Result<()> {
    rx.recv().unwrap_or(Err(Error::Cancelled))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Session`], obtained from [`crate::Context::session_builder`].
pub struct SessionBuilder {
    ctx: Arc<ContextShared>,
    config: SessionConfig,
    transport: Option<Arc<dyn Transport>>,
    on_message: Option<Arc<dyn MessageHandler>>,
    on_event: Option<Arc<dyn SessionEventHandler>>,
}

impl SessionBuilder {
    pub(crate) fn new(ctx: Arc<ContextShared>, config: SessionConfig) -> Self {
        Self {
            ctx,
            config,
            transport: None,
            on_message: None,
            on_event: None,
        }
    }

    /// Use `transport` instead of TCP.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Default handler for messages no dispatch entry claims.
    pub fn on_message<H: MessageHandler + 'static>(mut self, handler: H) -> Self {
        self.on_message = Some(Arc::new(handler));
        self
    }

    pub fn on_event<H: SessionEventHandler + 'static>(mut self, handler: H) -> Self {
        self.on_event = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Session> {
        self.config
            .validate()
            .map_err(|msg| Error::InvalidParameter(msg.into()))?;
        let hosts = HostList::parse(&self.config.host)?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(TcpTransport::new(TcpConfig::default())?),
        };

        let id = self.ctx.next_session_id();
        let capabilities = Arc::new(ArcSwap::from_pointee(Capabilities::default()));
        let stats = Arc::new(SessionStats::new());
        let core = SessionCore::new(
            id,
            Arc::clone(&self.ctx),
            self.config,
            hosts,
            transport,
            Arc::clone(&capabilities),
            self.on_message,
            self.on_event,
            Arc::clone(&stats),
        );
        let shared = Arc::new(SessionShared {
            id,
            ctx: Arc::clone(&self.ctx),
            core: Mutex::new(core),
            destroyed: AtomicBool::new(false),
            capabilities,
            stats,
        });
        self.ctx.register(id, Arc::clone(&shared));
        log::debug!("[session] {} created", id.as_u64());
        Ok(Session { shared })
    }
}
