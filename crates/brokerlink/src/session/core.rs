// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session core: the connection state machine and everything multiplexed
//! over it.
//!
//! All mutation happens under the session mutex, on whichever thread made
//! the call (application thread for API calls, driver thread for transport
//! events and timers). The core never runs application code: it queues
//! [`Callback`]s that the driver runs after the lock is released.
//!
//! ```text
//!   start_connect ──> try host ──Up──> Login ──LoginAck──> Established
//!        ^              │  ^                                   │
//!        │   fail/timeout  └── next host / retry / backoff      │ link lost
//!        │              v                                      v
//!        │           Failed <── ceiling reached ──────── Reconnecting
//!        └─────────────────────────────────────────────────────┘
//! ```

use arc_swap::ArcSwap;
use crossbeam::channel::{bounded, Receiver, Sender};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Capabilities, HostAddr, HostList, SessionEvent, SessionEventHandler, SessionState};
use crate::cache::request::{CacheCoordinator, Completion};
use crate::cache::{CacheEvent, CacheEventHandler, CacheRequestFlags, LiveDataPolicy, CacheOutcome};
use crate::config::{CacheConfig, FlowConfig, GdReconnectAction, SessionConfig};
use crate::context::{ContextShared, SessionId};
use crate::dispatch::{DispatchHandler, DispatchTable, HandlerId, MessageHandler, SubscribeFlags};
use crate::error::{Error, Result, Subcode};
use crate::flow::core::{BindTimeout, FlowCore};
use crate::flow::{FlowEvent, FlowEventHandler, FlowMessageHandler, FlowState};
use crate::message::Message;
use crate::publisher::Publisher;
use crate::stats::SessionStats;
use crate::subscriptions::SubscriptionSet;
use crate::timer::{TimerKind, TimerToken};
use crate::topic;
use crate::transport::{LinkId, Transport, TransportEvent, TransportLink, TransportSink};
use crate::wire::Frame;

// ============================================================================
// Callbacks
// ============================================================================

/// Application code to run on the driving thread, outside the core lock.
pub(crate) enum Callback {
    Message {
        handlers: Vec<(Arc<dyn MessageHandler>, u64)>,
        message: Message,
    },
    Session {
        handler: Arc<dyn SessionEventHandler>,
        event: SessionEvent,
    },
    FlowMessage {
        key: u64,
        alive: Arc<AtomicBool>,
        handler: Arc<dyn FlowMessageHandler>,
        message: Message,
        /// Message id to ack once the handler returns (auto ack mode).
        auto_ack: Option<u64>,
    },
    FlowEvent {
        key: u64,
        alive: Arc<AtomicBool>,
        handler: Arc<dyn FlowEventHandler>,
        event: FlowEvent,
    },
    Cache {
        handler: Arc<dyn CacheEventHandler>,
        event: CacheEvent,
    },
}

/// Outcome of a send that could not complete at once.
pub(crate) struct ParkedWait {
    pub id: u64,
    pub rx: Receiver<Result<()>>,
    pub timeout: Duration,
}

// ============================================================================
// Core state
// ============================================================================

struct ActiveLink {
    id: LinkId,
    link: Box<dyn TransportLink>,
    host: HostAddr,
    logged_in: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Attempt {
    reconnect: bool,
    /// Completed passes over the host list.
    pass: u32,
    /// Extra attempts made on the current host.
    host_tries: u32,
}

/// Broker answer awaited for one subscribe or unsubscribe. Later
/// subscribers to the same topic join it until the broker answers.
struct PendingConfirm {
    topic: String,
    waiters: Vec<Sender<Result<()>>>,
    /// Callers that asked for a `SubscriptionOk` event.
    notify: u32,
    unsubscribe: bool,
    /// Dispatch entries added by the callers, removed again on refusal.
    locals: Vec<(HandlerId, u64)>,
}

impl PendingConfirm {
    fn join(
        &mut self,
        wait: bool,
        notify: bool,
        local: Option<(HandlerId, u64)>,
    ) -> Option<Receiver<Result<()>>> {
        if notify {
            self.notify += 1;
        }
        self.locals.extend(local);
        if wait {
            let (tx, rx) = bounded(1);
            self.waiters.push(tx);
            Some(rx)
        } else {
            None
        }
    }
}

pub(crate) struct SessionCore {
    id: SessionId,
    ctx: Arc<ContextShared>,
    config: SessionConfig,
    hosts: HostList,
    transport: Arc<dyn Transport>,
    state: SessionState,
    link: Option<ActiveLink>,
    attempt: Attempt,
    /// Host of the last established link.
    last_host: Option<String>,
    capabilities: Arc<ArcSwap<Capabilities>>,

    timer_gens: HashMap<TimerKind, u64>,
    next_timer_gen: u64,
    keepalive_missed: u32,
    inbound_seen: bool,
    connect_waiters: Vec<Sender<Result<()>>>,

    publisher: Publisher,
    dispatch: DispatchTable,
    subscriptions: SubscriptionSet,
    pending_confirms: HashMap<u64, PendingConfirm>,
    next_correlation: u64,
    default_handler: Option<Arc<dyn MessageHandler>>,
    event_handler: Option<Arc<dyn SessionEventHandler>>,

    flows: HashMap<u64, FlowCore>,
    flow_by_id: HashMap<u32, u64>,
    flow_by_bind: HashMap<u32, u64>,
    next_flow_key: u64,
    next_bind_correlation: u32,

    cache: CacheCoordinator,
    pending: VecDeque<Callback>,
    stats: Arc<SessionStats>,
}

impl SessionCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SessionId,
        ctx: Arc<ContextShared>,
        config: SessionConfig,
        hosts: HostList,
        transport: Arc<dyn Transport>,
        capabilities: Arc<ArcSwap<Capabilities>>,
        default_handler: Option<Arc<dyn MessageHandler>>,
        event_handler: Option<Arc<dyn SessionEventHandler>>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            id,
            ctx,
            publisher: Publisher::new(&config),
            config,
            hosts,
            transport,
            state: SessionState::Idle,
            link: None,
            attempt: Attempt::default(),
            last_host: None,
            capabilities,
            timer_gens: HashMap::new(),
            next_timer_gen: 1,
            keepalive_missed: 0,
            inbound_seen: false,
            connect_waiters: Vec::new(),
            dispatch: DispatchTable::new(),
            subscriptions: SubscriptionSet::new(),
            pending_confirms: HashMap::new(),
            next_correlation: 1,
            default_handler,
            event_handler,
            flows: HashMap::new(),
            flow_by_id: HashMap::new(),
            flow_by_bind: HashMap::new(),
            next_flow_key: 1,
            next_bind_correlation: 1,
            cache: CacheCoordinator::new(),
            pending: VecDeque::new(),
            stats,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn pop_callback(&mut self) -> Option<Callback> {
        self.pending.pop_front()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state == SessionState::Destroyed {
            Err(Error::Destroyed)
        } else {
            Ok(())
        }
    }

    fn ensure_established(&self) -> Result<()> {
        self.ensure_alive()?;
        if self.state == SessionState::Established {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    // ------------------------------------------------------------------------
    // Plumbing: timers, frames, callbacks
    // ------------------------------------------------------------------------

    fn arm(&mut self, kind: TimerKind, after: Duration) {
        let gen = self.next_timer_gen;
        self.next_timer_gen += 1;
        self.timer_gens.insert(kind, gen);
        self.ctx.schedule(
            Instant::now() + after,
            TimerToken {
                session: self.id,
                kind,
                gen,
            },
        );
    }

    fn disarm(&mut self, kind: TimerKind) {
        self.timer_gens.remove(&kind);
    }

    fn is_armed(&self, kind: TimerKind) -> bool {
        self.timer_gens.contains_key(&kind)
    }

    /// Consume a fired timer; `false` when it was re-armed or disarmed since.
    fn take_timer(&mut self, token: &TimerToken) -> bool {
        if self.timer_gens.get(&token.kind) == Some(&token.gen) {
            self.timer_gens.remove(&token.kind);
            true
        } else {
            false
        }
    }

    fn send_frame(&mut self, frame: &Frame) -> bool {
        let level = if self.state == SessionState::Established && self.capabilities.load().compression
        {
            self.config.compression_level
        } else {
            0
        };
        let Some(active) = self.link.as_mut() else {
            return false;
        };
        match active.link.send(frame.encode(level)) {
            Ok(()) => {
                self.stats.add_frames_sent(1);
                true
            }
            Err(e) => {
                // The transport reports the loss through its sink.
                log::debug!("[session] {} send failed: {}", frame.kind(), e);
                false
            }
        }
    }

    fn send_frames(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            self.send_frame(&frame);
        }
    }

    fn close_link(&mut self) {
        if let Some(mut active) = self.link.take() {
            active.link.close();
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        log::debug!("[session] {} event {:?}", self.id.as_u64(), event);
        if let Some(handler) = &self.event_handler {
            self.pending.push_back(Callback::Session {
                handler: Arc::clone(handler),
                event,
            });
        }
    }

    fn emit_flow(&mut self, key: u64, event: FlowEvent) {
        log::debug!("[flow] {} event {:?}", key, event);
        let Some(flow) = self.flows.get(&key) else {
            return;
        };
        if let Some(handler) = flow.event_handler() {
            self.pending.push_back(Callback::FlowEvent {
                key,
                alive: Arc::clone(flow.alive()),
                handler: Arc::clone(handler),
                event,
            });
        }
    }

    fn complete_waiters(&mut self, result: &Result<()>) {
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(match result {
                Ok(()) => Ok(()),
                Err(e) => Err(e.duplicate()),
            });
        }
    }

    /// Route a topic message to its dispatch entries, or to the default
    /// handler when none matches.
    fn dispatch(&mut self, message: Message) {
        let mut handlers = message
            .topic()
            .map(|t| self.dispatch.lookup(t))
            .unwrap_or_default();
        if handlers.is_empty() {
            match &self.default_handler {
                Some(handler) => {
                    handlers.push((Arc::clone(handler), 0));
                    self.stats.add_default_dispatched(1);
                }
                None => {
                    log::debug!("[session] no handler for {:?}, dropped", message.topic());
                    return;
                }
            }
        }
        self.pending.push_back(Callback::Message { handlers, message });
    }

    // ------------------------------------------------------------------------
    // Connection state machine
    // ------------------------------------------------------------------------

    /// Application `connect()`. Returns a receiver when the caller should
    /// wait for the outcome.
    pub(crate) fn connect(&mut self, blocking: bool) -> Result<Option<Receiver<Result<()>>>> {
        self.ensure_alive()?;
        if self.state == SessionState::Established {
            return Ok(None);
        }
        let rx = if blocking {
            self.ctx.check_can_block()?;
            let (tx, rx) = bounded(1);
            self.connect_waiters.push(tx);
            Some(rx)
        } else {
            None
        };
        if self.state.can_connect() {
            self.start_connect(false);
        }
        Ok(rx)
    }

    fn start_connect(&mut self, reconnect: bool) {
        self.attempt = Attempt {
            reconnect,
            ..Attempt::default()
        };
        self.hosts.reset();
        self.state = if reconnect {
            SessionState::Reconnecting
        } else {
            SessionState::Connecting
        };
        log::info!(
            "[session] {} {} via {} host(s)",
            self.id.as_u64(),
            if reconnect { "reconnecting" } else { "connecting" },
            self.hosts.len()
        );
        self.try_current_host();
    }

    /// Open a link to the cursor host, moving on past hosts that fail at
    /// once.
    fn try_current_host(&mut self) {
        loop {
            let host = self.hosts.current().clone();
            let link_id = self.ctx.next_link_id();
            let sink = TransportSink::new(self.id, link_id, self.ctx.sender());
            log::debug!(
                "[session] {} attempt {} (pass {}) via {}",
                self.id.as_u64(),
                host,
                self.attempt.pass,
                self.transport.name()
            );
            match self.transport.connect(&host, sink) {
                Ok(link) => {
                    self.link = Some(ActiveLink {
                        id: link_id,
                        link,
                        host,
                        logged_in: false,
                    });
                    self.arm(TimerKind::ConnectAttempt, self.config.connect_timeout);
                    return;
                }
                Err(e) => {
                    log::debug!("[session] connect to {} failed: {}", host, e);
                    if !self.advance_after_failure(Subcode::CommunicationError, &e.to_string()) {
                        return;
                    }
                }
            }
        }
    }

    /// Move the attempt schedule past a failed attempt. Returns `true` when
    /// the next attempt should start right away.
    fn advance_after_failure(&mut self, subcode: Subcode, reason: &str) -> bool {
        self.close_link();
        self.disarm(TimerKind::ConnectAttempt);

        if self.attempt.host_tries < self.config.connect_retries_per_host {
            self.attempt.host_tries += 1;
            return true;
        }
        self.attempt.host_tries = 0;
        if !self.hosts.advance() {
            return true;
        }

        self.attempt.pass += 1;
        let ceiling = if self.attempt.reconnect {
            self.config.reconnect_retries
        } else if self.config.connect_retries < 0 {
            -1
        } else {
            self.config.connect_retries.saturating_add(1)
        };
        if ceiling >= 0 && i64::from(self.attempt.pass) >= i64::from(ceiling) {
            self.fail(subcode, reason);
            return false;
        }
        self.arm(TimerKind::RetryBackoff, self.config.reconnect_retry_wait);
        false
    }

    fn retry_after_failure(&mut self, subcode: Subcode, reason: &str) {
        if self.advance_after_failure(subcode, reason) {
            self.try_current_host();
        }
    }

    /// Connect schedule exhausted or login refused for good.
    fn fail(&mut self, subcode: Subcode, reason: &str) {
        self.close_link();
        for kind in [
            TimerKind::ConnectAttempt,
            TimerKind::RetryBackoff,
            TimerKind::Keepalive,
            TimerKind::PubAck,
        ] {
            self.disarm(kind);
        }
        let reconnect = self.attempt.reconnect;
        self.state = SessionState::Failed;
        log::warn!(
            "[session] {} {} failed: {} ({})",
            self.id.as_u64(),
            if reconnect { "reconnect" } else { "connect" },
            reason,
            subcode
        );

        let err = if subcode == Subcode::CommunicationError || subcode == Subcode::Timeout {
            Error::CommunicationError(reason.to_string())
        } else {
            Error::rejected(subcode, reason)
        };
        self.complete_waiters(&Err(err));
        self.publisher.fail_parked(&Error::NotConnected);

        let reason = reason.to_string();
        self.emit(if reconnect {
            SessionEvent::DownError {
                subcode,
                reason: reason.clone(),
            }
        } else {
            SessionEvent::ConnectFailedError {
                subcode,
                reason: reason.clone(),
            }
        });
        self.fail_flows(subcode, &reason);
    }

    fn fail_flows(&mut self, subcode: Subcode, reason: &str) {
        let mut keys: Vec<u64> = self.flows.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            self.disarm(TimerKind::FlowBind(key));
            self.disarm(TimerKind::FlowAck(key));
            let event = self
                .flows
                .get_mut(&key)
                .and_then(|f| f.on_session_failed(subcode, reason));
            if let Some(event) = event {
                self.emit_flow(key, event);
            }
        }
        self.flow_by_id.clear();
        self.flow_by_bind.clear();
    }

    /// Flows lose their binding with the link; they rebind after login.
    fn unbind_flows(&mut self) {
        let mut keys: Vec<u64> = self.flows.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            self.disarm(TimerKind::FlowBind(key));
            self.disarm(TimerKind::FlowAck(key));
            let event = self.flows.get_mut(&key).and_then(|f| f.on_session_down());
            if let Some(event) = event {
                self.emit_flow(key, event);
            }
        }
        self.flow_by_id.clear();
        self.flow_by_bind.clear();
    }

    fn fail_confirms(&mut self, err: &Error) {
        for (_, confirm) in self.pending_confirms.drain() {
            for waiter in confirm.waiters {
                let _ = waiter.send(Err(err.duplicate()));
            }
        }
    }

    /// The link dropped, timed out or spoke garbage.
    fn link_lost(&mut self, subcode: Subcode, reason: &str) {
        match self.state {
            SessionState::Connecting | SessionState::Reconnecting => {
                log::debug!("[session] {} attempt lost: {}", self.id.as_u64(), reason);
                self.retry_after_failure(subcode, reason);
            }
            SessionState::Established => self.established_lost(subcode, reason),
            _ => self.close_link(),
        }
    }

    fn established_lost(&mut self, subcode: Subcode, reason: &str) {
        log::warn!(
            "[session] {} link lost: {} ({})",
            self.id.as_u64(),
            reason,
            subcode
        );
        self.close_link();
        self.disarm(TimerKind::Keepalive);
        self.disarm(TimerKind::PubAck);
        self.publisher.on_link_lost();
        self.unbind_flows();
        self.fail_confirms(&Error::CommunicationError(reason.to_string()));

        if self.config.reconnect_retries == 0 {
            self.attempt.reconnect = true;
            self.state = SessionState::Failed;
            self.publisher.fail_parked(&Error::NotConnected);
            self.emit(SessionEvent::DownError {
                subcode,
                reason: reason.to_string(),
            });
            self.fail_flows(subcode, reason);
            return;
        }
        self.stats.add_reconnects(1);
        self.emit(SessionEvent::Reconnecting {
            reason: reason.to_string(),
        });
        self.start_connect(true);
    }

    fn on_link_up(&mut self) {
        let login = Frame::Login {
            client_name: self.config.effective_client_name(),
            vpn_name: self.config.vpn_name.clone(),
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            keepalive_ms: u32::try_from(self.config.keepalive_interval.as_millis())
                .unwrap_or(u32::MAX),
        };
        self.send_frame(&login);
    }

    fn on_login_ack(&mut self, capabilities: Capabilities) {
        self.disarm(TimerKind::ConnectAttempt);
        self.disarm(TimerKind::RetryBackoff);
        let Some(active) = self.link.as_mut() else {
            return;
        };
        active.logged_in = true;
        let host = active.host.authority();
        let host_changed = self.last_host.as_deref().is_some_and(|h| h != host);
        self.last_host = Some(host.clone());

        let reconnect = self.attempt.reconnect;
        self.capabilities.store(Arc::new(capabilities.clone()));
        self.state = SessionState::Established;
        self.keepalive_missed = 0;
        self.inbound_seen = false;
        log::info!(
            "[session] {} established with {} ({})",
            self.id.as_u64(),
            capabilities.router_name,
            host
        );

        if host_changed
            && self.config.gd_reconnect_action == GdReconnectAction::Disconnect
            && self.publisher.has_unacked()
        {
            self.abandon_for_gd(&host);
            return;
        }

        self.emit(if reconnect {
            SessionEvent::Reconnected
        } else {
            SessionEvent::UpNotice {
                router_name: capabilities.router_name.clone(),
            }
        });
        self.complete_waiters(&Ok(()));
        if !self.config.keepalive_interval.is_zero() {
            self.arm(TimerKind::Keepalive, self.config.keepalive_interval);
        }

        if !self.subscriptions.is_empty() {
            if self.config.reapply_subscriptions {
                let topics: Vec<String> = self.subscriptions.topics().map(str::to_string).collect();
                log::debug!("[session] replaying {} subscription(s)", topics.len());
                for topic in topics {
                    let correlation = self.next_correlation();
                    self.send_frame(&Frame::Subscribe {
                        correlation,
                        topic,
                        confirm: false,
                    });
                }
            } else {
                self.subscriptions.clear();
            }
        }

        if capabilities.guaranteed_publish {
            let open = self.publisher.open();
            self.send_frame(&open);
        }

        let mut keys: Vec<u64> = self
            .flows
            .iter()
            .filter(|(_, f)| f.needs_rebind())
            .map(|(k, _)| *k)
            .collect();
        keys.sort_unstable();
        for key in keys {
            self.bind_flow(key);
        }
    }

    /// `Disconnect` reconnect policy: the unacked window cannot follow the
    /// session to another host.
    fn abandon_for_gd(&mut self, host: &str) {
        let messages = self.publisher.take_unacked();
        log::warn!(
            "[session] {} landed on {}; returning {} unacked message(s)",
            self.id.as_u64(),
            host,
            messages.len()
        );
        self.send_frame(&Frame::Disconnect {
            subcode: Subcode::GdReconnectFailed,
            reason: "unacked guaranteed messages cannot move hosts".into(),
        });
        self.close_link();
        self.state = SessionState::Disconnected;
        self.disarm(TimerKind::PubAck);
        let err = Error::rejected(Subcode::GdReconnectFailed, "reconnected to a different host");
        self.complete_waiters(&Err(err.duplicate()));
        self.publisher.fail_parked(&err);

        self.emit(SessionEvent::UnackedMessagesReturned { messages });
        let reason = format!("reconnected to different host {}", host);
        self.emit(SessionEvent::DownError {
            subcode: Subcode::GdReconnectFailed,
            reason: reason.clone(),
        });
        self.fail_flows(Subcode::GdReconnectFailed, &reason);
    }

    fn on_login_nak(&mut self, subcode: Subcode, reason: &str) {
        if subcode.is_terminal_login_failure() {
            self.fail(subcode, reason);
        } else {
            self.retry_after_failure(subcode, reason);
        }
    }

    /// Application `disconnect()`: graceful, the publisher window stays.
    pub(crate) fn disconnect(&mut self) -> Result<()> {
        self.ensure_alive()?;
        match self.state {
            SessionState::Idle | SessionState::Disconnected | SessionState::Failed => return Ok(()),
            _ => {}
        }
        if self.link.as_ref().is_some_and(|l| l.logged_in) {
            self.send_frame(&Frame::Disconnect {
                subcode: Subcode::SessionDisconnected,
                reason: "client disconnect".into(),
            });
        }
        self.close_link();
        for kind in [
            TimerKind::ConnectAttempt,
            TimerKind::RetryBackoff,
            TimerKind::Keepalive,
            TimerKind::PubAck,
        ] {
            self.disarm(kind);
        }
        self.publisher.on_link_lost();
        self.publisher.fail_parked(&Error::NotConnected);
        self.unbind_flows();
        self.fail_confirms(&Error::NotConnected);
        self.complete_waiters(&Err(Error::Cancelled));
        self.state = SessionState::Disconnected;
        log::info!("[session] {} disconnected", self.id.as_u64());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    pub(crate) fn handle_transport(&mut self, link: LinkId, event: TransportEvent) {
        if self.link.as_ref().map(|l| l.id) != Some(link) {
            log::trace!("[session] event from stale link {:?} ignored", link);
            return;
        }
        match event {
            TransportEvent::Up => self.on_link_up(),
            TransportEvent::Frame(body) => {
                self.stats.add_frames_received(1);
                self.inbound_seen = true;
                self.keepalive_missed = 0;
                match Frame::decode(&body) {
                    Ok(frame) => self.handle_frame(frame),
                    Err(e) => self.link_lost(Subcode::ProtocolError, &e.to_string()),
                }
            }
            TransportEvent::Down(reason) => self.link_lost(Subcode::CommunicationError, &reason),
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        let logged_in = self.link.as_ref().is_some_and(|l| l.logged_in);
        match frame {
            Frame::LoginAck { capabilities } if !logged_in => self.on_login_ack(capabilities),
            Frame::LoginNak { subcode, reason } if !logged_in => {
                self.on_login_nak(subcode, &reason)
            }
            Frame::Keepalive => {}
            Frame::Disconnect { subcode, reason } => self.link_lost(subcode, &reason),
            other if !logged_in => {
                self.link_lost(
                    Subcode::ProtocolError,
                    &format!("{} before login completed", other.kind()),
                );
            }
            Frame::SubscriptionAck {
                correlation,
                topic,
                subcode,
            } => self.on_subscription_ack(correlation, topic, subcode),
            Frame::PublisherFlowUp { flow_id, window } => self.on_publisher_flow_up(flow_id, window),
            Frame::PubAck { flow_id, seq } => {
                let settled = self.publisher.on_ack(flow_id, seq);
                self.stats.add_acked(settled.len() as u64);
                for s in settled {
                    self.emit(SessionEvent::Acknowledgement {
                        sequence_id: s.seq,
                        tag: s.tag,
                    });
                }
                self.after_window_change();
            }
            Frame::PubReject {
                flow_id,
                seq,
                subcode,
            } => {
                if let Some(s) = self.publisher.on_reject(flow_id, seq) {
                    self.stats.add_rejected(1);
                    self.emit(SessionEvent::RejectedMessageError {
                        sequence_id: s.seq,
                        tag: s.tag,
                        subcode,
                    });
                }
                self.after_window_change();
            }
            Frame::BindAck {
                correlation,
                flow_id,
                active,
            } => self.on_bind_ack(correlation, flow_id, active),
            Frame::BindNak {
                correlation,
                subcode,
                reason,
            } => {
                if let Some(key) = self.flow_by_bind.remove(&correlation) {
                    self.disarm(TimerKind::FlowBind(key));
                    if let Some(event) = self.flows.get_mut(&key).map(|f| f.on_bind_nak(subcode, reason)) {
                        self.emit_flow(key, event);
                    }
                }
            }
            Frame::FlowState { flow_id, active } => {
                if let Some(key) = self.flow_by_id.get(&flow_id).copied() {
                    if let Some(event) = self.flows.get_mut(&key).and_then(|f| f.on_flow_state(active)) {
                        self.emit_flow(key, event);
                    }
                }
            }
            Frame::FlowDown {
                flow_id,
                subcode,
                reason,
            } => {
                if let Some(key) = self.flow_by_id.remove(&flow_id) {
                    self.disarm(TimerKind::FlowAck(key));
                    if let Some(event) = self.flows.get_mut(&key).map(|f| f.on_flow_down(subcode, reason)) {
                        self.emit_flow(key, event);
                    }
                }
            }
            Frame::Deliver {
                flow_id: 0,
                message,
                ..
            } => self.on_direct_message(message),
            Frame::Deliver {
                flow_id,
                msg_id,
                message,
            } => self.on_flow_message(flow_id, msg_id, message),
            Frame::CacheResponse {
                request_id,
                exchange,
                status,
                messages,
                continuation,
            } => {
                let step = self
                    .cache
                    .on_response(request_id, exchange, status, messages, continuation);
                for message in step.deliver {
                    self.dispatch(message);
                }
                if let Some((frame, timeout)) = step.next {
                    self.send_frame(&frame);
                    self.arm(TimerKind::CacheRequest(request_id), timeout);
                }
                if let Some(completion) = step.completion {
                    self.apply_completion(completion);
                }
            }
            other => {
                log::debug!("[session] unexpected {} from broker ignored", other.kind());
            }
        }
    }

    pub(crate) fn handle_timer(&mut self, token: TimerToken) {
        if !self.take_timer(&token) {
            return;
        }
        match token.kind {
            TimerKind::ConnectAttempt => {
                if self.state.is_connecting() {
                    self.retry_after_failure(Subcode::Timeout, "connect attempt timed out");
                }
            }
            TimerKind::RetryBackoff => {
                if self.state.is_connecting() {
                    self.try_current_host();
                }
            }
            TimerKind::Keepalive => self.on_keepalive_timer(),
            TimerKind::PubAck => {
                let frames = self.publisher.retransmit();
                self.stats.add_retransmitted(frames.len() as u64);
                self.send_frames(frames);
                if self.publisher.has_in_flight() {
                    self.arm(TimerKind::PubAck, self.config.pub_ack_time);
                }
            }
            TimerKind::FlowBind(key) => {
                let Some(flow) = self.flows.get_mut(&key) else {
                    return;
                };
                let timeout = flow.config().bind_timeout;
                match flow.on_bind_timeout() {
                    BindTimeout::Retry(frame) => {
                        self.send_frame(&frame);
                        self.arm(TimerKind::FlowBind(key), timeout);
                    }
                    BindTimeout::Failed(event) => {
                        self.flow_by_bind.retain(|_, k| *k != key);
                        self.emit_flow(key, event);
                    }
                }
            }
            TimerKind::FlowAck(key) => self.flush_flow_acks(key),
            TimerKind::CacheRequest(request_id) => {
                if let Some(completion) = self.cache.on_timeout(request_id) {
                    self.apply_completion(completion);
                }
            }
        }
    }

    fn on_keepalive_timer(&mut self) {
        if self.state != SessionState::Established {
            return;
        }
        if self.inbound_seen {
            self.keepalive_missed = 0;
        } else {
            self.keepalive_missed += 1;
            self.stats.add_keepalives_missed(1);
        }
        self.inbound_seen = false;
        if self.keepalive_missed >= self.config.keepalive_limit {
            self.link_lost(Subcode::KeepaliveFailure, "keepalive limit reached");
            return;
        }
        self.send_frame(&Frame::Keepalive);
        self.arm(TimerKind::Keepalive, self.config.keepalive_interval);
    }

    fn on_direct_message(&mut self, message: Message) {
        self.stats.add_messages_received(1);
        if message.cache_request_id().is_some() {
            self.dispatch(message);
            return;
        }
        let decision = self.cache.on_live(&message);
        if decision.deliver {
            self.dispatch(message);
        }
        for completion in decision.completed {
            self.apply_completion(completion);
        }
    }

    // ------------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------------

    /// Send one message. `Ok(Some(_))` means the caller must wait for a
    /// window slot.
    pub(crate) fn send(&mut self, mut message: Message) -> Result<Option<ParkedWait>> {
        self.ensure_alive()?;
        message.validate_for_send()?;
        let blocking = self.config.send_blocking;

        if !message.delivery_mode().is_guaranteed() {
            if self.state != SessionState::Established {
                return Err(if blocking {
                    Error::NotConnected
                } else {
                    self.stats.add_would_block(1);
                    Error::WouldBlock
                });
            }
            message.set_sequence_id(None);
            self.send_frame(&Frame::Publish {
                flow_id: 0,
                message,
            });
            self.stats.add_direct_sent(1);
            return Ok(None);
        }

        match self.state {
            SessionState::Established => {
                if !self.capabilities.load().guaranteed_publish {
                    return Err(Error::Unsupported(
                        "router does not accept guaranteed messages".into(),
                    ));
                }
            }
            SessionState::Connecting | SessionState::Reconnecting if blocking => {}
            _ if blocking => return Err(Error::NotConnected),
            _ => {
                self.publisher.note_would_block();
                self.stats.add_would_block(1);
                return Err(Error::WouldBlock);
            }
        }

        match self.publisher.enqueue(message) {
            Ok(frames) => {
                self.stats.add_guaranteed_sent(1);
                if !frames.is_empty() {
                    self.send_frames(frames);
                    if !self.is_armed(TimerKind::PubAck) {
                        self.arm(TimerKind::PubAck, self.config.pub_ack_time);
                    }
                }
                Ok(None)
            }
            Err(message) if blocking => {
                self.ctx.check_can_block()?;
                let (tx, rx) = bounded(1);
                let id = self.publisher.park(message, tx);
                Ok(Some(ParkedWait {
                    id,
                    rx,
                    timeout: self.config.blocking_write_timeout,
                }))
            }
            Err(_) => {
                self.publisher.note_would_block();
                self.stats.add_would_block(1);
                Err(Error::WouldBlock)
            }
        }
    }

    pub(crate) fn unpark(&mut self, id: u64) -> bool {
        self.publisher.unpark(id)
    }

    fn on_publisher_flow_up(&mut self, flow_id: u32, window: u8) {
        let max = self.capabilities.load().max_pub_window;
        let peer = match (window, max) {
            (0, m) => m,
            (w, 0) => w,
            (w, m) => w.min(m),
        };
        let frames = self.publisher.on_flow_up(flow_id, peer);
        let resent = frames
            .iter()
            .filter(|f| matches!(f, Frame::Publish { message, .. } if message.is_redelivered()))
            .count();
        self.stats.add_retransmitted(resent as u64);
        self.send_frames(frames);
        if self.publisher.has_in_flight() {
            self.arm(TimerKind::PubAck, self.config.pub_ack_time);
        }
        self.after_window_change();
    }

    /// Slots may have freed: admit blocked senders, report `CanSend` and
    /// keep the retransmit timer in step with what is in flight.
    fn after_window_change(&mut self) {
        let frames = self.publisher.admit_parked();
        if !frames.is_empty() {
            self.stats.add_guaranteed_sent(frames.len() as u64);
            self.send_frames(frames);
        }
        if self.publisher.take_can_send() {
            self.emit(SessionEvent::CanSend);
        }
        if self.publisher.has_in_flight() {
            self.arm(TimerKind::PubAck, self.config.pub_ack_time);
        } else {
            self.disarm(TimerKind::PubAck);
        }
    }

    pub(crate) fn unacked_sequence_ids(&self) -> Result<Vec<u64>> {
        self.ensure_alive()?;
        Ok(self.publisher.unacked_sequence_ids())
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    fn next_correlation(&mut self) -> u64 {
        let c = self.next_correlation;
        self.next_correlation += 1;
        c
    }

    fn effective_flags(&self, flags: SubscribeFlags) -> SubscribeFlags {
        if !self.config.subscribe_blocking && flags.contains(SubscribeFlags::WAIT_FOR_CONFIRM) {
            SubscribeFlags::REQUEST_CONFIRM
        } else {
            flags
        }
    }

    pub(crate) fn subscribe(
        &mut self,
        pattern: &str,
        handler: Option<&DispatchHandler>,
        context: u64,
        flags: SubscribeFlags,
    ) -> Result<Option<Receiver<Result<()>>>> {
        self.ensure_alive()?;
        topic::validate_pattern(pattern)?;
        flags.validate()?;

        if flags.contains(SubscribeFlags::LOCAL_DISPATCH_ONLY) {
            let handler = handler.ok_or_else(|| {
                Error::InvalidParameter("LOCAL_DISPATCH_ONLY needs a handler".into())
            })?;
            self.dispatch.add(pattern, handler, context)?;
            return Ok(None);
        }

        self.ensure_established()?;
        let flags = self.effective_flags(flags);
        let wait = flags.contains(SubscribeFlags::WAIT_FOR_CONFIRM);
        let notify = flags.contains(SubscribeFlags::REQUEST_CONFIRM);
        if wait {
            self.ctx.check_can_block()?;
        }
        if let Some(h) = handler {
            self.dispatch.add(pattern, h, context)?;
        }
        let local = handler.map(|h| (h.id(), context));

        if !self.subscriptions.add(pattern) {
            // Already subscribed with the broker; share an unanswered confirm.
            if let Some(confirm) = self
                .pending_confirms
                .values_mut()
                .find(|c| !c.unsubscribe && c.topic == pattern)
            {
                return Ok(confirm.join(wait, notify, local));
            }
            if notify {
                self.emit(SessionEvent::SubscriptionOk {
                    topic: pattern.to_string(),
                });
            }
            return Ok(None);
        }

        let correlation = self.next_correlation();
        self.send_frame(&Frame::Subscribe {
            correlation,
            topic: pattern.to_string(),
            confirm: wait || notify,
        });
        if !(wait || notify) {
            return Ok(None);
        }
        let mut confirm = PendingConfirm {
            topic: pattern.to_string(),
            waiters: Vec::new(),
            notify: 0,
            unsubscribe: false,
            locals: Vec::new(),
        };
        let rx = confirm.join(wait, notify, local);
        self.pending_confirms.insert(correlation, confirm);
        Ok(rx)
    }

    pub(crate) fn unsubscribe(
        &mut self,
        pattern: &str,
        handler: Option<HandlerId>,
        context: u64,
        flags: SubscribeFlags,
    ) -> Result<Option<Receiver<Result<()>>>> {
        self.ensure_alive()?;
        topic::validate_pattern(pattern)?;
        flags.validate()?;

        if flags.contains(SubscribeFlags::LOCAL_DISPATCH_ONLY) {
            let id = handler.ok_or_else(|| {
                Error::InvalidParameter("LOCAL_DISPATCH_ONLY needs a handler".into())
            })?;
            if !self.dispatch.remove(pattern, id, context) {
                return Err(Error::InvalidParameter(format!(
                    "no dispatch entry for {:?}",
                    pattern
                )));
            }
            return Ok(None);
        }

        self.ensure_established()?;
        if !self.subscriptions.contains(pattern) {
            return Err(Error::InvalidParameter(format!(
                "not subscribed to {:?}",
                pattern
            )));
        }
        let flags = self.effective_flags(flags);
        let wait = flags.contains(SubscribeFlags::WAIT_FOR_CONFIRM);
        let notify = flags.contains(SubscribeFlags::REQUEST_CONFIRM);
        if wait {
            self.ctx.check_can_block()?;
        }
        if let Some(id) = handler {
            if !self.dispatch.remove(pattern, id, context) {
                return Err(Error::InvalidParameter(format!(
                    "no dispatch entry for {:?}",
                    pattern
                )));
            }
        }

        if self.subscriptions.remove(pattern) != Some(true) {
            if notify {
                self.emit(SessionEvent::SubscriptionOk {
                    topic: pattern.to_string(),
                });
            }
            return Ok(None);
        }

        let correlation = self.next_correlation();
        self.send_frame(&Frame::Unsubscribe {
            correlation,
            topic: pattern.to_string(),
            confirm: wait || notify,
        });
        if !(wait || notify) {
            return Ok(None);
        }
        let mut confirm = PendingConfirm {
            topic: pattern.to_string(),
            waiters: Vec::new(),
            notify: 0,
            unsubscribe: true,
            locals: Vec::new(),
        };
        let rx = confirm.join(wait, notify, None);
        self.pending_confirms.insert(correlation, confirm);
        Ok(rx)
    }

    fn on_subscription_ack(&mut self, correlation: u64, topic: String, subcode: Subcode) {
        let confirm = self.pending_confirms.remove(&correlation);
        if subcode == Subcode::Ok {
            if let Some(confirm) = confirm {
                for waiter in confirm.waiters {
                    let _ = waiter.send(Ok(()));
                }
                for _ in 0..confirm.notify {
                    self.emit(SessionEvent::SubscriptionOk {
                        topic: confirm.topic.clone(),
                    });
                }
            }
            return;
        }

        // Refusals are always reported, confirmed or not.
        let topic = confirm.as_ref().map_or(topic, |c| c.topic.clone());
        let unsubscribe = confirm.as_ref().is_some_and(|c| c.unsubscribe);
        if !unsubscribe {
            self.subscriptions.remove_all(&topic);
            for (id, context) in confirm.iter().flat_map(|c| c.locals.iter()) {
                self.dispatch.remove(&topic, *id, *context);
            }
        }
        for waiter in confirm.into_iter().flat_map(|c| c.waiters) {
            let _ = waiter.send(Err(Error::rejected(subcode, format!("{:?}", topic))));
        }
        self.emit(SessionEvent::SubscriptionError { topic, subcode });
    }

    // ------------------------------------------------------------------------
    // Consumer flows
    // ------------------------------------------------------------------------

    pub(crate) fn flow(&self, key: u64) -> Result<&FlowCore> {
        self.ensure_alive()?;
        self.flows.get(&key).ok_or(Error::Destroyed)
    }

    pub(crate) fn create_flow(
        &mut self,
        config: FlowConfig,
        handler: Arc<dyn FlowMessageHandler>,
        events: Option<Arc<dyn FlowEventHandler>>,
    ) -> Result<(u64, Option<Receiver<Result<()>>>)> {
        config
            .validate()
            .map_err(|msg| Error::InvalidParameter(msg.into()))?;
        self.ensure_established()?;
        if !self.capabilities.load().guaranteed_consume {
            return Err(Error::Unsupported(
                "router does not support guaranteed consumer flows".into(),
            ));
        }
        let blocking = config.bind_blocking;
        let key = self.next_flow_key;
        self.next_flow_key += 1;

        let mut flow = FlowCore::new(key, config, handler, events);
        let rx = if blocking {
            let (tx, rx) = bounded(1);
            flow.set_bind_waiter(tx);
            Some(rx)
        } else {
            None
        };
        self.flows.insert(key, flow);
        self.bind_flow(key);
        Ok((key, rx))
    }

    fn bind_flow(&mut self, key: u64) {
        let correlation = self.next_bind_correlation;
        self.next_bind_correlation = self.next_bind_correlation.wrapping_add(1).max(1);
        let Some(flow) = self.flows.get_mut(&key) else {
            return;
        };
        let frame = flow.begin_bind(correlation);
        let timeout = flow.config().bind_timeout;
        log::debug!(
            "[flow] {} binding to {:?}",
            flow.key(),
            flow.config().endpoint.name()
        );
        self.flow_by_bind.insert(correlation, key);
        self.send_frame(&frame);
        self.arm(TimerKind::FlowBind(key), timeout);
    }

    fn on_bind_ack(&mut self, correlation: u32, flow_id: u32, active: bool) {
        let Some(key) = self.flow_by_bind.remove(&correlation) else {
            log::debug!("[flow] bind ack {} for unknown flow ignored", correlation);
            return;
        };
        self.disarm(TimerKind::FlowBind(key));
        let Some(flow) = self.flows.get_mut(&key) else {
            return;
        };
        let (events, grant) = flow.on_bind_ack(flow_id, active);
        self.flow_by_id.insert(flow_id, key);
        self.send_frame(&grant);
        for event in events {
            self.emit_flow(key, event);
        }
    }

    fn on_flow_message(&mut self, flow_id: u32, msg_id: u64, mut message: Message) {
        let Some(key) = self.flow_by_id.get(&flow_id).copied() else {
            log::debug!("[flow] message for unknown flow {} dropped", flow_id);
            return;
        };
        let Some(flow) = self.flows.get_mut(&key) else {
            return;
        };
        if !flow.on_deliver(msg_id) {
            log::debug!("[flow] {} duplicate delivery of {} ignored", flow.key(), msg_id);
            return;
        }
        message.set_flow_id(Some(flow_id));
        message.set_message_id(Some(msg_id));
        let auto_ack = if flow.is_client_ack() { None } else { Some(msg_id) };
        self.pending.push_back(Callback::FlowMessage {
            key,
            alive: Arc::clone(flow.alive()),
            handler: Arc::clone(flow.msg_handler()),
            message,
            auto_ack,
        });
        self.stats.add_flow_messages_received(1);
    }

    /// Settle `msg_id`; `auto` is the engine acking after the callback.
    pub(crate) fn flow_ack(&mut self, key: u64, msg_id: u64, auto: bool) -> Result<()> {
        self.ensure_alive()?;
        let flow = self.flows.get_mut(&key).ok_or(Error::Destroyed)?;
        if !auto && !flow.is_client_ack() {
            return Ok(());
        }
        let ack_timer = flow.config().ack_timer;
        if flow.settle(msg_id)? {
            self.flush_flow_acks(key);
        } else if !self.is_armed(TimerKind::FlowAck(key)) {
            self.arm(TimerKind::FlowAck(key), ack_timer);
        }
        Ok(())
    }

    /// Send settled ids and fresh credit for a bound flow.
    fn flush_flow_acks(&mut self, key: u64) {
        self.disarm(TimerKind::FlowAck(key));
        let Some(flow) = self.flows.get_mut(&key) else {
            return;
        };
        let (Some(flow_id), FlowState::Bound { .. }) = (flow.flow_id(), flow.state()) else {
            return;
        };
        let frame = flow.ack_frame(flow_id);
        self.send_frame(&frame);
    }

    pub(crate) fn flow_set_started(&mut self, key: u64, started: bool) -> Result<()> {
        self.ensure_alive()?;
        let flow = self.flows.get_mut(&key).ok_or(Error::Destroyed)?;
        if flow.is_started() == started {
            return Ok(());
        }
        flow.set_started(started);
        log::debug!(
            "[flow] {} {}",
            flow.key(),
            if started { "started" } else { "stopped" }
        );
        self.flush_flow_acks(key);
        Ok(())
    }

    pub(crate) fn flow_set_max_unacked(&mut self, key: u64, max: Option<u32>) -> Result<()> {
        self.ensure_alive()?;
        let flow = self.flows.get_mut(&key).ok_or(Error::Destroyed)?;
        flow.set_max_unacked(max);
        self.flush_flow_acks(key);
        Ok(())
    }

    pub(crate) fn flow_destroy(&mut self, key: u64) {
        let Some(mut flow) = self.flows.remove(&key) else {
            return;
        };
        self.disarm(TimerKind::FlowBind(key));
        self.disarm(TimerKind::FlowAck(key));
        self.flow_by_bind.retain(|_, k| *k != key);
        self.flow_by_id.retain(|_, k| *k != key);
        if let Some(unbind) = flow.close() {
            self.send_frame(&unbind);
        }
        log::debug!("[flow] {} destroyed", flow.key());
    }

    // ------------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------------

    pub(crate) fn create_cache_session(
        &mut self,
        config: CacheConfig,
        handler: Option<Arc<dyn CacheEventHandler>>,
    ) -> Result<u64> {
        self.ensure_alive()?;
        config
            .validate()
            .map_err(|msg| Error::InvalidParameter(msg.into()))?;
        Ok(self.cache.open_session(config, handler))
    }

    pub(crate) fn cache_config(&self, key: u64) -> Result<CacheConfig> {
        self.ensure_alive()?;
        self.cache.config(key).cloned().ok_or(Error::Destroyed)
    }

    pub(crate) fn cache_outstanding(&self, key: u64) -> Result<usize> {
        self.ensure_alive()?;
        if !self.cache.has_session(key) {
            return Err(Error::Destroyed);
        }
        Ok(self.cache.outstanding(key))
    }

    pub(crate) fn cache_request(
        &mut self,
        key: u64,
        request_id: u64,
        topic: &str,
        policy: LiveDataPolicy,
        flags: CacheRequestFlags,
        waiter: Option<Sender<Result<CacheOutcome>>>,
    ) -> Result<()> {
        self.ensure_alive()?;
        if !self.cache.has_session(key) {
            return Err(Error::Destroyed);
        }
        self.ensure_established()?;
        if !self.capabilities.load().cache {
            return Err(Error::Unsupported("router has no cache support".into()));
        }
        let frame = self
            .cache
            .start(key, request_id, topic, policy, flags, waiter)?;
        let timeout = self
            .cache
            .timeout_of(request_id)
            .unwrap_or(crate::config::DEFAULT_CACHE_REQUEST_TIMEOUT);

        if !flags.contains(CacheRequestFlags::NO_SUBSCRIBE) && self.subscriptions.add(topic) {
            let correlation = self.next_correlation();
            self.send_frame(&Frame::Subscribe {
                correlation,
                topic: topic.to_string(),
                confirm: false,
            });
        }
        self.send_frame(&frame);
        self.arm(TimerKind::CacheRequest(request_id), timeout);
        self.stats.add_cache_requests(1);
        Ok(())
    }

    pub(crate) fn cache_cancel(&mut self, key: u64) -> Result<()> {
        self.ensure_alive()?;
        if !self.cache.has_session(key) {
            return Err(Error::Destroyed);
        }
        for completion in self.cache.cancel(key, true) {
            self.apply_completion(completion);
        }
        Ok(())
    }

    pub(crate) fn cache_destroy(&mut self, key: u64) {
        for completion in self.cache.close_session(key) {
            self.apply_completion(completion);
        }
    }

    fn apply_completion(&mut self, completion: Completion) {
        self.disarm(TimerKind::CacheRequest(completion.request_id));
        let Completion {
            request_id,
            topic,
            outcome,
            fulfilled_by_live,
            queued,
            waiter,
            handler,
        } = completion;
        match (waiter, handler) {
            (Some(waiter), _) => {
                let _ = waiter.send(Ok(outcome));
            }
            (None, Some(handler)) => self.pending.push_back(Callback::Cache {
                handler,
                event: CacheEvent {
                    request_id,
                    topic,
                    outcome,
                    fulfilled_by_live,
                },
            }),
            (None, None) => {}
        }
        for message in queued {
            self.dispatch(message);
        }
    }

    // ------------------------------------------------------------------------
    // Destroy
    // ------------------------------------------------------------------------

    /// Tear everything down. Only cache cancellations are left to run.
    pub(crate) fn destroy(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }
        if self.link.as_ref().is_some_and(|l| l.logged_in) {
            self.send_frame(&Frame::Disconnect {
                subcode: Subcode::SessionDisconnected,
                reason: "session destroyed".into(),
            });
        }
        self.close_link();
        self.state = SessionState::Destroyed;

        self.publisher.discard();
        self.complete_waiters(&Err(Error::Cancelled));
        self.fail_confirms(&Error::Cancelled);
        for (_, mut flow) in self.flows.drain() {
            flow.close();
        }
        self.flow_by_id.clear();
        self.flow_by_bind.clear();

        self.pending.clear();
        for completion in self.cache.close_all() {
            self.apply_completion(completion);
        }
        self.timer_gens.clear();
        self.ctx.purge_timers(self.id);
        log::info!("[session] {} destroyed", self.id.as_u64());
    }
}
