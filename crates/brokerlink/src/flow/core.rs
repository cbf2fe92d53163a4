// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer flow state machine.
//!
//! Pure state: methods return the frames to send and the events to raise;
//! the session core owns the link, the timers and the callback queue.

use crossbeam::channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::acks::UnackedTracker;
use super::{FlowEvent, FlowEventHandler, FlowMessageHandler, FlowState};
use crate::config::{FlowAckMode, FlowConfig};
use crate::error::{Error, Result, Subcode};
use crate::wire::Frame;

/// What a bind timeout leads to.
pub(crate) enum BindTimeout {
    /// Send this bind again and re-arm the timer.
    Retry(Frame),
    /// Out of retries.
    Failed(FlowEvent),
}

pub(crate) struct FlowCore {
    key: u64,
    config: FlowConfig,
    state: FlowState,
    flow_id: Option<u32>,
    bind_correlation: u32,
    bind_attempts: u32,
    bind_waiter: Option<Sender<Result<()>>>,
    started: bool,
    max_unacked: Option<u32>,
    tracker: UnackedTracker,
    /// Lost its binding with the session; bind again once it is back.
    rebinding: bool,
    ever_bound: bool,
    msg_handler: Arc<dyn FlowMessageHandler>,
    event_handler: Option<Arc<dyn FlowEventHandler>>,
    alive: Arc<AtomicBool>,
}

impl FlowCore {
    pub(crate) fn new(
        key: u64,
        config: FlowConfig,
        msg_handler: Arc<dyn FlowMessageHandler>,
        event_handler: Option<Arc<dyn FlowEventHandler>>,
    ) -> Self {
        Self {
            key,
            started: config.start_state,
            max_unacked: config.max_unacked,
            config,
            state: FlowState::Unbound,
            flow_id: None,
            bind_correlation: 0,
            bind_attempts: 0,
            bind_waiter: None,
            tracker: UnackedTracker::new(),
            rebinding: false,
            ever_bound: false,
            msg_handler,
            event_handler,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub(crate) fn key(&self) -> u64 {
        self.key
    }

    pub(crate) fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> FlowState {
        self.state
    }

    pub(crate) fn flow_id(&self) -> Option<u32> {
        self.flow_id
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    pub(crate) fn is_client_ack(&self) -> bool {
        self.config.ack_mode == FlowAckMode::Client
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.tracker.outstanding()
    }

    pub(crate) fn msg_handler(&self) -> &Arc<dyn FlowMessageHandler> {
        &self.msg_handler
    }

    pub(crate) fn event_handler(&self) -> Option<&Arc<dyn FlowEventHandler>> {
        self.event_handler.as_ref()
    }

    pub(crate) fn alive(&self) -> &Arc<AtomicBool> {
        &self.alive
    }

    pub(crate) fn set_bind_waiter(&mut self, waiter: Sender<Result<()>>) {
        self.bind_waiter = Some(waiter);
    }

    fn complete_bind(&mut self, result: Result<()>) {
        if let Some(waiter) = self.bind_waiter.take() {
            let _ = waiter.send(result);
        }
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    /// Start a bind exchange identified by `correlation`.
    pub(crate) fn begin_bind(&mut self, correlation: u32) -> Frame {
        self.state = FlowState::Binding;
        self.bind_correlation = correlation;
        self.bind_attempts = 0;
        self.bind_frame()
    }

    fn bind_frame(&self) -> Frame {
        Frame::Bind {
            correlation: self.bind_correlation,
            endpoint: self.config.endpoint.clone(),
            window: self.config.window_size,
            active_indication: self.config.active_flow_indication,
        }
    }

    /// Bind accepted. Returns the events to raise and the initial grant.
    pub(crate) fn on_bind_ack(&mut self, flow_id: u32, active: bool) -> (Vec<FlowEvent>, Frame) {
        self.state = FlowState::Bound { active };
        self.flow_id = Some(flow_id);
        self.tracker.clear();
        self.complete_bind(Ok(()));

        let mut events = vec![if self.rebinding && self.ever_bound {
            FlowEvent::Reconnected
        } else {
            FlowEvent::UpNotice
        }];
        self.rebinding = false;
        self.ever_bound = true;
        if self.config.active_flow_indication {
            events.push(if active {
                FlowEvent::Active
            } else {
                FlowEvent::Inactive
            });
        }
        log::debug!("[flow] {} bound as broker flow {}", self.key, flow_id);
        (events, self.ack_frame(flow_id))
    }

    pub(crate) fn on_bind_nak(&mut self, subcode: Subcode, reason: String) -> FlowEvent {
        self.state = FlowState::Unbound;
        self.rebinding = false;
        self.complete_bind(Err(Error::rejected(subcode, reason.clone())));
        FlowEvent::BindFailedError { subcode, reason }
    }

    pub(crate) fn on_bind_timeout(&mut self) -> BindTimeout {
        if self.state != FlowState::Binding {
            return BindTimeout::Failed(FlowEvent::BindFailedError {
                subcode: Subcode::InvalidState,
                reason: "bind timer fired outside binding".into(),
            });
        }
        if self.bind_attempts < self.config.bind_retries {
            self.bind_attempts += 1;
            log::debug!(
                "[flow] {} bind timeout, retry {}/{}",
                self.key,
                self.bind_attempts,
                self.config.bind_retries
            );
            return BindTimeout::Retry(self.bind_frame());
        }
        self.state = FlowState::Unbound;
        self.rebinding = false;
        self.complete_bind(Err(Error::Timeout));
        BindTimeout::Failed(FlowEvent::BindFailedError {
            subcode: Subcode::Timeout,
            reason: "bind timed out".into(),
        })
    }

    // ------------------------------------------------------------------------
    // Broker indications
    // ------------------------------------------------------------------------

    pub(crate) fn on_flow_state(&mut self, active: bool) -> Option<FlowEvent> {
        if let FlowState::Bound { active: was } = self.state {
            self.state = FlowState::Bound { active };
            if self.config.active_flow_indication && was != active {
                return Some(if active {
                    FlowEvent::Active
                } else {
                    FlowEvent::Inactive
                });
            }
        }
        None
    }

    /// The broker tore the flow down.
    pub(crate) fn on_flow_down(&mut self, subcode: Subcode, reason: String) -> FlowEvent {
        self.unbind();
        FlowEvent::DownError { subcode, reason }
    }

    /// The session lost its link; rebind when it comes back.
    pub(crate) fn on_session_down(&mut self) -> Option<FlowEvent> {
        match self.state {
            FlowState::Unbound => None,
            FlowState::Binding | FlowState::Bound { .. } => {
                self.unbind();
                self.rebinding = true;
                Some(FlowEvent::SessionDown)
            }
        }
    }

    /// The session gave up reconnecting; the flow will not rebind.
    pub(crate) fn on_session_failed(&mut self, subcode: Subcode, reason: &str) -> Option<FlowEvent> {
        if self.state == FlowState::Unbound && !self.rebinding {
            return None;
        }
        self.unbind();
        self.rebinding = false;
        self.complete_bind(Err(Error::NotConnected));
        Some(FlowEvent::DownError {
            subcode,
            reason: reason.to_string(),
        })
    }

    /// Session established again: rebind if this flow was bound before.
    pub(crate) fn needs_rebind(&self) -> bool {
        self.rebinding && self.state == FlowState::Unbound
    }

    fn unbind(&mut self) {
        self.state = FlowState::Unbound;
        self.flow_id = None;
        self.tracker.clear();
    }

    // ------------------------------------------------------------------------
    // Delivery and acks
    // ------------------------------------------------------------------------

    /// Record a delivered message. `false` for a duplicate id.
    pub(crate) fn on_deliver(&mut self, msg_id: u64) -> bool {
        self.tracker.delivered(msg_id)
    }

    /// Settle `msg_id`. Returns `true` when the pending acks should be
    /// flushed right away.
    pub(crate) fn settle(&mut self, msg_id: u64) -> Result<bool> {
        if !self.tracker.settle(msg_id) {
            return Err(Error::InvalidParameter(format!(
                "message id {} is not awaiting an ack on this flow",
                msg_id
            )));
        }
        Ok(self.tracker.pending_acks() >= self.config.ack_flush_count())
    }

    #[cfg(test)]
    fn has_pending_acks(&self) -> bool {
        self.tracker.pending_acks() > 0
    }

    /// Credit the broker may use: nothing while stopped, otherwise the
    /// window capped by the remaining unacked budget.
    pub(crate) fn credit(&self) -> u32 {
        if !self.started {
            return 0;
        }
        let window = u32::from(self.config.window_size);
        match self.max_unacked {
            None => window,
            Some(budget) => {
                let outstanding = u32::try_from(self.tracker.outstanding()).unwrap_or(u32::MAX);
                window.min(budget.saturating_sub(outstanding))
            }
        }
    }

    /// Flush settled ids together with the current credit.
    pub(crate) fn ack_frame(&mut self, flow_id: u32) -> Frame {
        Frame::FlowAck {
            flow_id,
            acked: self.tracker.take_settled(),
            credit: self.credit(),
        }
    }

    /// Open (`true`) or close the inbound window.
    pub(crate) fn set_started(&mut self, started: bool) {
        self.started = started;
    }

    pub(crate) fn set_max_unacked(&mut self, max: Option<u32>) {
        self.max_unacked = max;
    }

    /// Destroy: stop callbacks and release a blocked creator.
    pub(crate) fn close(&mut self) -> Option<Frame> {
        self.alive.store(false, Ordering::Release);
        self.complete_bind(Err(Error::Cancelled));
        let unbind = self.flow_id.map(|flow_id| Frame::Unbind { flow_id });
        self.unbind();
        unbind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Endpoint, Flow};
    use crate::message::Message;

    fn core(config: FlowConfig) -> FlowCore {
        let handler: Arc<dyn FlowMessageHandler> = Arc::new(|_: &Flow, _: &Message| {});
        FlowCore::new(1, config, handler, None)
    }

    fn queue() -> FlowConfig {
        FlowConfig::new(Endpoint::queue("q1"))
    }

    #[test]
    fn test_bind_retries_then_fails() {
        let mut f = core(queue().with_bind_timeout(std::time::Duration::from_secs(1), 2));
        f.begin_bind(5);
        assert!(matches!(f.on_bind_timeout(), BindTimeout::Retry(Frame::Bind { correlation: 5, .. })));
        assert!(matches!(f.on_bind_timeout(), BindTimeout::Retry(_)));
        match f.on_bind_timeout() {
            BindTimeout::Failed(FlowEvent::BindFailedError { subcode, .. }) => {
                assert_eq!(subcode, Subcode::Timeout)
            }
            _ => panic!("expected failure"),
        }
        assert_eq!(f.state(), FlowState::Unbound);
    }

    #[test]
    fn test_credit_respects_budget_and_stop() {
        let mut f = core(
            queue()
                .with_ack_mode(FlowAckMode::Client)
                .with_window_size(10)
                .with_max_unacked(Some(3)),
        );
        f.begin_bind(1);
        let (events, grant) = f.on_bind_ack(77, true);
        assert_eq!(events, vec![FlowEvent::UpNotice]);
        assert!(matches!(grant, Frame::FlowAck { flow_id: 77, credit: 3, .. }));

        f.on_deliver(1);
        f.on_deliver(2);
        assert_eq!(f.credit(), 1);

        // Lowering the budget below what is outstanding never goes negative
        f.set_max_unacked(Some(1));
        assert_eq!(f.credit(), 0);

        f.set_max_unacked(None);
        f.set_started(false);
        assert_eq!(f.credit(), 0);
        f.set_started(true);
        assert_eq!(f.credit(), 10);
    }

    #[test]
    fn test_settle_unknown_id() {
        let mut f = core(queue().with_ack_mode(FlowAckMode::Client));
        f.begin_bind(1);
        f.on_bind_ack(3, true);
        f.on_deliver(42);
        assert!(f.settle(43).is_err());
        assert!(f.settle(42).is_ok());
        assert!(f.has_pending_acks());
        match f.ack_frame(3) {
            Frame::FlowAck { acked, .. } => assert_eq!(acked, vec![42]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_flush_threshold() {
        // window 10 at 20% -> flush every 2 settled ids
        let mut f = core(
            queue()
                .with_ack_mode(FlowAckMode::Client)
                .with_window_size(10)
                .with_ack_threshold(20),
        );
        f.begin_bind(1);
        f.on_bind_ack(3, true);
        f.on_deliver(1);
        f.on_deliver(2);
        assert!(!f.settle(1).unwrap());
        assert!(f.settle(2).unwrap());
    }

    #[test]
    fn test_session_down_then_rebind_reports_reconnected() {
        let mut f = core(queue().with_active_flow_indication(true));
        f.begin_bind(1);
        f.on_bind_ack(3, false);
        f.on_deliver(9);
        assert_eq!(f.on_session_down(), Some(FlowEvent::SessionDown));
        assert!(f.needs_rebind());
        assert_eq!(f.outstanding(), 0);

        f.begin_bind(2);
        let (events, _) = f.on_bind_ack(4, true);
        assert_eq!(events, vec![FlowEvent::Reconnected, FlowEvent::Active]);
        assert_eq!(f.on_flow_state(false), Some(FlowEvent::Inactive));
        assert_eq!(f.on_flow_state(false), None);
    }

    #[test]
    fn test_close_emits_unbind() {
        let mut f = core(queue());
        f.begin_bind(1);
        f.on_bind_ack(8, true);
        assert_eq!(f.close(), Some(Frame::Unbind { flow_id: 8 }));
        assert!(!f.alive().load(Ordering::Acquire));
    }
}
