// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Guaranteed consumer flows.
//!
//! A [`Flow`] binds to one broker endpoint (queue or topic endpoint) and
//! receives its messages on the context's driving thread.
//!
//! ```text
//!   Unbound ──bind──> Binding ──BindAck──> Bound(Active|Inactive)
//!      ^                 │ timeout x (1 + retries) / BindNak  │
//!      └─────────────────┴──────── FlowDown / session loss ───┘
//! ```
//!
//! Acks are batched: settled ids travel back together with the credit the
//! broker may use, `min(window, budget - outstanding)` (zero while stopped).

mod acks;
pub(crate) mod core;

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::{Result, Subcode};
use crate::message::Message;
use crate::session::SessionShared;
use crate::topic;

// ============================================================================
// Endpoint
// ============================================================================

/// Broker endpoint a flow binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Queue {
        name: String,
        durable: bool,
    },
    /// Endpoint attracting messages published on `topic`.
    TopicEndpoint {
        name: String,
        durable: bool,
        topic: String,
    },
}

impl Endpoint {
    /// Durable queue `name`.
    pub fn queue(name: impl Into<String>) -> Self {
        Endpoint::Queue {
            name: name.into(),
            durable: true,
        }
    }

    /// Durable topic endpoint `name` attracting `topic`.
    pub fn topic_endpoint(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Endpoint::TopicEndpoint {
            name: name.into(),
            durable: true,
            topic: topic.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Endpoint::Queue { name, .. } | Endpoint::TopicEndpoint { name, .. } => name,
        }
    }

    pub fn is_durable(&self) -> bool {
        match self {
            Endpoint::Queue { durable, .. } | Endpoint::TopicEndpoint { durable, .. } => *durable,
        }
    }

    pub fn validate(&self) -> Result<()> {
        topic::validate_queue_name(self.name())?;
        if let Endpoint::TopicEndpoint { topic, .. } = self {
            topic::validate_pattern(topic)?;
        }
        Ok(())
    }
}

// ============================================================================
// State and events
// ============================================================================

/// Binding state of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Unbound,
    Binding,
    Bound { active: bool },
}

impl FlowState {
    pub fn is_bound(self) -> bool {
        matches!(self, FlowState::Bound { .. })
    }
}

/// Events reported on a flow's event handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// First successful bind.
    UpNotice,
    /// The broker unbound the flow.
    DownError { subcode: Subcode, reason: String },
    /// Bind refused or timed out after every retry.
    BindFailedError { subcode: Subcode, reason: String },
    /// This flow became the active consumer of its endpoint.
    Active,
    Inactive,
    /// The session lost its link; the flow rebinds after reconnect.
    SessionDown,
    /// Bound again after a session reconnect.
    Reconnected,
}

impl FlowEvent {
    pub fn subcode(&self) -> Subcode {
        match self {
            FlowEvent::DownError { subcode, .. } | FlowEvent::BindFailedError { subcode, .. } => {
                *subcode
            }
            FlowEvent::SessionDown => Subcode::CommunicationError,
            _ => Subcode::Ok,
        }
    }
}

/// Receives the messages of a flow.
pub trait FlowMessageHandler: Send + Sync {
    fn on_message(&self, flow: &Flow, message: &Message);
}

impl<F> FlowMessageHandler for F
where
    F: Fn(&Flow, &Message) + Send + Sync,
{
    fn on_message(&self, flow: &Flow, message: &Message) {
        self(flow, message)
    }
}

/// Receives the events of a flow.
pub trait FlowEventHandler: Send + Sync {
    fn on_event(&self, flow: &Flow, event: &FlowEvent);
}

impl<F> FlowEventHandler for F
where
    F: Fn(&Flow, &FlowEvent) + Send + Sync,
{
    fn on_event(&self, flow: &Flow, event: &FlowEvent) {
        self(flow, event)
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a consumer flow. Cheap to clone.
///
/// Created with [`crate::Session::create_flow`]. Every operation fails with
/// [`crate::Error::Destroyed`] once the flow or its session is destroyed.
#[derive(Clone)]
pub struct Flow {
    session: Arc<SessionShared>,
    key: u64,
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow").field("key", &self.key).finish()
    }
}

impl Flow {
    pub(crate) fn new(session: Arc<SessionShared>, key: u64) -> Self {
        Self { session, key }
    }

    /// Process-local identifier of this flow within its session.
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn state(&self) -> Result<FlowState> {
        self.session
            .with_core(|core| core.flow(self.key).map(|f| f.state()))
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        self.session
            .with_core(|core| core.flow(self.key).map(|f| f.config().endpoint.clone()))
    }

    /// Delivered messages not yet acknowledged by the application.
    pub fn unacked_count(&self) -> Result<usize> {
        self.session
            .with_core(|core| core.flow(self.key).map(|f| f.outstanding()))
    }

    /// Acknowledge a delivered message (client ack mode).
    ///
    /// A no-op in auto ack mode. In client mode an id that is not awaiting
    /// an ack is an [`crate::Error::InvalidParameter`].
    pub fn ack(&self, msg_id: u64) -> Result<()> {
        self.session
            .with_core(|core| core.flow_ack(self.key, msg_id, false))
    }

    /// Close the inbound window. Messages already in flight still arrive.
    pub fn stop(&self) -> Result<()> {
        self.session
            .with_core(|core| core.flow_set_started(self.key, false))
    }

    /// Reopen the inbound window.
    pub fn start(&self) -> Result<()> {
        self.session
            .with_core(|core| core.flow_set_started(self.key, true))
    }

    /// Change the delivered-but-unacked budget (`None` = unbounded).
    ///
    /// Only future grants are affected.
    pub fn set_max_unacked(&self, max: Option<u32>) -> Result<()> {
        self.session
            .with_core(|core| core.flow_set_max_unacked(self.key, max))
    }

    /// Unbind and release the flow. Idempotent; no callbacks follow.
    pub fn destroy(&self) {
        self.session.with_core(|core| core.flow_destroy(self.key));
    }

    pub fn is_destroyed(&self) -> bool {
        self.session.with_core(|core| {
            core.flow(self.key)
                .map(|f| !f.alive().load(Ordering::Acquire))
                .unwrap_or(true)
        })
    }
}

impl PartialEq for Flow {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.session, &other.session) && self.key == other.key
    }
}

impl Eq for Flow {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_validation() {
        assert!(Endpoint::queue("orders").validate().is_ok());
        assert!(Endpoint::queue("").validate().is_err());
        assert!(Endpoint::queue("x".repeat(201)).validate().is_err());
        assert!(Endpoint::topic_endpoint("te", "a/>").validate().is_ok());
        assert!(Endpoint::topic_endpoint("te", "a//b").validate().is_err());
    }

    #[test]
    fn test_event_subcodes() {
        assert_eq!(FlowEvent::UpNotice.subcode(), Subcode::Ok);
        assert_eq!(
            FlowEvent::BindFailedError {
                subcode: Subcode::UnknownEndpoint,
                reason: "no such queue".into()
            }
            .subcode(),
            Subcode::UnknownEndpoint
        );
    }
}
