// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session events and the handler trait that receives them.

use crate::error::Subcode;
use crate::message::{CorrelationTag, Message};

/// Events reported on a session's event handler.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Session established for the first time (or after `connect()` again).
    UpNotice { router_name: String },
    /// Session lost and will not reconnect.
    DownError { subcode: Subcode, reason: String },
    /// The initial connect schedule is exhausted or login was refused.
    ConnectFailedError { subcode: Subcode, reason: String },
    /// Established link lost; reconnect in progress.
    Reconnecting { reason: String },
    /// Reconnect succeeded.
    Reconnected,
    /// A publisher window slot freed after a send returned `WouldBlock`.
    CanSend,
    /// A guaranteed message was acknowledged by the broker.
    Acknowledgement {
        sequence_id: u64,
        tag: Option<CorrelationTag>,
    },
    /// A guaranteed message was refused by the broker.
    RejectedMessageError {
        sequence_id: u64,
        tag: Option<CorrelationTag>,
        subcode: Subcode,
    },
    SubscriptionOk { topic: String },
    SubscriptionError { topic: String, subcode: Subcode },
    /// Unacknowledged messages handed back when the `Disconnect` reconnect
    /// policy abandoned the session.
    UnackedMessagesReturned { messages: Vec<Message> },
}

impl SessionEvent {
    /// Reason code; `Subcode::Ok` for non-error events.
    pub fn subcode(&self) -> Subcode {
        match self {
            SessionEvent::DownError { subcode, .. }
            | SessionEvent::ConnectFailedError { subcode, .. }
            | SessionEvent::RejectedMessageError { subcode, .. }
            | SessionEvent::SubscriptionError { subcode, .. } => *subcode,
            SessionEvent::Reconnecting { .. } => Subcode::CommunicationError,
            SessionEvent::UnackedMessagesReturned { .. } => Subcode::GdReconnectFailed,
            _ => Subcode::Ok,
        }
    }
}

/// Receives session events on the driving thread.
pub trait SessionEventHandler: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionEventHandler for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_handler() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let handler: Arc<dyn SessionEventHandler> = Arc::new(move |e: &SessionEvent| {
            if matches!(e, SessionEvent::CanSend) {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        handler.on_event(&SessionEvent::CanSend);
        handler.on_event(&SessionEvent::Reconnected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_subcodes() {
        assert_eq!(SessionEvent::Reconnected.subcode(), Subcode::Ok);
        let e = SessionEvent::SubscriptionError {
            topic: "a".into(),
            subcode: Subcode::PermissionNotAllowed,
        };
        assert_eq!(e.subcode(), Subcode::PermissionNotAllowed);
    }
}
