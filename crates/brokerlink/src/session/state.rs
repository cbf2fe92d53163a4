// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection lifecycle states.
//!
//! ```text
//!            connect()                 LoginAck
//!   Idle ─────────────> Connecting ───────────────> Established
//!     ^                   │  │                        │      │
//!     │        exhausted  │  │ disconnect()   link    │      │ disconnect()
//!     │                   v  v                lost    v      v
//!     │               Failed  Disconnected <── Reconnecting  Disconnected
//!     │                   │         │           │     ^
//!     └───── connect() ───┴─────────┘           └─────┘ LoginAck -> Established
//!
//!   destroy() from any state -> Destroyed
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, never connected.
    #[default]
    Idle,
    /// Walking the host list for the first time.
    Connecting,
    /// Logged in; traffic flows.
    Established,
    /// Established link lost; walking the host list again.
    Reconnecting,
    /// Retry schedule exhausted or login refused.
    Failed,
    /// Closed by the application or by the GD reconnect policy.
    Disconnected,
    Destroyed,
}

impl SessionState {
    /// A connect attempt is in flight.
    pub fn is_connecting(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Reconnecting)
    }

    /// `connect()` may start a new attempt from here.
    pub fn can_connect(self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Failed | SessionState::Disconnected
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Established => "established",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Failed => "failed",
            SessionState::Disconnected => "disconnected",
            SessionState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}
