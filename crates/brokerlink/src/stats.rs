// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-session traffic counters.
//!
//! Lock-free atomics updated by the session core, read at any time through
//! [`crate::Session::stats`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Session counters collector.
///
/// All methods use `Relaxed` atomics; a [`StatsSnapshot`] is consistent per
/// counter, not across counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    direct_sent: AtomicU64,
    guaranteed_sent: AtomicU64,
    retransmitted: AtomicU64,
    acked: AtomicU64,
    rejected: AtomicU64,
    would_block: AtomicU64,
    messages_received: AtomicU64,
    default_dispatched: AtomicU64,
    flow_messages_received: AtomicU64,
    cache_requests: AtomicU64,
    reconnects: AtomicU64,
    keepalives_missed: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub direct_sent: u64,
    pub guaranteed_sent: u64,
    pub retransmitted: u64,
    pub acked: u64,
    pub rejected: u64,
    pub would_block: u64,
    pub messages_received: u64,
    /// Direct messages no dispatch entry matched
    pub default_dispatched: u64,
    pub flow_messages_received: u64,
    pub cache_requests: u64,
    pub reconnects: u64,
    pub keepalives_missed: u64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        #[inline]
        pub(crate) fn $inc(&self, n: u64) {
            self.$field.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(add_frames_sent, frames_sent);
    counter!(add_frames_received, frames_received);
    counter!(add_direct_sent, direct_sent);
    counter!(add_guaranteed_sent, guaranteed_sent);
    counter!(add_retransmitted, retransmitted);
    counter!(add_acked, acked);
    counter!(add_rejected, rejected);
    counter!(add_would_block, would_block);
    counter!(add_messages_received, messages_received);
    counter!(add_default_dispatched, default_dispatched);
    counter!(add_flow_messages_received, flow_messages_received);
    counter!(add_cache_requests, cache_requests);
    counter!(add_reconnects, reconnects);
    counter!(add_keepalives_missed, keepalives_missed);

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            direct_sent: self.direct_sent.load(Ordering::Relaxed),
            guaranteed_sent: self.guaranteed_sent.load(Ordering::Relaxed),
            retransmitted: self.retransmitted.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            would_block: self.would_block.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            default_dispatched: self.default_dispatched.load(Ordering::Relaxed),
            flow_messages_received: self.flow_messages_received.load(Ordering::Relaxed),
            cache_requests: self.cache_requests.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            keepalives_missed: self.keepalives_missed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = SessionStats::new();
        stats.add_guaranteed_sent(3);
        stats.add_retransmitted(2);
        stats.add_acked(3);
        stats.add_acked(1);
        let snap = stats.snapshot();
        assert_eq!(snap.guaranteed_sent, 3);
        assert_eq!(snap.retransmitted, 2);
        assert_eq!(snap.acked, 4);
        assert_eq!(snap.rejected, 0);
    }
}
