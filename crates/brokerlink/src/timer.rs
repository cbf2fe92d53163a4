// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Context-wide timer queue.
//!
//! Timers are never cancelled in the heap. Each owner keeps the generation it
//! armed last per [`TimerKind`]; an expiry whose generation no longer matches
//! is stale and ignored by the owner.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::context::SessionId;

/// Which protocol timer an expiry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimerKind {
    /// Per-host connect + login attempt.
    ConnectAttempt,
    /// Wait between passes over the host list.
    RetryBackoff,
    Keepalive,
    /// Publisher retransmission timer.
    PubAck,
    /// Bind request of a consumer flow (local flow key).
    FlowBind(u64),
    /// Batched consumer acks (local flow key).
    FlowAck(u64),
    /// Cache request protocol timer (request id).
    CacheRequest(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerToken {
    pub session: SessionId,
    pub kind: TimerKind,
    pub gen: u64,
}

#[derive(Debug)]
struct TimerEntry {
    deadline: Instant,
    /// Insertion order, so equal deadlines fire FIFO.
    seq: u64,
    token: TimerToken,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

// Min-heap on (deadline, seq)
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn schedule(&mut self, deadline: Instant, token: TimerToken) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry {
            deadline,
            seq,
            token,
        });
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<TimerToken> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|e| e.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                due.push(entry.token);
            }
        }
        due
    }

    /// Drop every timer of `session`.
    pub(crate) fn purge(&mut self, session: SessionId) {
        self.heap.retain(|e| e.token.session != session);
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn token(kind: TimerKind, gen: u64) -> TimerToken {
        TimerToken {
            session: SessionId(1),
            kind,
            gen,
        }
    }

    #[test]
    fn test_pop_due_in_deadline_order() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.schedule(now + Duration::from_millis(30), token(TimerKind::PubAck, 3));
        q.schedule(now + Duration::from_millis(10), token(TimerKind::Keepalive, 1));
        q.schedule(now + Duration::from_millis(20), token(TimerKind::RetryBackoff, 2));

        assert_eq!(q.next_deadline(), Some(now + Duration::from_millis(10)));
        let due = q.pop_due(now + Duration::from_millis(25));
        let gens: Vec<u64> = due.iter().map(|t| t.gen).collect();
        assert_eq!(gens, vec![1, 2]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_equal_deadlines_fire_fifo() {
        let mut q = TimerQueue::new();
        let at = Instant::now();
        for gen in 0..5 {
            q.schedule(at, token(TimerKind::CacheRequest(gen), gen));
        }
        let gens: Vec<u64> = q.pop_due(at).iter().map(|t| t.gen).collect();
        assert_eq!(gens, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_purge_session() {
        let mut q = TimerQueue::new();
        let at = Instant::now();
        q.schedule(at, token(TimerKind::Keepalive, 1));
        q.schedule(
            at,
            TimerToken {
                session: SessionId(2),
                kind: TimerKind::Keepalive,
                gen: 1,
            },
        );
        q.purge(SessionId(1));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(at)[0].session, SessionId(2));
    }
}
