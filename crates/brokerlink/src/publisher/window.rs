// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher window.
//!
//! Oldest-first sequence of guaranteed messages the broker has not settled.
//!
//! ```text
//!   front                                         back
//!   [seq 4 Acked][seq 5 InFlight][seq 6 Acked][seq 7 Pending]
//!    ^ popped at once            ^ stays until 5 settles
//! ```
//!
//! Settling marks entries; only a settled prefix ever leaves the window, so
//! removal is always contiguous from the front.

use std::collections::VecDeque;

use crate::message::{CorrelationTag, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    /// Accepted, waiting for the publisher flow to come up.
    Pending,
    /// Transmitted, waiting for an ack.
    InFlight,
    Acked,
    Rejected,
}

impl EntryState {
    fn is_settled(self) -> bool {
        matches!(self, EntryState::Acked | EntryState::Rejected)
    }
}

#[derive(Debug)]
pub(crate) struct WindowEntry {
    seq: u64,
    message: Message,
    state: EntryState,
    transmissions: u32,
}

/// A message whose fate the broker just decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settled {
    pub seq: u64,
    pub tag: Option<CorrelationTag>,
}

#[derive(Debug)]
pub(crate) struct PublishWindow {
    entries: VecDeque<WindowEntry>,
    configured: usize,
    peer_limit: usize,
}

impl PublishWindow {
    pub(crate) fn new(configured: u8) -> Self {
        let configured = usize::from(configured.max(1));
        Self {
            entries: VecDeque::with_capacity(configured),
            configured,
            peer_limit: configured,
        }
    }

    /// Apply the window granted by the peer (0 = no limit from the peer).
    pub(crate) fn set_peer_limit(&mut self, peer: u8) {
        self.peer_limit = if peer == 0 {
            self.configured
        } else {
            usize::from(peer)
        };
    }

    /// Slots usable right now.
    pub(crate) fn capacity(&self) -> usize {
        self.configured.min(self.peer_limit)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn has_room(&self) -> bool {
        self.entries.len() < self.capacity()
    }

    /// Append a message; hands it back when the window is full.
    pub(crate) fn push(&mut self, seq: u64, message: Message) -> Result<(), Message> {
        if !self.has_room() {
            return Err(message);
        }
        debug_assert!(self.entries.back().map_or(true, |e| e.seq < seq));
        self.entries.push_back(WindowEntry {
            seq,
            message,
            state: EntryState::Pending,
            transmissions: 0,
        });
        Ok(())
    }

    /// Move every pending entry to in-flight and return copies to transmit.
    /// Entries sent before are flagged redelivered.
    pub(crate) fn transmit_pending(&mut self) -> Vec<Message> {
        self.entries
            .iter_mut()
            .filter(|e| e.state == EntryState::Pending)
            .map(|e| {
                e.state = EntryState::InFlight;
                e.transmissions += 1;
                if e.transmissions > 1 {
                    e.message.set_redelivered(true);
                }
                e.message.clone()
            })
            .collect()
    }

    /// Copies of every in-flight entry, oldest first, flagged redelivered.
    pub(crate) fn retransmit(&mut self) -> Vec<Message> {
        self.entries
            .iter_mut()
            .filter(|e| e.state == EntryState::InFlight)
            .map(|e| {
                e.transmissions += 1;
                e.message.set_redelivered(true);
                e.message.clone()
            })
            .collect()
    }

    /// Link lost: everything in flight must be sent again on the next flow.
    pub(crate) fn requeue(&mut self) {
        for e in self.entries.iter_mut() {
            if e.state == EntryState::InFlight {
                e.state = EntryState::Pending;
            }
        }
    }

    pub(crate) fn has_in_flight(&self) -> bool {
        self.entries.iter().any(|e| e.state == EntryState::InFlight)
    }

    /// Windowed ack: settle `seq` and every older unsettled entry.
    pub(crate) fn ack_cumulative(&mut self, seq: u64) -> Vec<Settled> {
        let settled = self
            .entries
            .iter_mut()
            .take_while(|e| e.seq <= seq)
            .filter(|e| !e.state.is_settled())
            .map(|e| {
                e.state = EntryState::Acked;
                Settled {
                    seq: e.seq,
                    tag: e.message.correlation_tag(),
                }
            })
            .collect();
        self.pop_settled();
        settled
    }

    /// Per-message ack: settle exactly `seq`.
    pub(crate) fn ack_one(&mut self, seq: u64) -> Option<Settled> {
        self.settle(seq, EntryState::Acked)
    }

    pub(crate) fn reject(&mut self, seq: u64) -> Option<Settled> {
        self.settle(seq, EntryState::Rejected)
    }

    fn settle(&mut self, seq: u64, state: EntryState) -> Option<Settled> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.seq == seq && !e.state.is_settled())?;
        entry.state = state;
        let settled = Settled {
            seq,
            tag: entry.message.correlation_tag(),
        };
        self.pop_settled();
        Some(settled)
    }

    fn pop_settled(&mut self) -> usize {
        let mut popped = 0;
        while self.entries.front().is_some_and(|e| e.state.is_settled()) {
            self.entries.pop_front();
            popped += 1;
        }
        popped
    }

    /// Sequence ids still owned by the window, oldest first.
    pub(crate) fn unsettled_seqs(&self) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|e| !e.state.is_settled())
            .map(|e| e.seq)
            .collect()
    }

    /// Empty the window, returning unsettled messages oldest first.
    pub(crate) fn drain_unsettled(&mut self) -> Vec<Message> {
        self.entries
            .drain(..)
            .filter(|e| !e.state.is_settled())
            .map(|e| e.message)
            .collect()
    }

    #[cfg(test)]
    fn seqs(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.seq).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(i: u64) -> Message {
        Message::to_topic("t", vec![]).with_correlation_tag(CorrelationTag(i * 10))
    }

    fn filled(cap: u8, n: u64) -> PublishWindow {
        let mut w = PublishWindow::new(cap);
        for seq in 1..=n {
            w.push(seq, msg(seq)).unwrap();
        }
        w.transmit_pending();
        w
    }

    #[test]
    fn test_window_of_three_blocks_fourth_until_ack() {
        let mut w = filled(3, 3);
        assert!(!w.has_room());
        assert!(w.push(4, msg(4)).is_err());

        let settled = w.ack_cumulative(1);
        assert_eq!(
            settled,
            vec![Settled {
                seq: 1,
                tag: Some(CorrelationTag(10))
            }]
        );
        w.push(4, msg(4)).unwrap();
        assert_eq!(w.seqs(), vec![2, 3, 4]);
    }

    #[test]
    fn test_cumulative_ack_removes_exactly_le_n() {
        let mut w = filled(10, 8);
        let settled: Vec<u64> = w.ack_cumulative(5).iter().map(|s| s.seq).collect();
        assert_eq!(settled, vec![1, 2, 3, 4, 5]);
        assert_eq!(w.seqs(), vec![6, 7, 8]);
        // Duplicate ack is a no-op
        assert!(w.ack_cumulative(5).is_empty());
    }

    #[test]
    fn test_out_of_order_per_message_ack_waits_for_prefix() {
        let mut w = filled(5, 3);
        assert!(w.ack_one(2).is_some());
        assert_eq!(w.len(), 3);
        assert_eq!(w.unsettled_seqs(), vec![1, 3]);
        assert!(w.reject(1).is_some());
        assert_eq!(w.seqs(), vec![3]);
        assert!(w.ack_one(2).is_none());
    }

    #[test]
    fn test_requeue_then_resend_flags_redelivered() {
        let mut w = filled(4, 2);
        w.requeue();
        assert!(!w.has_in_flight());
        let resent = w.transmit_pending();
        assert_eq!(resent.len(), 2);
        assert!(resent.iter().all(|m| m.is_redelivered()));
        let again = w.retransmit();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn test_peer_limit_shrinks_capacity() {
        let mut w = PublishWindow::new(50);
        w.set_peer_limit(2);
        assert_eq!(w.capacity(), 2);
        w.push(1, msg(1)).unwrap();
        w.push(2, msg(2)).unwrap();
        assert!(!w.has_room());
        w.set_peer_limit(0);
        assert_eq!(w.capacity(), 50);
    }

    #[test]
    fn test_occupancy_never_exceeds_capacity_randomised() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..200 {
            let cap = rng.u8(1..=16);
            let mut w = PublishWindow::new(cap);
            let mut next_seq = 1u64;
            for _ in 0..200 {
                match rng.u8(0..4) {
                    0 | 1 => {
                        if w.push(next_seq, msg(next_seq)).is_ok() {
                            next_seq += 1;
                        }
                        w.transmit_pending();
                    }
                    2 => {
                        let n = rng.u64(0..next_seq.max(1));
                        let before = w.unsettled_seqs();
                        w.ack_cumulative(n);
                        let expect: Vec<u64> = before.into_iter().filter(|s| *s > n).collect();
                        assert_eq!(w.unsettled_seqs(), expect);
                    }
                    _ => {
                        let n = rng.u64(0..next_seq.max(1));
                        w.ack_one(n);
                    }
                }
                assert!(w.len() <= w.capacity());
            }
        }
    }
}
