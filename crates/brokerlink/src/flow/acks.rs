// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivered-but-unacked bookkeeping of one consumer flow.

use std::collections::VecDeque;

/// FIFO of delivered ids plus the settled ids not yet reported to the broker.
#[derive(Debug, Default)]
pub(crate) struct UnackedTracker {
    outstanding: VecDeque<u64>,
    settled: Vec<u64>,
}

impl UnackedTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a delivery. `false` for an id already outstanding.
    pub(crate) fn delivered(&mut self, id: u64) -> bool {
        if self.outstanding.contains(&id) {
            return false;
        }
        self.outstanding.push_back(id);
        true
    }

    /// Settle `id`. `false` when it is not outstanding.
    pub(crate) fn settle(&mut self, id: u64) -> bool {
        // Acks usually arrive oldest first
        match self.outstanding.iter().position(|x| *x == id) {
            Some(idx) => {
                self.outstanding.remove(idx);
                self.settled.push(id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub(crate) fn pending_acks(&self) -> usize {
        self.settled.len()
    }

    pub(crate) fn take_settled(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.settled)
    }

    /// Forget everything (binding lost; the broker redelivers).
    pub(crate) fn clear(&mut self) {
        self.outstanding.clear();
        self.settled.clear();
    }
}
