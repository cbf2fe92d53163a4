// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sequence ids for guaranteed messages.
//!
//! Per-session, monotonic, starting at 1. Ids are never reused, not even
//! across reconnects: a resent message keeps the id it was given at send
//! time.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct SeqNumGenerator {
    next: AtomicU64,
}

impl SeqNumGenerator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    #[inline]
    pub(crate) fn next(&self) -> u64 {
        // fetch_add returns the old value, which is the id to hand out
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to `next()` will return.
    #[inline]
    pub(crate) fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for SeqNumGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_one_and_increases() {
        let gen = SeqNumGenerator::new();
        assert_eq!(gen.peek(), 1);
        assert_eq!(gen.next(), 1);
        assert_eq!(gen.next(), 2);
        assert_eq!(gen.peek(), 3);
    }
}
