// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic dispatch table.
//!
//! Entries route inbound topics to specific handlers. An entry is keyed by
//! `(pattern, handler id, context)`, so several entries may share a pattern.
//!
//! ```text
//!   topic ──> every entry whose pattern matches ──> handler(msg, context)
//!        └──> none matched ──────────────────────> session default handler
//! ```

use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::topic;

/// Receives messages on the driving thread.
///
/// `context` is the value given when the dispatch entry was added; the
/// session default handler always sees `0`.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, message: &Message, context: u64);
}

impl<F> MessageHandler for F
where
    F: Fn(&Message, u64) + Send + Sync,
{
    fn on_message(&self, message: &Message, context: u64) {
        self(message, context)
    }
}

/// Identity of a [`DispatchHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A message handler with a stable identity, used as a dispatch key.
///
/// Clones share the identity.
#[derive(Clone)]
pub struct DispatchHandler {
    id: HandlerId,
    inner: Arc<dyn MessageHandler>,
}

impl DispatchHandler {
    pub fn new<H: MessageHandler + 'static>(handler: H) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            id: HandlerId(NEXT.fetch_add(1, Ordering::Relaxed)),
            inner: Arc::new(handler),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub(crate) fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.inner
    }
}

impl fmt::Debug for DispatchHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandler").field("id", &self.id).finish()
    }
}

/// Subscribe / unsubscribe flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscribeFlags(u8);

impl SubscribeFlags {
    pub const NONE: SubscribeFlags = SubscribeFlags(0);
    /// Block until the broker confirms.
    pub const WAIT_FOR_CONFIRM: SubscribeFlags = SubscribeFlags(0x01);
    /// Report the broker's answer as a `SubscriptionOk`/`SubscriptionError` event.
    pub const REQUEST_CONFIRM: SubscribeFlags = SubscribeFlags(0x02);
    /// Only touch the local dispatch table.
    pub const LOCAL_DISPATCH_ONLY: SubscribeFlags = SubscribeFlags(0x04);

    pub fn contains(self, other: SubscribeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn validate(self) -> Result<()> {
        if self.contains(Self::LOCAL_DISPATCH_ONLY)
            && (self.contains(Self::WAIT_FOR_CONFIRM) || self.contains(Self::REQUEST_CONFIRM))
        {
            return Err(Error::ConflictingFlags(
                "LOCAL_DISPATCH_ONLY cannot ask for broker confirmation".into(),
            ));
        }
        Ok(())
    }
}

impl BitOr for SubscribeFlags {
    type Output = SubscribeFlags;

    fn bitor(self, rhs: SubscribeFlags) -> SubscribeFlags {
        SubscribeFlags(self.0 | rhs.0)
    }
}

struct DispatchEntry {
    pattern: String,
    handler: DispatchHandler,
    context: u64,
}

impl DispatchEntry {
    fn is(&self, pattern: &str, id: HandlerId, context: u64) -> bool {
        self.pattern == pattern && self.handler.id == id && self.context == context
    }
}

/// Pattern -> handler routing table.
#[derive(Default)]
pub struct DispatchTable {
    entries: Vec<DispatchEntry>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    ///
    /// # Errors
    ///
    /// `SubscriptionAlreadyPresent` when the same triple is already present;
    /// topic syntax errors for a malformed pattern.
    pub fn add(&mut self, pattern: &str, handler: &DispatchHandler, context: u64) -> Result<()> {
        topic::validate_pattern(pattern)?;
        if self.entries.iter().any(|e| e.is(pattern, handler.id, context)) {
            return Err(Error::SubscriptionAlreadyPresent(pattern.to_string()));
        }
        self.entries.push(DispatchEntry {
            pattern: pattern.to_string(),
            handler: handler.clone(),
            context,
        });
        Ok(())
    }

    /// Remove an entry; `false` when it was not present.
    pub fn remove(&mut self, pattern: &str, id: HandlerId, context: u64) -> bool {
        match self.entries.iter().position(|e| e.is(pattern, id, context)) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Every matching entry once, in insertion order.
    pub fn lookup(&self, topic: &str) -> Vec<(Arc<dyn MessageHandler>, u64)> {
        self.entries
            .iter()
            .filter(|e| topic::matches(&e.pattern, topic))
            .map(|e| (Arc::clone(e.handler.handler()), e.context))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (DispatchHandler, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let handler = DispatchHandler::new(move |_: &Message, _ctx: u64| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (handler, hits)
    }

    #[test]
    fn test_triple_uniqueness() {
        let mut table = DispatchTable::new();
        let (h, _) = counting();
        table.add("a/b", &h, 1).unwrap();
        table.add("a/b", &h, 2).unwrap();
        let (other, _) = counting();
        table.add("a/b", &other, 1).unwrap();
        assert!(matches!(
            table.add("a/b", &h, 1),
            Err(Error::SubscriptionAlreadyPresent(_))
        ));
        assert_eq!(table.len(), 3);

        assert!(table.remove("a/b", h.id(), 2));
        assert!(!table.remove("a/b", h.id(), 2));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_lookup_delivers_each_matching_entry_once() {
        let mut table = DispatchTable::new();
        let (h1, hits1) = counting();
        let (h2, hits2) = counting();
        let (h3, hits3) = counting();
        table.add("stock/>", &h1, 0).unwrap();
        table.add("stock/*/nyse", &h2, 7).unwrap();
        table.add("bond/>", &h3, 0).unwrap();

        let msg = Message::to_topic("stock/ibm/nyse", vec![]);
        let targets = table.lookup("stock/ibm/nyse");
        assert_eq!(targets.len(), 2);
        for (handler, ctx) in &targets {
            handler.on_message(&msg, *ctx);
        }
        assert_eq!(hits1.load(Ordering::SeqCst), 1);
        assert_eq!(hits2.load(Ordering::SeqCst), 1);
        assert_eq!(hits3.load(Ordering::SeqCst), 0);
        assert_eq!(targets[1].1, 7);

        assert!(table.lookup("fx/eur").is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut table = DispatchTable::new();
        let (h, _) = counting();
        assert!(table.add("a//b", &h, 0).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_flags() {
        let f = SubscribeFlags::WAIT_FOR_CONFIRM | SubscribeFlags::REQUEST_CONFIRM;
        assert!(f.contains(SubscribeFlags::WAIT_FOR_CONFIRM));
        assert!(!f.contains(SubscribeFlags::LOCAL_DISPATCH_ONLY));
        assert!(f.validate().is_ok());
        let bad = SubscribeFlags::LOCAL_DISPATCH_ONLY | SubscribeFlags::WAIT_FOR_CONFIRM;
        assert!(matches!(bad.validate(), Err(Error::ConflictingFlags(_))));
    }
}
