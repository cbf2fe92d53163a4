// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker subscriptions remembered for reconnect replay.
//!
//! Reference-counted so independent callers sharing a pattern do not
//! unsubscribe each other. Replay order is first-subscribe order.

#[derive(Debug, Default, Clone)]
pub(crate) struct SubscriptionSet {
    entries: Vec<(String, u32)>,
}

impl SubscriptionSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Take a reference on `topic`. Returns `true` for the first reference,
    /// i.e. when the broker must be told.
    pub(crate) fn add(&mut self, topic: &str) -> bool {
        match self.entries.iter_mut().find(|(t, _)| t == topic) {
            Some((_, refs)) => {
                *refs += 1;
                false
            }
            None => {
                self.entries.push((topic.to_string(), 1));
                true
            }
        }
    }

    /// Drop one reference. `None` when not subscribed, `Some(true)` when the
    /// last reference went away.
    pub(crate) fn remove(&mut self, topic: &str) -> Option<bool> {
        let idx = self.entries.iter().position(|(t, _)| t == topic)?;
        let refs = &mut self.entries[idx].1;
        *refs -= 1;
        if *refs == 0 {
            self.entries.remove(idx);
            Some(true)
        } else {
            Some(false)
        }
    }

    /// Forget `topic` regardless of its reference count.
    pub(crate) fn remove_all(&mut self, topic: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| t != topic);
        self.entries.len() != before
    }

    pub(crate) fn contains(&self, topic: &str) -> bool {
        self.entries.iter().any(|(t, _)| t == topic)
    }

    pub(crate) fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refcounting() {
        let mut set = SubscriptionSet::new();
        assert!(set.add("a/>"));
        assert!(!set.add("a/>"));
        assert_eq!(set.remove("a/>"), Some(false));
        assert!(set.contains("a/>"));
        assert_eq!(set.remove("a/>"), Some(true));
        assert!(!set.contains("a/>"));
        assert_eq!(set.remove("a/>"), None);
    }

    #[test]
    fn test_replay_order_is_first_subscribe_order() {
        let mut set = SubscriptionSet::new();
        set.add("z");
        set.add("a");
        set.add("m");
        set.add("z");
        let order: Vec<&str> = set.topics().collect();
        assert_eq!(order, vec!["z", "a", "m"]);
        assert!(set.remove_all("z"));
        assert_eq!(set.len(), 2);
    }
}
