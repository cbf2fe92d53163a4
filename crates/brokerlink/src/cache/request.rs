// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache request coordinator.
//!
//! Tracks every outstanding request of every cache session of one broker
//! session and decides, for each cache response, live message or timer
//! expiry, what is delivered and which request completes. Like the
//! publisher it never touches the link or the callback queue itself.

use crossbeam::channel::Sender;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use super::{CacheEventHandler, CacheOutcome, CacheRequestFlags, IncompleteReason, LiveDataPolicy};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::message::{CacheStatus, Message};
use crate::topic;
use crate::wire::{CacheResponseStatus, Frame};

struct CacheSessionEntry {
    config: CacheConfig,
    handler: Option<Arc<dyn CacheEventHandler>>,
}

struct PendingRequest {
    cache_key: u64,
    topic: String,
    policy: LiveDataPolicy,
    exchange: u32,
    /// Live messages held back by the `Queue` policy, oldest first.
    queued: Vec<Message>,
    delivered: usize,
    suspect: bool,
    waiter: Option<Sender<Result<CacheOutcome>>>,
}

/// A request that reached its terminal outcome.
pub(crate) struct Completion {
    pub request_id: u64,
    pub topic: String,
    pub outcome: CacheOutcome,
    pub fulfilled_by_live: bool,
    /// Queued live messages to deliver after the outcome.
    pub queued: Vec<Message>,
    pub waiter: Option<Sender<Result<CacheOutcome>>>,
    pub handler: Option<Arc<dyn CacheEventHandler>>,
}

/// What to do with one live message.
pub(crate) struct LiveDecision {
    /// `false` when a `Queue` request took the message.
    pub deliver: bool,
    pub completed: Vec<Completion>,
}

/// What to do with one cache response.
#[derive(Default)]
pub(crate) struct ResponseStep {
    /// Cached messages, already tagged with request id and status.
    pub deliver: Vec<Message>,
    /// Continuation exchange to send and the timer to re-arm.
    pub next: Option<(Frame, Duration)>,
    pub completion: Option<Completion>,
}

#[derive(Default)]
pub(crate) struct CacheCoordinator {
    sessions: HashMap<u64, CacheSessionEntry>,
    requests: BTreeMap<u64, PendingRequest>,
    next_key: u64,
}

impl CacheCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            next_key: 1,
            ..Self::default()
        }
    }

    pub(crate) fn open_session(
        &mut self,
        config: CacheConfig,
        handler: Option<Arc<dyn CacheEventHandler>>,
    ) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.sessions.insert(key, CacheSessionEntry { config, handler });
        key
    }

    pub(crate) fn has_session(&self, key: u64) -> bool {
        self.sessions.contains_key(&key)
    }

    pub(crate) fn config(&self, key: u64) -> Option<&CacheConfig> {
        self.sessions.get(&key).map(|s| &s.config)
    }

    pub(crate) fn outstanding(&self, key: u64) -> usize {
        self.requests.values().filter(|r| r.cache_key == key).count()
    }

    pub(crate) fn timeout_of(&self, request_id: u64) -> Option<Duration> {
        let req = self.requests.get(&request_id)?;
        self.config(req.cache_key).map(|c| c.request_reply_timeout)
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Register a request and return its first exchange.
    pub(crate) fn start(
        &mut self,
        cache_key: u64,
        request_id: u64,
        topic: &str,
        policy: LiveDataPolicy,
        flags: CacheRequestFlags,
        waiter: Option<Sender<Result<CacheOutcome>>>,
    ) -> Result<Frame> {
        let entry = self.sessions.get(&cache_key).ok_or(Error::Destroyed)?;

        topic::validate_pattern(topic)?;
        if topic::is_wildcard(topic) && policy != LiveDataPolicy::Flowthru {
            return Err(Error::InvalidTopic(format!(
                "wildcard cache request {:?} needs the Flowthru live data policy",
                topic
            )));
        }
        if flags.contains(CacheRequestFlags::NOWAIT_REPLY) && entry.handler.is_none() {
            return Err(Error::ConflictingFlags(
                "NOWAIT_REPLY needs a cache event handler".into(),
            ));
        }
        if self.requests.contains_key(&request_id) {
            return Err(Error::InvalidParameter(format!(
                "cache request id {} already in use",
                request_id
            )));
        }
        if self
            .requests
            .values()
            .any(|r| r.cache_key == cache_key && r.topic == topic)
        {
            return Err(Error::InvalidState(format!(
                "a cache request for {:?} is already in progress",
                topic
            )));
        }

        let frame = Self::request_frame(&entry.config, request_id, 1, topic, None);
        self.requests.insert(
            request_id,
            PendingRequest {
                cache_key,
                topic: topic.to_string(),
                policy,
                exchange: 1,
                queued: Vec::new(),
                delivered: 0,
                suspect: false,
                waiter,
            },
        );
        log::debug!(
            "[cache] request {} on {:?} ({:?})",
            request_id,
            topic,
            policy
        );
        Ok(frame)
    }

    fn request_frame(
        config: &CacheConfig,
        request_id: u64,
        exchange: u32,
        topic: &str,
        continuation: Option<Vec<u8>>,
    ) -> Frame {
        Frame::CacheRequest {
            request_id,
            exchange,
            cache_name: config.cache_name.clone(),
            topic: topic.to_string(),
            max_messages: config.max_messages,
            max_age_secs: u32::try_from(config.max_age.as_secs()).unwrap_or(u32::MAX),
            include_other_clusters: config.include_other_clusters,
            continuation,
        }
    }

    fn complete(
        &mut self,
        request_id: u64,
        outcome: CacheOutcome,
        fulfilled_by_live: bool,
        keep_queued: bool,
    ) -> Option<Completion> {
        let req = self.requests.remove(&request_id)?;
        let handler = self
            .sessions
            .get(&req.cache_key)
            .and_then(|s| s.handler.clone());
        log::debug!("[cache] request {} -> {:?}", request_id, outcome);
        Some(Completion {
            request_id,
            topic: req.topic,
            outcome,
            fulfilled_by_live,
            queued: if keep_queued { req.queued } else { Vec::new() },
            waiter: req.waiter,
            handler,
        })
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Race a live message against outstanding requests on its topic.
    pub(crate) fn on_live(&mut self, message: &Message) -> LiveDecision {
        let mut decision = LiveDecision {
            deliver: true,
            completed: Vec::new(),
        };
        let Some(live_topic) = message.topic() else {
            return decision;
        };

        let mut fulfilled = Vec::new();
        for (id, req) in self.requests.iter_mut() {
            if !topic::matches(&req.topic, live_topic) {
                continue;
            }
            match req.policy {
                LiveDataPolicy::Fulfill => fulfilled.push(*id),
                LiveDataPolicy::Queue => {
                    if decision.deliver {
                        req.queued.push(message.clone());
                        decision.deliver = false;
                    }
                }
                LiveDataPolicy::Flowthru => {}
            }
        }
        for id in fulfilled {
            if let Some(c) = self.complete(id, CacheOutcome::Ok, true, true) {
                decision.completed.push(c);
            }
        }
        decision
    }

    /// Apply one cache response exchange. Unknown requests and stale
    /// exchanges are ignored.
    pub(crate) fn on_response(
        &mut self,
        request_id: u64,
        exchange: u32,
        status: CacheResponseStatus,
        messages: Vec<Message>,
        continuation: Option<Vec<u8>>,
    ) -> ResponseStep {
        let mut step = ResponseStep::default();
        let Some(req) = self.requests.get_mut(&request_id) else {
            log::debug!("[cache] response for unknown request {} ignored", request_id);
            return step;
        };
        if exchange != req.exchange {
            log::debug!(
                "[cache] stale exchange {} for request {} (now {})",
                exchange,
                request_id,
                req.exchange
            );
            return step;
        }

        let cache_status = if status == CacheResponseStatus::Suspect {
            req.suspect = true;
            CacheStatus::Suspect
        } else {
            CacheStatus::Cached
        };
        req.delivered += messages.len();
        step.deliver = messages
            .into_iter()
            .map(|mut m| {
                m.set_cache_info(Some(request_id), cache_status);
                m
            })
            .collect();

        if status != CacheResponseStatus::Error {
            if let Some(token) = continuation {
                req.exchange += 1;
                let exchange = req.exchange;
                let topic = req.topic.clone();
                if let Some(config) = self.sessions.get(&req.cache_key).map(|s| &s.config) {
                    let frame =
                        Self::request_frame(config, request_id, exchange, &topic, Some(token));
                    step.next = Some((frame, config.request_reply_timeout));
                    return step;
                }
            }
        }

        let outcome = if status == CacheResponseStatus::Error {
            CacheOutcome::Incomplete(IncompleteReason::ErrorResponse)
        } else if req.suspect {
            CacheOutcome::Incomplete(IncompleteReason::SuspectData)
        } else if req.delivered == 0 {
            CacheOutcome::Incomplete(IncompleteReason::NoData)
        } else {
            CacheOutcome::Ok
        };
        step.completion = self.complete(request_id, outcome, false, true);
        step
    }

    pub(crate) fn on_timeout(&mut self, request_id: u64) -> Option<Completion> {
        self.complete(
            request_id,
            CacheOutcome::Incomplete(IncompleteReason::Timeout),
            false,
            true,
        )
    }

    // ------------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------------

    /// Cancel every request of `cache_key`. Queued live messages are handed
    /// back for delivery when `deliver_queued`.
    pub(crate) fn cancel(&mut self, cache_key: u64, deliver_queued: bool) -> Vec<Completion> {
        let ids: Vec<u64> = self
            .requests
            .iter()
            .filter(|(_, r)| r.cache_key == cache_key)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.complete(id, CacheOutcome::Cancelled, false, deliver_queued))
            .collect()
    }

    /// Cancel and forget one cache session.
    pub(crate) fn close_session(&mut self, cache_key: u64) -> Vec<Completion> {
        let completed = self.cancel(cache_key, false);
        self.sessions.remove(&cache_key);
        completed
    }

    /// Owning session destroyed: everything resolves to `Cancelled`.
    pub(crate) fn close_all(&mut self) -> Vec<Completion> {
        let keys: Vec<u64> = self.sessions.keys().copied().collect();
        let mut completed = Vec::new();
        for key in keys {
            completed.extend(self.close_session(key));
        }
        completed
    }
}
