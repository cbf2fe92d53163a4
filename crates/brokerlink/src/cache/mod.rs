// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache retrieval.
//!
//! A [`CacheSession`] asks a cache cluster for the last messages published
//! on a topic, racing the answer against live traffic on the same topic:
//!
//! ```text
//!   Fulfill   first of { cache response, live message } completes
//!   Queue     live messages held, delivered after the cached ones
//!   Flowthru  live messages delivered as they come (wildcards allowed)
//! ```
//!
//! Each exchange is bounded by the request reply timer (>= 3 s); a response
//! announcing more data starts another exchange. Every request ends with
//! exactly one [`CacheOutcome`].

pub(crate) mod request;

use crossbeam::channel::bounded;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use crate::config::CacheConfig;
use crate::error::{Error, Result, Subcode};
use crate::session::SessionShared;

// ============================================================================
// Types
// ============================================================================

/// How live messages interact with an outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiveDataPolicy {
    #[default]
    Fulfill,
    Queue,
    Flowthru,
}

/// Request flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheRequestFlags(u8);

impl CacheRequestFlags {
    pub const NONE: CacheRequestFlags = CacheRequestFlags(0);
    /// Return at once; the outcome arrives as a [`CacheEvent`].
    pub const NOWAIT_REPLY: CacheRequestFlags = CacheRequestFlags(0x01);
    /// Do not add a broker subscription for live data on the topic.
    pub const NO_SUBSCRIBE: CacheRequestFlags = CacheRequestFlags(0x02);

    pub fn contains(self, other: CacheRequestFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CacheRequestFlags {
    type Output = CacheRequestFlags;

    fn bitor(self, rhs: CacheRequestFlags) -> CacheRequestFlags {
        CacheRequestFlags(self.0 | rhs.0)
    }
}

/// Why a request ended without complete data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteReason {
    NoData,
    SuspectData,
    Timeout,
    ErrorResponse,
}

/// Terminal outcome of a cache request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Ok,
    Incomplete(IncompleteReason),
    Cancelled,
}

impl CacheOutcome {
    pub fn subcode(self) -> Subcode {
        match self {
            CacheOutcome::Ok => Subcode::Ok,
            CacheOutcome::Incomplete(IncompleteReason::NoData) => Subcode::CacheNoData,
            CacheOutcome::Incomplete(IncompleteReason::SuspectData) => Subcode::CacheSuspectData,
            CacheOutcome::Incomplete(IncompleteReason::Timeout) => Subcode::CacheTimeout,
            CacheOutcome::Incomplete(IncompleteReason::ErrorResponse) => {
                Subcode::CacheErrorResponse
            }
            CacheOutcome::Cancelled => Subcode::CacheRequestCancelled,
        }
    }
}

/// Result of [`CacheSession::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRequestStatus {
    /// Blocking request finished with this outcome.
    Completed(CacheOutcome),
    /// `NOWAIT_REPLY`: a [`CacheEvent`] follows.
    InProgress,
}

/// Completion notice for a `NOWAIT_REPLY` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub request_id: u64,
    pub topic: String,
    pub outcome: CacheOutcome,
    /// The request was completed by a live message (`Fulfill`).
    pub fulfilled_by_live: bool,
}

/// Receives cache request completions on the driving thread.
pub trait CacheEventHandler: Send + Sync {
    fn on_event(&self, event: &CacheEvent);
}

impl<F> CacheEventHandler for F
where
    F: Fn(&CacheEvent) + Send + Sync,
{
    fn on_event(&self, event: &CacheEvent) {
        self(event)
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a cache session. Cheap to clone.
///
/// Created with [`crate::Session::create_cache_session`].
#[derive(Clone)]
pub struct CacheSession {
    session: Arc<SessionShared>,
    key: u64,
}

impl fmt::Debug for CacheSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSession").field("key", &self.key).finish()
    }
}

impl CacheSession {
    pub(crate) fn new(session: Arc<SessionShared>, key: u64) -> Self {
        Self { session, key }
    }

    pub fn config(&self) -> Result<CacheConfig> {
        self.session.with_core(|core| core.cache_config(self.key))
    }

    /// Requests not yet completed.
    pub fn outstanding_requests(&self) -> Result<usize> {
        self.session
            .with_core(|core| core.cache_outstanding(self.key))
    }

    /// Ask the cache for `topic`.
    ///
    /// Without [`CacheRequestFlags::NOWAIT_REPLY`] the call blocks until
    /// the request completes and returns its outcome, `Cancelled`
    /// included. Blocking from a callback fails with
    /// [`Error::BlockedInCallback`].
    pub fn request(
        &self,
        request_id: u64,
        topic: &str,
        policy: LiveDataPolicy,
        flags: CacheRequestFlags,
    ) -> Result<CacheRequestStatus> {
        if flags.contains(CacheRequestFlags::NOWAIT_REPLY) {
            self.session.with_core(|core| {
                core.cache_request(self.key, request_id, topic, policy, flags, None)
            })?;
            return Ok(CacheRequestStatus::InProgress);
        }

        self.session.context().check_can_block()?;
        let (tx, rx) = bounded(1);
        self.session.with_core(|core| {
            core.cache_request(self.key, request_id, topic, policy, flags, Some(tx))
        })?;
        match rx.recv() {
            Ok(outcome) => outcome.map(CacheRequestStatus::Completed),
            Err(_) => Err(Error::Cancelled),
        }
    }

    /// Complete every outstanding request with `Cancelled`. Live messages
    /// queued by those requests are delivered.
    pub fn cancel_requests(&self) -> Result<()> {
        self.session
            .with_core(|core| core.cache_cancel(self.key))
    }

    /// Cancel outstanding requests, discarding queued live messages, and
    /// release the cache session. Idempotent.
    pub fn destroy(&self) {
        self.session.with_core(|core| core.cache_destroy(self.key));
    }
}
