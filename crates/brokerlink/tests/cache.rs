// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic

mod common;

use brokerlink::transport::LoopbackConnection;
use brokerlink::wire::{CacheResponseStatus, Frame};
use brokerlink::{
    CacheConfig, CacheEvent, CacheOutcome, CacheRequestFlags, CacheRequestStatus, CacheStatus,
    Capabilities, Error, IncompleteReason, LiveDataPolicy, Message, SessionEvent,
};
use crossbeam::channel::unbounded;
use common::*;

fn live(topic: &str) -> Frame {
    Frame::Deliver {
        flow_id: 0,
        msg_id: 0,
        message: Message::to_topic(topic, b"live".to_vec()),
    }
}

fn cache_request(conn: &LoopbackConnection) -> (u64, u32, Option<Vec<u8>>) {
    match recv_until(conn, |f| matches!(f, Frame::CacheRequest { .. })) {
        Frame::CacheRequest {
            request_id,
            exchange,
            continuation,
            ..
        } => (request_id, exchange, continuation),
        other => panic!("unexpected {:?}", other),
    }
}

fn response(request_id: u64, exchange: u32, messages: usize, more: bool) -> Frame {
    Frame::CacheResponse {
        request_id,
        exchange,
        status: CacheResponseStatus::Ok,
        messages: (0..messages)
            .map(|i| Message::to_topic("px/eur", vec![i as u8]))
            .collect(),
        continuation: more.then(|| b"next".to_vec()),
    }
}

#[test]
fn test_fulfill_completed_by_live_message() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));
    let cache = h
        .session
        .create_cache_session(CacheConfig::new("cluster-1"))
        .unwrap();

    let c = cache.clone();
    let pending = spawn(move || {
        c.request(1, "px/eur", LiveDataPolicy::Fulfill, CacheRequestFlags::NONE)
    });
    recv_until(&conn, |f| matches!(f, Frame::Subscribe { topic, .. } if topic == "px/eur"));
    cache_request(&conn);
    conn.send(&live("px/eur"));

    assert_eq!(
        pending.join().unwrap().unwrap(),
        CacheRequestStatus::Completed(CacheOutcome::Ok)
    );
    let (msg, _) = h.messages.recv_timeout(WAIT).unwrap();
    assert_eq!(msg.cache_status(), CacheStatus::Live);

    // The late cache answer is ignored.
    conn.send(&response(1, 1, 1, false));
    assert!(h.messages.recv_timeout(QUIET).is_err());
    assert_eq!(cache.outstanding_requests().unwrap(), 0);
}

#[test]
fn test_queue_delivers_cached_then_live() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));
    let cache = h
        .session
        .create_cache_session(CacheConfig::new("cluster-1"))
        .unwrap();

    let c = cache.clone();
    let pending = spawn(move || c.request(2, "px/eur", LiveDataPolicy::Queue, CacheRequestFlags::NONE));
    let (id, exchange, _) = cache_request(&conn);
    conn.send(&live("px/eur"));
    assert!(h.messages.recv_timeout(QUIET).is_err(), "live data held");

    conn.send(&response(id, exchange, 2, false));
    assert_eq!(
        pending.join().unwrap().unwrap(),
        CacheRequestStatus::Completed(CacheOutcome::Ok)
    );
    let statuses: Vec<CacheStatus> = (0..3)
        .map(|_| h.messages.recv_timeout(WAIT).unwrap().0.cache_status())
        .collect();
    assert_eq!(
        statuses,
        vec![CacheStatus::Cached, CacheStatus::Cached, CacheStatus::Live]
    );
}

#[test]
fn test_continuation_then_no_data() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));
    let cache = h
        .session
        .create_cache_session(CacheConfig::new("cluster-1"))
        .unwrap();

    let c = cache.clone();
    let pending = spawn(move || {
        c.request(
            3,
            "px/gbp",
            LiveDataPolicy::Flowthru,
            CacheRequestFlags::NO_SUBSCRIBE,
        )
    });
    let (id, exchange, continuation) = cache_request(&conn);
    assert_eq!((exchange, continuation), (1, None));
    conn.send(&response(id, exchange, 0, true));

    let (id, exchange, continuation) = cache_request(&conn);
    assert_eq!(exchange, 2);
    assert_eq!(continuation.as_deref(), Some(&b"next"[..]));
    conn.send(&response(id, exchange, 0, false));

    assert_eq!(
        pending.join().unwrap().unwrap(),
        CacheRequestStatus::Completed(CacheOutcome::Incomplete(IncompleteReason::NoData))
    );
}

#[test]
fn test_nowait_requests_cancelled_on_destroy() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));
    wait_event(&h.events, |e| matches!(e, SessionEvent::UpNotice { .. }));

    let (tx, rx) = unbounded();
    let cache = h
        .session
        .create_cache_session_with_handler(CacheConfig::new("cluster-1"), move |e: &CacheEvent| {
            let _ = tx.send(e.clone());
        })
        .unwrap();
    for (id, topic) in [(10, "a"), (11, "b"), (12, "c")] {
        assert_eq!(
            cache
                .request(id, topic, LiveDataPolicy::Fulfill, CacheRequestFlags::NOWAIT_REPLY)
                .unwrap(),
            CacheRequestStatus::InProgress
        );
    }
    assert_eq!(cache.outstanding_requests().unwrap(), 3);

    h.session.destroy();
    let mut ids: Vec<u64> = (0..3)
        .map(|_| {
            let event = rx.recv_timeout(WAIT).unwrap();
            assert_eq!(event.outcome, CacheOutcome::Cancelled);
            event.request_id
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![10, 11, 12]);
    assert!(matches!(cache.outstanding_requests(), Err(Error::Destroyed)));

    // Nothing else runs after the cancellations, not even late live data.
    conn.send(&live("a"));
    assert!(rx.recv_timeout(QUIET).is_err());
    assert!(h.messages.recv_timeout(QUIET).is_err());
    assert!(h.events.recv_timeout(QUIET).is_err());
}

#[test]
fn test_request_rules() {
    let h = harness(fast_config("broker-a"));
    let cache = h
        .session
        .create_cache_session(CacheConfig::new("cluster-1"))
        .unwrap();
    assert!(matches!(
        cache.request(1, "a", LiveDataPolicy::Fulfill, CacheRequestFlags::NONE),
        Err(Error::NotConnected)
    ));

    let listener = h.net.listen("broker-a");
    let _conn = connect(&h.session, &listener, Capabilities::full("r"));
    assert!(matches!(
        cache.request(1, "a/>", LiveDataPolicy::Queue, CacheRequestFlags::NOWAIT_REPLY),
        Err(Error::InvalidTopic(_))
    ));
    assert!(matches!(
        cache.request(1, "a", LiveDataPolicy::Fulfill, CacheRequestFlags::NOWAIT_REPLY),
        Err(Error::ConflictingFlags(_))
    ));
    assert!(h
        .session
        .create_cache_session(CacheConfig::new(""))
        .is_err());

    cache.destroy();
    assert!(matches!(cache.config(), Err(Error::Destroyed)));
}

#[test]
fn test_cancel_releases_queued_live_data() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));
    let cache = h
        .session
        .create_cache_session(CacheConfig::new("cluster-1"))
        .unwrap();

    let c = cache.clone();
    let pending = spawn(move || c.request(4, "px/chf", LiveDataPolicy::Queue, CacheRequestFlags::NONE));
    cache_request(&conn);
    conn.send(&live("px/chf"));
    assert!(h.messages.recv_timeout(QUIET).is_err(), "live data held");

    cache.cancel_requests().unwrap();
    assert_eq!(
        pending.join().unwrap().unwrap(),
        CacheRequestStatus::Completed(CacheOutcome::Cancelled)
    );
    let (msg, _) = h.messages.recv_timeout(WAIT).unwrap();
    assert_eq!(msg.topic(), Some("px/chf"));
    assert_eq!(cache.outstanding_requests().unwrap(), 0);
}
