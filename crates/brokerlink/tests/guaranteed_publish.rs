// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic

mod common;

use std::time::Duration;

use brokerlink::wire::Frame;
use brokerlink::{
    Capabilities, CorrelationTag, DeliveryMode, Error, Message, PublisherAckMode, SessionEvent,
    Subcode,
};
use common::*;

fn gd(topic: &str, tag: u64) -> Message {
    Message::to_topic(topic, b"payload".to_vec())
        .with_delivery_mode(DeliveryMode::Persistent)
        .with_correlation_tag(CorrelationTag(tag))
}

#[test]
fn test_window_of_three_with_cumulative_ack() {
    let h = harness(
        fast_config("broker-a")
            .with_pub_window_size(3)
            .with_send_blocking(false),
    );
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("router-a"));
    open_publisher(&conn, 7, 3);

    for tag in 1..=3 {
        h.session.send(gd("orders/new", tag)).expect("window has room");
    }
    assert!(matches!(h.session.send(gd("orders/new", 4)), Err(Error::WouldBlock)));

    let frames = take_publishes(&conn, 3);
    assert_eq!(publish_seqs(&frames), vec![1, 2, 3]);
    assert!(frames
        .iter()
        .all(|f| matches!(f, Frame::Publish { flow_id: 7, .. })));

    conn.send(&Frame::PubAck { flow_id: 7, seq: 2 });
    let first = wait_event(&h.events, |e| matches!(e, SessionEvent::Acknowledgement { .. }));
    assert_eq!(
        first,
        SessionEvent::Acknowledgement {
            sequence_id: 1,
            tag: Some(CorrelationTag(1))
        }
    );
    let second = wait_event(&h.events, |e| matches!(e, SessionEvent::Acknowledgement { .. }));
    assert_eq!(
        second,
        SessionEvent::Acknowledgement {
            sequence_id: 2,
            tag: Some(CorrelationTag(2))
        }
    );
    wait_event(&h.events, |e| *e == SessionEvent::CanSend);

    assert_eq!(h.session.unacked_sequence_ids().unwrap(), vec![3]);
    h.session.send(gd("orders/new", 5)).expect("slot freed");
    assert_eq!(publish_seqs(&take_publishes(&conn, 1)), vec![4]);

    let stats = h.session.stats();
    assert_eq!(stats.guaranteed_sent, 4);
    assert_eq!(stats.acked, 2);
    assert_eq!(stats.would_block, 1);
}

#[test]
fn test_reject_reports_message_and_frees_slot() {
    let h = harness(
        fast_config("broker-a")
            .with_pub_window_size(2)
            .with_pub_ack_mode(PublisherAckMode::PerMessage),
    );
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("router"));
    open_publisher(&conn, 1, 2);

    h.session.send(gd("t", 10)).unwrap();
    h.session.send(gd("t", 11)).unwrap();
    take_publishes(&conn, 2);

    conn.send(&Frame::PubReject {
        flow_id: 1,
        seq: 2,
        subcode: Subcode::PermissionNotAllowed,
    });
    let event = wait_event(&h.events, |e| {
        matches!(e, SessionEvent::RejectedMessageError { .. })
    });
    assert_eq!(
        event,
        SessionEvent::RejectedMessageError {
            sequence_id: 2,
            tag: Some(CorrelationTag(11)),
            subcode: Subcode::PermissionNotAllowed,
        }
    );
    assert_eq!(h.session.unacked_sequence_ids().unwrap(), vec![1]);
}

#[test]
fn test_blocking_send_waits_for_slot() {
    let h = harness(
        fast_config("broker-a")
            .with_pub_window_size(1)
            .with_blocking_write_timeout(Duration::from_millis(100)),
    );
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("router"));
    open_publisher(&conn, 1, 1);

    h.session.send(gd("t", 1)).unwrap();
    assert!(matches!(h.session.send(gd("t", 2)), Err(Error::Timeout)));

    let s = h.session.clone();
    let blocked = spawn(move || s.send(gd("t", 3)));
    std::thread::sleep(Duration::from_millis(30));
    conn.send(&Frame::PubAck { flow_id: 1, seq: 1 });
    blocked.join().unwrap().expect("admitted after ack");

    let frames = take_publishes(&conn, 2);
    let tags: Vec<_> = frames
        .iter()
        .filter_map(|f| match f {
            Frame::Publish { message, .. } => message.correlation_tag(),
            _ => None,
        })
        .collect();
    assert_eq!(tags, vec![CorrelationTag(1), CorrelationTag(3)]);
}

#[test]
fn test_unacked_messages_retransmitted_on_timer() {
    let h = harness(
        fast_config("broker-a")
            .with_pub_window_size(4)
            .with_pub_ack_time(Duration::from_millis(60)),
    );
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("router"));
    open_publisher(&conn, 3, 4);

    h.session.send(gd("t", 1)).unwrap();
    let first = take_publishes(&conn, 1);
    assert!(matches!(&first[0], Frame::Publish { message, .. } if !message.is_redelivered()));

    let again = recv_until(&conn, |f| matches!(f, Frame::Publish { .. }));
    match again {
        Frame::Publish { message, .. } => {
            assert_eq!(message.sequence_id(), Some(1));
            assert!(message.is_redelivered());
        }
        other => panic!("unexpected {:?}", other),
    }

    conn.send(&Frame::PubAck { flow_id: 3, seq: 1 });
    wait_event(&h.events, |e| matches!(e, SessionEvent::Acknowledgement { .. }));
    assert!(eventually(|| h.session.stats().retransmitted >= 1));
}

#[test]
fn test_direct_send_needs_established_session() {
    let h = harness(fast_config("broker-a").with_send_blocking(false));
    let direct = Message::to_topic("t", b"x".to_vec());
    assert!(matches!(h.session.send(direct.clone()), Err(Error::WouldBlock)));
    assert!(matches!(h.session.send(gd("t", 1)), Err(Error::WouldBlock)));
    assert_eq!(h.session.stats().would_block, 2);

    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("router"));
    h.session.send(direct).unwrap();
    let frame = recv_until(&conn, |f| matches!(f, Frame::Publish { .. }));
    assert!(matches!(frame, Frame::Publish { flow_id: 0, .. }));

    h.session.disconnect().unwrap();
    assert!(matches!(h.session.send(gd("t", 2)), Err(Error::WouldBlock)));
}

#[test]
fn test_send_multiple_reports_partial_send() {
    let h = harness(
        fast_config("broker-a")
            .with_pub_window_size(2)
            .with_send_blocking(false),
    );
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("router"));
    open_publisher(&conn, 1, 2);

    let err = h
        .session
        .send_multiple(vec![gd("t", 1), gd("t", 2), gd("t", 3)])
        .unwrap_err();
    match err {
        Error::PartialSend { sent, cause } => {
            assert_eq!(sent, 2);
            assert!(matches!(*cause, Error::WouldBlock));
        }
        other => panic!("unexpected {:?}", other),
    }
}
