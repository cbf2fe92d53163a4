// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic

mod common;

use brokerlink::transport::LoopbackConnection;
use brokerlink::wire::Frame;
use brokerlink::{
    Capabilities, Endpoint, Error, Flow, FlowAckMode, FlowConfig, FlowEvent, FlowState, Message,
    Session, Subcode,
};
use crossbeam::channel::{unbounded, Receiver};
use common::*;

fn deliver(flow_id: u32, msg_id: u64) -> Frame {
    Frame::Deliver {
        flow_id,
        msg_id,
        message: Message::to_topic("q/in", vec![msg_id as u8]),
    }
}

struct Bound {
    flow: Flow,
    messages: Receiver<u64>,
    events: Receiver<FlowEvent>,
}

/// Create a flow from another thread and answer its bind with `flow_id`.
fn bind(session: &Session, conn: &LoopbackConnection, config: FlowConfig, flow_id: u32) -> Bound {
    let (msg_tx, messages) = unbounded();
    let (ev_tx, events) = unbounded();
    let s = session.clone();
    let pending = spawn(move || {
        s.create_flow_with_events(
            config,
            move |_: &Flow, m: &Message| {
                let _ = msg_tx.send(m.message_id().unwrap_or_default());
            },
            move |_: &Flow, e: &FlowEvent| {
                let _ = ev_tx.send(e.clone());
            },
        )
    });
    let correlation = match recv_until(conn, |f| matches!(f, Frame::Bind { .. })) {
        Frame::Bind { correlation, .. } => correlation,
        other => panic!("unexpected {:?}", other),
    };
    conn.send(&Frame::BindAck {
        correlation,
        flow_id,
        active: true,
    });
    let flow = pending.join().unwrap().expect("bound");
    Bound {
        flow,
        messages,
        events,
    }
}

fn next_ack(conn: &LoopbackConnection) -> (Vec<u64>, u32) {
    match recv_until(conn, |f| matches!(f, Frame::FlowAck { .. })) {
        Frame::FlowAck { acked, credit, .. } => (acked, credit),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_auto_ack_flow() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));

    let config = FlowConfig::new(Endpoint::queue("q1")).with_window_size(1);
    let b = bind(&h.session, &conn, config, 9);
    assert_eq!(b.events.recv_timeout(WAIT).unwrap(), FlowEvent::UpNotice);
    assert_eq!(b.flow.state().unwrap(), FlowState::Bound { active: true });
    assert_eq!(next_ack(&conn), (vec![], 1), "initial grant");

    conn.send(&deliver(9, 100));
    assert_eq!(b.messages.recv_timeout(WAIT).unwrap(), 100);
    assert_eq!(next_ack(&conn), (vec![100], 1));
    assert!(eventually(|| h.session.stats().flow_messages_received == 1));
}

#[test]
fn test_client_ack_flow() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));

    let config = FlowConfig::new(Endpoint::queue("q2"))
        .with_window_size(1)
        .with_ack_mode(FlowAckMode::Client);
    let b = bind(&h.session, &conn, config, 4);
    next_ack(&conn);

    // A redelivery of an id still awaiting its ack is dropped.
    conn.send(&deliver(4, 7));
    conn.send(&deliver(4, 7));
    assert_eq!(b.messages.recv_timeout(WAIT).unwrap(), 7);
    assert!(b.messages.recv_timeout(QUIET).is_err());
    assert_eq!(b.flow.unacked_count().unwrap(), 1);

    assert!(matches!(b.flow.ack(8), Err(Error::InvalidParameter(_))));
    b.flow.ack(7).unwrap();
    assert_eq!(next_ack(&conn), (vec![7], 1));
    assert_eq!(b.flow.unacked_count().unwrap(), 0);
}

#[test]
fn test_stop_closes_window() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));

    let config = FlowConfig::new(Endpoint::queue("q3")).with_window_size(5);
    let b = bind(&h.session, &conn, config, 5);
    assert_eq!(next_ack(&conn), (vec![], 5));

    b.flow.stop().unwrap();
    assert_eq!(next_ack(&conn), (vec![], 0));
    b.flow.start().unwrap();
    assert_eq!(next_ack(&conn), (vec![], 5));
}

#[test]
fn test_bind_refused() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));

    let s = h.session.clone();
    let pending = spawn(move || {
        s.create_flow(FlowConfig::new(Endpoint::queue("missing")), |_: &Flow, _: &Message| {})
    });
    let correlation = match recv_until(&conn, |f| matches!(f, Frame::Bind { .. })) {
        Frame::Bind { correlation, .. } => correlation,
        other => panic!("unexpected {:?}", other),
    };
    conn.send(&Frame::BindNak {
        correlation,
        subcode: Subcode::UnknownEndpoint,
        reason: "no such queue".into(),
    });
    let err = pending.join().unwrap().unwrap_err();
    assert_eq!(err.subcode(), Subcode::UnknownEndpoint);
}

#[test]
fn test_flow_rebinds_after_reconnect() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));
    let b = bind(
        &h.session,
        &conn,
        FlowConfig::new(Endpoint::queue("q4")).with_window_size(1),
        11,
    );
    assert_eq!(b.events.recv_timeout(WAIT).unwrap(), FlowEvent::UpNotice);

    conn.close();
    assert_eq!(b.events.recv_timeout(WAIT).unwrap(), FlowEvent::SessionDown);

    let conn = accept_login(&listener, Capabilities::full("r"));
    let correlation = match recv_until(&conn, |f| matches!(f, Frame::Bind { .. })) {
        Frame::Bind { correlation, .. } => correlation,
        other => panic!("unexpected {:?}", other),
    };
    conn.send(&Frame::BindAck {
        correlation,
        flow_id: 12,
        active: true,
    });
    assert_eq!(b.events.recv_timeout(WAIT).unwrap(), FlowEvent::Reconnected);

    conn.send(&deliver(12, 1));
    assert_eq!(b.messages.recv_timeout(WAIT).unwrap(), 1);
}

#[test]
fn test_destroyed_flow_goes_quiet() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));
    let b = bind(
        &h.session,
        &conn,
        FlowConfig::new(Endpoint::queue("q5")),
        21,
    );

    b.flow.destroy();
    recv_until(&conn, |f| matches!(f, Frame::Unbind { flow_id: 21 }));
    assert!(b.flow.is_destroyed());
    assert!(matches!(b.flow.state(), Err(Error::Destroyed)));

    conn.send(&deliver(21, 1));
    assert!(b.messages.recv_timeout(QUIET).is_err());
    b.flow.destroy();
}

#[test]
fn test_flow_needs_consumer_capability() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let caps = Capabilities {
        guaranteed_consume: false,
        ..Capabilities::full("r")
    };
    let _conn = connect(&h.session, &listener, caps);
    let err = h
        .session
        .create_flow(FlowConfig::new(Endpoint::queue("q")), |_: &Flow, _: &Message| {})
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}
