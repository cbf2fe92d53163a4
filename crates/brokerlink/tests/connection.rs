// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic

mod common;

use std::time::Duration;

use brokerlink::wire::Frame;
use brokerlink::{
    Capabilities, DeliveryMode, Error, GdReconnectAction, Message, SessionEvent, SessionState,
    SubscribeFlags, Subcode,
};
use common::*;

fn gd(tag: u64) -> Message {
    Message::to_topic("orders", vec![tag as u8])
        .with_delivery_mode(DeliveryMode::Persistent)
        .with_correlation_tag(brokerlink::CorrelationTag(tag))
}

#[test]
fn test_failover_to_second_host() {
    let h = harness(fast_config("broker-a,broker-b"));
    let listener_b = h.net.listen("broker-b");

    let conn = connect(&h.session, &listener_b, Capabilities::full("router-b"));
    assert_eq!(conn.host(), listener_b.host());
    assert_eq!(h.session.state(), SessionState::Established);
    let up = wait_event(&h.events, |e| matches!(e, SessionEvent::UpNotice { .. }));
    assert_eq!(
        up,
        SessionEvent::UpNotice {
            router_name: "router-b".into()
        }
    );
    assert_eq!(h.session.capabilities().router_name, "router-b");
}

#[test]
fn test_connect_fails_after_retry_schedule() {
    let h = harness(fast_config("nowhere").with_connect_retries(1));
    let err = h.session.connect().unwrap_err();
    assert!(matches!(err, Error::CommunicationError(_)), "{:?}", err);
    assert_eq!(h.session.state(), SessionState::Failed);
    wait_event(&h.events, |e| matches!(e, SessionEvent::ConnectFailedError { .. }));
}

#[test]
fn test_login_refusal_is_terminal() {
    let h = harness(fast_config("broker-a").with_connect_retries(5));
    let listener = h.net.listen("broker-a");
    let s = h.session.clone();
    let handle = spawn(move || s.connect());

    let conn = listener.accept(WAIT).unwrap();
    recv_until(&conn, |f| matches!(f, Frame::Login { .. }));
    conn.send(&Frame::LoginNak {
        subcode: Subcode::LoginFailure,
        reason: "bad password".into(),
    });

    let err = handle.join().unwrap().unwrap_err();
    assert_eq!(err.subcode(), Subcode::LoginFailure);
    assert!(listener.accept(QUIET).is_none(), "no retry after refusal");
    let event = wait_event(&h.events, |e| matches!(e, SessionEvent::ConnectFailedError { .. }));
    assert_eq!(
        event,
        SessionEvent::ConnectFailedError {
            subcode: Subcode::LoginFailure,
            reason: "bad password".into()
        }
    );
}

#[test]
fn test_non_blocking_connect_reports_up_notice() {
    let h = harness(fast_config("broker-a").with_connect_blocking(false));
    let listener = h.net.listen("broker-a");
    h.session.connect().unwrap();
    accept_login(&listener, Capabilities::full("r"));
    wait_event(&h.events, |e| matches!(e, SessionEvent::UpNotice { .. }));
    assert_eq!(h.session.state(), SessionState::Established);
}

#[test]
fn test_reconnect_same_host_replays_subscriptions() {
    let h = harness(fast_config("broker-a").with_reapply_subscriptions(true));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));
    h.session.subscribe("prices/>", SubscribeFlags::NONE).unwrap();
    recv_until(&conn, |f| matches!(f, Frame::Subscribe { .. }));

    conn.close();
    wait_event(&h.events, |e| matches!(e, SessionEvent::Reconnecting { .. }));
    let conn = accept_login(&listener, Capabilities::full("r"));
    wait_event(&h.events, |e| *e == SessionEvent::Reconnected);

    let replay = recv_until(&conn, |f| matches!(f, Frame::Subscribe { .. }));
    match replay {
        Frame::Subscribe { topic, .. } => assert_eq!(topic, "prices/>"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(h.session.stats().reconnects, 1);
}

#[test]
fn test_auto_retry_resends_window_on_new_host() {
    let h = harness(fast_config("broker-a,broker-b").with_pub_window_size(4));
    let listener_a = h.net.listen("broker-a");
    let listener_b = h.net.listen("broker-b");
    let conn_a = connect(&h.session, &listener_a, Capabilities::full("a"));
    open_publisher(&conn_a, 1, 4);

    h.session.send(gd(1)).unwrap();
    h.session.send(gd(2)).unwrap();
    take_publishes(&conn_a, 2);

    h.net.stop_listening("broker-a");
    conn_a.close();
    wait_event(&h.events, |e| matches!(e, SessionEvent::Reconnecting { .. }));

    let conn_b = accept_login(&listener_b, Capabilities::full("b"));
    wait_event(&h.events, |e| *e == SessionEvent::Reconnected);
    open_publisher(&conn_b, 2, 4);

    let resent = take_publishes(&conn_b, 2);
    assert_eq!(publish_seqs(&resent), vec![1, 2]);
    assert!(resent.iter().all(|f| matches!(
        f,
        Frame::Publish { flow_id: 2, message } if message.is_redelivered()
    )));
    assert_eq!(h.session.unacked_sequence_ids().unwrap(), vec![1, 2]);
}

#[test]
fn test_disconnect_policy_returns_unacked_messages() {
    let h = harness(
        fast_config("broker-a,broker-b")
            .with_pub_window_size(4)
            .with_gd_reconnect_action(GdReconnectAction::Disconnect),
    );
    let listener_a = h.net.listen("broker-a");
    let listener_b = h.net.listen("broker-b");
    let conn_a = connect(&h.session, &listener_a, Capabilities::full("a"));
    open_publisher(&conn_a, 1, 4);

    h.session.send(gd(1)).unwrap();
    h.session.send(gd(2)).unwrap();
    take_publishes(&conn_a, 2);

    h.net.stop_listening("broker-a");
    conn_a.close();

    let conn_b = accept_login(&listener_b, Capabilities::full("b"));
    let returned = wait_event(&h.events, |e| {
        matches!(e, SessionEvent::UnackedMessagesReturned { .. })
    });
    match returned {
        SessionEvent::UnackedMessagesReturned { messages } => {
            let tags: Vec<_> = messages.iter().filter_map(|m| m.correlation_tag()).collect();
            assert_eq!(tags.len(), 2);
        }
        other => panic!("unexpected {:?}", other),
    }
    let down = wait_event(&h.events, |e| matches!(e, SessionEvent::DownError { .. }));
    assert!(matches!(
        down,
        SessionEvent::DownError {
            subcode: Subcode::GdReconnectFailed,
            ..
        }
    ));
    recv_until(&conn_b, |f| matches!(f, Frame::Disconnect { .. }));
    assert_eq!(h.session.state(), SessionState::Disconnected);
    assert!(h.session.unacked_sequence_ids().unwrap().is_empty());
}

#[test]
fn test_keepalive_limit_drops_session() {
    let h = harness(
        fast_config("broker-a")
            .with_keepalive(Duration::from_millis(40), 2)
            .with_reconnect_retries(0),
    );
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));

    recv_until(&conn, |f| *f == Frame::Keepalive);
    let down = wait_event(&h.events, |e| matches!(e, SessionEvent::DownError { .. }));
    assert!(matches!(
        down,
        SessionEvent::DownError {
            subcode: Subcode::KeepaliveFailure,
            ..
        }
    ));
    assert_eq!(h.session.state(), SessionState::Failed);
    assert!(h.session.stats().keepalives_missed >= 2);
}

#[test]
fn test_malformed_frame_counts_as_link_loss() {
    let h = harness(fast_config("broker-a").with_reconnect_retries(0));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));

    conn.send_raw(vec![0xff, 0x00, 0x13]);
    let down = wait_event(&h.events, |e| matches!(e, SessionEvent::DownError { .. }));
    assert!(matches!(
        down,
        SessionEvent::DownError {
            subcode: Subcode::ProtocolError,
            ..
        }
    ));
}

#[test]
fn test_disconnect_then_destroy() {
    let h = harness(fast_config("broker-a"));
    let listener = h.net.listen("broker-a");
    let conn = connect(&h.session, &listener, Capabilities::full("r"));

    h.session.disconnect().unwrap();
    recv_until(&conn, |f| matches!(f, Frame::Disconnect { .. }));
    assert!(conn.is_closed_by_client());
    assert_eq!(h.session.state(), SessionState::Disconnected);
    h.session.disconnect().unwrap();

    assert_eq!(h.ctx.session_count(), 1);
    h.session.destroy();
    h.session.destroy();
    assert!(h.session.is_destroyed());
    assert_eq!(h.ctx.session_count(), 0);
    assert!(matches!(h.session.connect(), Err(Error::Destroyed)));
}
