// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loading session, flow and cache settings from one YAML file.

#![cfg(feature = "property-loaders")]
#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic

mod common;

use std::io::Write;
use std::time::Duration;

use brokerlink::{
    CacheConfig, Capabilities, Endpoint, Error, FlowAckMode, FlowConfig, GdReconnectAction,
    Properties, SessionConfig, SessionState,
};
use common::*;

const DOCUMENT: &str = r"
properties:
  session.host: broker-a,broker-b
  session.vpn_name: trading
  session.username: desk-7
  session.password: s3cret
  session.connect_timeout_ms: 500
  session.reconnect_retry_wait_ms: 20
  session.keepalive_interval_ms: 0
  session.keepalive_limit: 0
  session.pub_window_size: 12
  session.gd_reconnect_fail_action: disconnect
  flow.bind_name: orders.in
  flow.ack_mode: client
  flow.max_unacked_messages: -1
  cache.name: cluster-1
  cache.request_reply_timeout_ms: 4000
";

fn write_yaml(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write yaml");
    file
}

#[test]
fn test_one_file_configures_every_object() {
    let file = write_yaml(DOCUMENT);
    let props = Properties::from_yaml_file(file.path()).unwrap();

    let session = SessionConfig::from_properties(&props).unwrap();
    assert_eq!(session.host, "broker-a,broker-b");
    assert_eq!(session.vpn_name, "trading");
    assert_eq!(session.pub_window_size, 12);
    assert_eq!(session.connect_timeout, Duration::from_millis(500));
    assert_eq!(session.gd_reconnect_action, GdReconnectAction::Disconnect);

    let flow = FlowConfig::from_properties(&props).unwrap();
    assert_eq!(flow.endpoint, Endpoint::queue("orders.in"));
    assert_eq!(flow.ack_mode, FlowAckMode::Client);
    assert_eq!(flow.max_unacked, None);

    let cache = CacheConfig::from_properties(&props).unwrap();
    assert_eq!(cache.cache_name, "cluster-1");
    assert_eq!(cache.request_reply_timeout, Duration::from_millis(4000));
}

#[test]
fn test_loaded_config_drives_a_session() {
    let file = write_yaml(DOCUMENT);
    let props = Properties::from_yaml_file(file.path()).unwrap();
    let h = harness(SessionConfig::from_properties(&props).unwrap());

    let listener = h.net.listen("broker-a");
    connect(&h.session, &listener, Capabilities::full("router"));
    assert_eq!(h.session.state(), SessionState::Established);
}

#[test]
fn test_unknown_key_is_rejected() {
    let file = write_yaml("properties:\n  session.hots: broker-a\n");
    assert!(matches!(
        Properties::from_yaml_file(file.path()),
        Err(Error::UnknownProperty(_))
    ));
}

#[test]
fn test_bad_values_are_rejected() {
    let file = write_yaml("properties:\n  session.host: a\n  session.pub_window_size: 0\n");
    let props = Properties::from_yaml_file(file.path()).unwrap();
    assert!(matches!(
        SessionConfig::from_properties(&props),
        Err(Error::InvalidParameter(_))
    ));

    let file = write_yaml("properties:\n  flow.bind_name: q\n  flow.ack_mode: sometimes\n");
    let props = Properties::from_yaml_file(file.path()).unwrap();
    assert!(FlowConfig::from_properties(&props).is_err());

    assert!(Properties::from_yaml_file("/nonexistent/brokerlink.yaml").is_err());
}
