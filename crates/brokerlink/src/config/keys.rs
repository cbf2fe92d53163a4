// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property key constants.
//!
//! Format: `<object>.<attribute>`; durations carry their unit as a suffix
//! (`_ms`, `_s`). One canonical name per setting.

/// Session (connection, publisher) keys.
pub mod session {
    // === Connection ===
    pub const HOST: &str = "session.host";
    pub const VPN_NAME: &str = "session.vpn_name";
    pub const USERNAME: &str = "session.username";
    pub const PASSWORD: &str = "session.password";
    pub const CLIENT_NAME: &str = "session.client_name";
    pub const CONNECT_TIMEOUT_MS: &str = "session.connect_timeout_ms";
    pub const CONNECT_RETRIES: &str = "session.connect_retries";
    pub const CONNECT_RETRIES_PER_HOST: &str = "session.connect_retries_per_host";
    pub const RECONNECT_RETRIES: &str = "session.reconnect_retries";
    pub const RECONNECT_RETRY_WAIT_MS: &str = "session.reconnect_retry_wait_ms";
    pub const KEEPALIVE_INTERVAL_MS: &str = "session.keepalive_interval_ms";
    pub const KEEPALIVE_LIMIT: &str = "session.keepalive_limit";
    pub const REAPPLY_SUBSCRIPTIONS: &str = "session.reapply_subscriptions";
    pub const COMPRESSION_LEVEL: &str = "session.compression_level";

    // === Blocking behaviour ===
    pub const CONNECT_BLOCKING: &str = "session.connect_blocking";
    pub const SEND_BLOCKING: &str = "session.send_blocking";
    pub const SUBSCRIBE_BLOCKING: &str = "session.subscribe_blocking";
    pub const BLOCKING_WRITE_TIMEOUT_MS: &str = "session.blocking_write_timeout_ms";

    // === Guaranteed publishing ===
    pub const PUB_WINDOW_SIZE: &str = "session.pub_window_size";
    pub const PUB_ACK_TIME_MS: &str = "session.pub_ack_time_ms";
    pub const PUB_ACK_MODE: &str = "session.pub_ack_mode";
    pub const GD_RECONNECT_FAIL_ACTION: &str = "session.gd_reconnect_fail_action";

    pub(crate) const ALL: &[&str] = &[
        HOST,
        VPN_NAME,
        USERNAME,
        PASSWORD,
        CLIENT_NAME,
        CONNECT_TIMEOUT_MS,
        CONNECT_RETRIES,
        CONNECT_RETRIES_PER_HOST,
        RECONNECT_RETRIES,
        RECONNECT_RETRY_WAIT_MS,
        KEEPALIVE_INTERVAL_MS,
        KEEPALIVE_LIMIT,
        REAPPLY_SUBSCRIPTIONS,
        COMPRESSION_LEVEL,
        CONNECT_BLOCKING,
        SEND_BLOCKING,
        SUBSCRIBE_BLOCKING,
        BLOCKING_WRITE_TIMEOUT_MS,
        PUB_WINDOW_SIZE,
        PUB_ACK_TIME_MS,
        PUB_ACK_MODE,
        GD_RECONNECT_FAIL_ACTION,
    ];
}

/// Consumer flow keys.
pub mod flow {
    // === Endpoint ===
    pub const BIND_NAME: &str = "flow.bind_name";
    pub const BIND_ENTITY: &str = "flow.bind_entity";
    pub const BIND_DURABLE: &str = "flow.bind_durable";
    pub const TOPIC: &str = "flow.topic";

    // === Bind ===
    pub const BIND_TIMEOUT_MS: &str = "flow.bind_timeout_ms";
    pub const BIND_RETRIES: &str = "flow.bind_retries";
    pub const BIND_BLOCKING: &str = "flow.bind_blocking";

    // === Delivery ===
    pub const ACK_MODE: &str = "flow.ack_mode";
    pub const WINDOW_SIZE: &str = "flow.window_size";
    pub const MAX_UNACKED_MESSAGES: &str = "flow.max_unacked_messages";
    pub const ACK_TIMER_MS: &str = "flow.ack_timer_ms";
    pub const ACK_THRESHOLD: &str = "flow.ack_threshold";
    pub const START_STATE: &str = "flow.start_state";
    pub const ACTIVE_FLOW_INDICATION: &str = "flow.active_flow_indication";

    pub(crate) const ALL: &[&str] = &[
        BIND_NAME,
        BIND_ENTITY,
        BIND_DURABLE,
        TOPIC,
        BIND_TIMEOUT_MS,
        BIND_RETRIES,
        BIND_BLOCKING,
        ACK_MODE,
        WINDOW_SIZE,
        MAX_UNACKED_MESSAGES,
        ACK_TIMER_MS,
        ACK_THRESHOLD,
        START_STATE,
        ACTIVE_FLOW_INDICATION,
    ];
}

/// Cache session keys.
pub mod cache {
    pub const NAME: &str = "cache.name";
    pub const MAX_MSGS: &str = "cache.max_msgs";
    pub const MAX_AGE_S: &str = "cache.max_age_s";
    pub const REQUEST_REPLY_TIMEOUT_MS: &str = "cache.request_reply_timeout_ms";
    pub const INCLUDE_OTHER_CLUSTERS: &str = "cache.include_other_clusters";

    pub(crate) const ALL: &[&str] = &[
        NAME,
        MAX_MSGS,
        MAX_AGE_S,
        REQUEST_REPLY_TIMEOUT_MS,
        INCLUDE_OTHER_CLUSTERS,
    ];
}

/// Enumerated values.
pub mod values {
    pub const ACK_MODE_AUTO: &str = "auto";
    pub const ACK_MODE_CLIENT: &str = "client";
    pub const PUB_ACK_WINDOWED: &str = "windowed";
    pub const PUB_ACK_PER_MESSAGE: &str = "per_message";
    pub const GD_AUTO_RETRY: &str = "auto_retry";
    pub const GD_DISCONNECT: &str = "disconnect";
    pub const ENTITY_QUEUE: &str = "queue";
    pub const ENTITY_TOPIC_ENDPOINT: &str = "topic_endpoint";
}
