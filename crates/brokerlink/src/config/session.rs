// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session configuration.
//!
//! # Example
//!
//! ```
//! use brokerlink::config::{GdReconnectAction, SessionConfig};
//! use std::time::Duration;
//!
//! let config = SessionConfig::new("tcp://primary:55555,tcp://backup:55555")
//!     .with_pub_window_size(10)
//!     .with_reconnect_retries(-1)
//!     .with_gd_reconnect_action(GdReconnectAction::Disconnect);
//! assert!(config.validate().is_ok());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::keys::{self, values};
use super::{
    Properties, DEFAULT_BLOCKING_WRITE_TIMEOUT, DEFAULT_PUB_ACK_TIME, DEFAULT_PUB_WINDOW_SIZE,
};
use crate::error::{Error, Result};
use crate::session::HostList;

/// How broker acks for guaranteed messages are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublisherAckMode {
    /// An ack for id N settles N and every older entry.
    #[default]
    Windowed,
    /// Each ack settles exactly one entry.
    PerMessage,
}

/// What to do with the unacked publisher window when a reconnect lands on a
/// different host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GdReconnectAction {
    /// Resend the whole unacked window to the new peer (duplicates possible).
    #[default]
    AutoRetry,
    /// Abandon the session and hand the unacked messages back.
    Disconnect,
}

/// Session (connection + publisher) configuration.
#[derive(Clone)]
pub struct SessionConfig {
    // === Connection ===
    /// Comma separated host list, 1..=16 entries (`[tcp://]host[:port]`)
    pub host: String,
    pub vpn_name: String,
    pub username: String,
    pub password: String,
    /// Client name announced at login (generated when empty)
    pub client_name: String,
    /// Per-host attempt timeout (transport up + login)
    pub connect_timeout: Duration,
    /// Extra passes over the host list for the initial connect (-1 = unlimited)
    pub connect_retries: i32,
    /// Extra attempts on each host before moving to the next
    pub connect_retries_per_host: u32,
    /// Passes over the host list after an established session is lost (-1 = unlimited)
    pub reconnect_retries: i32,
    /// Backoff between passes
    pub reconnect_retry_wait: Duration,
    /// Keepalive period (zero disables keepalives)
    pub keepalive_interval: Duration,
    /// Consecutive silent intervals tolerated before the link is declared lost
    pub keepalive_limit: u32,
    /// Replay the subscription set after reconnect
    pub reapply_subscriptions: bool,
    /// Deflate level for frame bodies (0 = off, 1..=9)
    pub compression_level: u32,

    // === Blocking ===
    pub connect_blocking: bool,
    pub send_blocking: bool,
    pub subscribe_blocking: bool,
    pub blocking_write_timeout: Duration,

    // === Guaranteed publishing ===
    pub pub_window_size: u8,
    pub pub_ack_time: Duration,
    pub pub_ack_mode: PublisherAckMode,
    pub gd_reconnect_action: GdReconnectAction,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("vpn_name", &self.vpn_name)
            .field("username", &self.username)
            .field("client_name", &self.client_name)
            .field("connect_timeout", &self.connect_timeout)
            .field("connect_retries", &self.connect_retries)
            .field("reconnect_retries", &self.reconnect_retries)
            .field("pub_window_size", &self.pub_window_size)
            .field("gd_reconnect_action", &self.gd_reconnect_action)
            .finish_non_exhaustive()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "tcp://localhost:55555".into(),
            vpn_name: "default".into(),
            username: String::new(),
            password: String::new(),
            client_name: String::new(),
            connect_timeout: Duration::from_secs(30),
            connect_retries: 0,
            connect_retries_per_host: 0,
            reconnect_retries: 3,
            reconnect_retry_wait: Duration::from_secs(3),
            keepalive_interval: Duration::from_secs(3),
            keepalive_limit: 3,
            reapply_subscriptions: false,
            compression_level: 0,
            connect_blocking: true,
            send_blocking: true,
            subscribe_blocking: true,
            blocking_write_timeout: DEFAULT_BLOCKING_WRITE_TIMEOUT,
            pub_window_size: DEFAULT_PUB_WINDOW_SIZE,
            pub_ack_time: DEFAULT_PUB_ACK_TIME,
            pub_ack_mode: PublisherAckMode::Windowed,
            gd_reconnect_action: GdReconnectAction::AutoRetry,
        }
    }
}

impl SessionConfig {
    /// Defaults with the given host list.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_vpn(mut self, vpn: impl Into<String>) -> Self {
        self.vpn_name = vpn.into();
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_connect_retries(mut self, retries: i32) -> Self {
        self.connect_retries = retries;
        self
    }

    pub fn with_connect_retries_per_host(mut self, retries: u32) -> Self {
        self.connect_retries_per_host = retries;
        self
    }

    pub fn with_reconnect_retries(mut self, retries: i32) -> Self {
        self.reconnect_retries = retries;
        self
    }

    pub fn with_reconnect_retry_wait(mut self, wait: Duration) -> Self {
        self.reconnect_retry_wait = wait;
        self
    }

    pub fn with_keepalive(mut self, interval: Duration, limit: u32) -> Self {
        self.keepalive_interval = interval;
        self.keepalive_limit = limit;
        self
    }

    pub fn with_reapply_subscriptions(mut self, reapply: bool) -> Self {
        self.reapply_subscriptions = reapply;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_connect_blocking(mut self, blocking: bool) -> Self {
        self.connect_blocking = blocking;
        self
    }

    pub fn with_send_blocking(mut self, blocking: bool) -> Self {
        self.send_blocking = blocking;
        self
    }

    pub fn with_subscribe_blocking(mut self, blocking: bool) -> Self {
        self.subscribe_blocking = blocking;
        self
    }

    pub fn with_blocking_write_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_write_timeout = timeout;
        self
    }

    pub fn with_pub_window_size(mut self, size: u8) -> Self {
        self.pub_window_size = size;
        self
    }

    pub fn with_pub_ack_time(mut self, time: Duration) -> Self {
        self.pub_ack_time = time;
        self
    }

    pub fn with_pub_ack_mode(mut self, mode: PublisherAckMode) -> Self {
        self.pub_ack_mode = mode;
        self
    }

    pub fn with_gd_reconnect_action(mut self, action: GdReconnectAction) -> Self {
        self.gd_reconnect_action = action;
        self
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` with a description if any setting is out of range.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if HostList::parse(&self.host).is_err() {
            return Err("host must list 1..=16 valid entries");
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0");
        }
        if self.connect_retries < -1 {
            return Err("connect_retries must be >= -1");
        }
        if self.reconnect_retries < -1 {
            return Err("reconnect_retries must be >= -1");
        }
        if self.keepalive_interval > Duration::ZERO && self.keepalive_limit == 0 {
            return Err("keepalive_limit must be > 0 when keepalives are enabled");
        }
        if self.compression_level > 9 {
            return Err("compression_level must be 0..=9");
        }
        if self.blocking_write_timeout.is_zero() {
            return Err("blocking_write_timeout must be > 0");
        }
        if self.pub_window_size == 0 {
            return Err("pub_window_size must be 1..=255");
        }
        if self.pub_ack_time.is_zero() {
            return Err("pub_ack_time must be > 0");
        }
        Ok(())
    }

    /// Client name, generating a process-unique one when unset.
    pub(crate) fn effective_client_name(&self) -> String {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        if self.client_name.is_empty() {
            format!(
                "brokerlink/{}/{}",
                std::process::id(),
                NEXT.fetch_add(1, Ordering::Relaxed)
            )
        } else {
            self.client_name.clone()
        }
    }

    /// Parse `session.*` keys; other namespaces are ignored.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        use keys::session as k;
        props.check_namespace("session.", k::ALL)?;

        let mut c = Self::default();
        if let Some(v) = props.string(k::HOST) {
            c.host = v;
        }
        if let Some(v) = props.string(k::VPN_NAME) {
            c.vpn_name = v;
        }
        if let Some(v) = props.string(k::USERNAME) {
            c.username = v;
        }
        if let Some(v) = props.get(k::PASSWORD) {
            c.password = v.to_string();
        }
        if let Some(v) = props.string(k::CLIENT_NAME) {
            c.client_name = v;
        }
        if let Some(v) = props.millis(k::CONNECT_TIMEOUT_MS)? {
            c.connect_timeout = v;
        }
        if let Some(v) = props.parse(k::CONNECT_RETRIES)? {
            c.connect_retries = v;
        }
        if let Some(v) = props.parse(k::CONNECT_RETRIES_PER_HOST)? {
            c.connect_retries_per_host = v;
        }
        if let Some(v) = props.parse(k::RECONNECT_RETRIES)? {
            c.reconnect_retries = v;
        }
        if let Some(v) = props.millis(k::RECONNECT_RETRY_WAIT_MS)? {
            c.reconnect_retry_wait = v;
        }
        if let Some(v) = props.millis(k::KEEPALIVE_INTERVAL_MS)? {
            c.keepalive_interval = v;
        }
        if let Some(v) = props.parse(k::KEEPALIVE_LIMIT)? {
            c.keepalive_limit = v;
        }
        if let Some(v) = props.bool(k::REAPPLY_SUBSCRIPTIONS)? {
            c.reapply_subscriptions = v;
        }
        if let Some(v) = props.parse(k::COMPRESSION_LEVEL)? {
            c.compression_level = v;
        }
        if let Some(v) = props.bool(k::CONNECT_BLOCKING)? {
            c.connect_blocking = v;
        }
        if let Some(v) = props.bool(k::SEND_BLOCKING)? {
            c.send_blocking = v;
        }
        if let Some(v) = props.bool(k::SUBSCRIBE_BLOCKING)? {
            c.subscribe_blocking = v;
        }
        if let Some(v) = props.millis(k::BLOCKING_WRITE_TIMEOUT_MS)? {
            c.blocking_write_timeout = v;
        }
        if let Some(v) = props.parse(k::PUB_WINDOW_SIZE)? {
            c.pub_window_size = v;
        }
        if let Some(v) = props.millis(k::PUB_ACK_TIME_MS)? {
            c.pub_ack_time = v;
        }
        if let Some(v) = props.string(k::PUB_ACK_MODE) {
            c.pub_ack_mode = match v.to_ascii_lowercase().as_str() {
                values::PUB_ACK_WINDOWED => PublisherAckMode::Windowed,
                values::PUB_ACK_PER_MESSAGE => PublisherAckMode::PerMessage,
                other => {
                    return Err(Error::InvalidParameter(format!(
                        "{}: unknown mode {:?}",
                        k::PUB_ACK_MODE,
                        other
                    )))
                }
            };
        }
        if let Some(v) = props.string(k::GD_RECONNECT_FAIL_ACTION) {
            c.gd_reconnect_action = match v.to_ascii_lowercase().as_str() {
                values::GD_AUTO_RETRY => GdReconnectAction::AutoRetry,
                values::GD_DISCONNECT => GdReconnectAction::Disconnect,
                other => {
                    return Err(Error::InvalidParameter(format!(
                        "{}: unknown action {:?}",
                        k::GD_RECONNECT_FAIL_ACTION,
                        other
                    )))
                }
            };
        }

        c.validate()
            .map_err(|msg| Error::InvalidParameter(msg.into()))?;
        Ok(c)
    }
}
