// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport configuration.
//!
//! # Example
//!
//! ```
//! use brokerlink::transport::TcpConfig;
//!
//! let config = TcpConfig {
//!     nodelay: true,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use super::frame_codec::DEFAULT_MAX_MESSAGE_SIZE;

/// TCP transport configuration.
///
/// Connect timeouts and retries are owned by the session; this only covers
/// socket-level behaviour.
#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Disable Nagle's algorithm
    pub nodelay: bool,

    /// SO_KEEPALIVE probe idle time (None = OS default / disabled)
    pub keepalive: Option<Duration>,

    /// SO_SNDBUF (0 = OS default)
    pub send_buffer_size: usize,

    /// SO_RCVBUF (0 = OS default)
    pub recv_buffer_size: usize,

    /// Largest accepted frame body
    pub max_message_size: usize,

    /// Outbound bytes queued per link before sends fail with WouldBlock
    pub max_send_queue: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: Some(Duration::from_secs(30)),
            send_buffer_size: 0,
            recv_buffer_size: 0,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_send_queue: 64 * 1024 * 1024,
        }
    }
}

impl TcpConfig {
    /// Settings tuned for small, latency-sensitive frames.
    pub fn low_latency() -> Self {
        Self {
            nodelay: true,
            send_buffer_size: 64 * 1024,
            recv_buffer_size: 64 * 1024,
            ..Default::default()
        }
    }

    /// Settings tuned for bulk transfer.
    pub fn high_throughput() -> Self {
        Self {
            nodelay: false,
            send_buffer_size: 4 * 1024 * 1024,
            recv_buffer_size: 4 * 1024 * 1024,
            ..Default::default()
        }
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` with a description if any setting is invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_message_size == 0 {
            return Err("max_message_size must be > 0");
        }
        if self.max_message_size > 1024 * 1024 * 1024 {
            return Err("max_message_size too large (> 1 GB)");
        }
        if self.max_send_queue < self.max_message_size {
            return Err("max_send_queue must hold at least one max-size frame");
        }
        if self.keepalive.is_some_and(|d| d.is_zero()) {
            return Err("keepalive must be > 0 when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = TcpConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.nodelay);
    }

    #[test]
    fn test_presets_valid() {
        assert!(TcpConfig::low_latency().validate().is_ok());
        let bulk = TcpConfig::high_throughput();
        assert!(bulk.validate().is_ok());
        assert!(!bulk.nodelay);
    }

    #[test]
    fn test_invalid_values() {
        let config = TcpConfig {
            max_message_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TcpConfig {
            max_send_queue: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TcpConfig {
            keepalive: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
