// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer flow configuration.

use std::time::Duration;

use super::keys::{self, values};
use super::Properties;
use crate::error::{Error, Result};
use crate::flow::Endpoint;
use crate::topic;

/// Who acknowledges delivered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowAckMode {
    /// The engine acks as soon as the message callback returns.
    #[default]
    Auto,
    /// The application acks each message id with `Flow::ack`.
    Client,
}

/// Consumer flow configuration.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub endpoint: Endpoint,
    pub ack_mode: FlowAckMode,
    /// Broker-side delivery window (1..=255)
    pub window_size: u8,
    /// Delivered-but-unacked budget in client mode (None = unbounded)
    pub max_unacked: Option<u32>,
    pub bind_timeout: Duration,
    /// Extra bind attempts after a timeout
    pub bind_retries: u32,
    pub bind_blocking: bool,
    /// Flush pending acks at least this often
    pub ack_timer: Duration,
    /// Flush pending acks once this percentage of the window is settled (1..=75)
    pub ack_threshold: u8,
    /// Start with the inbound window open
    pub start_state: bool,
    /// Ask the broker for active/inactive indications
    pub active_flow_indication: bool,
}

impl FlowConfig {
    /// Defaults bound to `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ack_mode: FlowAckMode::Auto,
            window_size: 255,
            max_unacked: None,
            bind_timeout: Duration::from_secs(10),
            bind_retries: 3,
            bind_blocking: true,
            ack_timer: Duration::from_millis(1000),
            ack_threshold: 60,
            start_state: true,
            active_flow_indication: false,
        }
    }

    pub fn with_ack_mode(mut self, mode: FlowAckMode) -> Self {
        self.ack_mode = mode;
        self
    }

    pub fn with_window_size(mut self, window: u8) -> Self {
        self.window_size = window;
        self
    }

    pub fn with_max_unacked(mut self, max: Option<u32>) -> Self {
        self.max_unacked = max;
        self
    }

    pub fn with_bind_timeout(mut self, timeout: Duration, retries: u32) -> Self {
        self.bind_timeout = timeout;
        self.bind_retries = retries;
        self
    }

    pub fn with_bind_blocking(mut self, blocking: bool) -> Self {
        self.bind_blocking = blocking;
        self
    }

    pub fn with_ack_timer(mut self, timer: Duration) -> Self {
        self.ack_timer = timer;
        self
    }

    pub fn with_ack_threshold(mut self, pct: u8) -> Self {
        self.ack_threshold = pct;
        self
    }

    pub fn with_start_state(mut self, started: bool) -> Self {
        self.start_state = started;
        self
    }

    pub fn with_active_flow_indication(mut self, enabled: bool) -> Self {
        self.active_flow_indication = enabled;
        self
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` with a description if any setting is out of range.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.endpoint.validate().is_err() {
            return Err("endpoint name or topic is invalid");
        }
        if self.window_size == 0 {
            return Err("window_size must be 1..=255");
        }
        if self.bind_timeout.is_zero() {
            return Err("bind_timeout must be > 0");
        }
        if self.ack_timer.is_zero() {
            return Err("ack_timer must be > 0");
        }
        if self.ack_threshold == 0 || self.ack_threshold > 75 {
            return Err("ack_threshold must be 1..=75");
        }
        Ok(())
    }

    /// Number of settled ids that triggers an ack flush.
    pub(crate) fn ack_flush_count(&self) -> usize {
        let n = usize::from(self.window_size) * usize::from(self.ack_threshold) / 100;
        n.max(1)
    }

    /// Parse `flow.*` keys; other namespaces are ignored.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        use keys::flow as k;
        props.check_namespace("flow.", k::ALL)?;

        let name = props
            .string(k::BIND_NAME)
            .ok_or_else(|| Error::InvalidParameter(format!("{} is required", k::BIND_NAME)))?;
        let durable = props.bool(k::BIND_DURABLE)?.unwrap_or(true);
        let entity = props
            .string(k::BIND_ENTITY)
            .unwrap_or_else(|| values::ENTITY_QUEUE.to_string());
        let endpoint = match entity.to_ascii_lowercase().as_str() {
            values::ENTITY_QUEUE => Endpoint::Queue { name, durable },
            values::ENTITY_TOPIC_ENDPOINT => {
                let topic = props.string(k::TOPIC).ok_or_else(|| {
                    Error::InvalidParameter(format!("{} is required for topic endpoints", k::TOPIC))
                })?;
                topic::validate_pattern(&topic)?;
                Endpoint::TopicEndpoint {
                    name,
                    durable,
                    topic,
                }
            }
            other => {
                return Err(Error::InvalidParameter(format!(
                    "{}: unknown entity {:?}",
                    k::BIND_ENTITY,
                    other
                )))
            }
        };

        let mut c = Self::new(endpoint);
        if let Some(v) = props.string(k::ACK_MODE) {
            c.ack_mode = match v.to_ascii_lowercase().as_str() {
                values::ACK_MODE_AUTO => FlowAckMode::Auto,
                values::ACK_MODE_CLIENT => FlowAckMode::Client,
                other => {
                    return Err(Error::InvalidParameter(format!(
                        "{}: unknown mode {:?}",
                        k::ACK_MODE,
                        other
                    )))
                }
            };
        }
        if let Some(v) = props.parse(k::WINDOW_SIZE)? {
            c.window_size = v;
        }
        if let Some(v) = props.parse::<i64>(k::MAX_UNACKED_MESSAGES)? {
            c.max_unacked = match v {
                -1 => None,
                n if n >= 0 => Some(u32::try_from(n).map_err(|_| {
                    Error::InvalidParameter(format!("{} out of range", k::MAX_UNACKED_MESSAGES))
                })?),
                _ => {
                    return Err(Error::InvalidParameter(format!(
                        "{} must be -1 or >= 0",
                        k::MAX_UNACKED_MESSAGES
                    )))
                }
            };
        }
        if let Some(v) = props.millis(k::BIND_TIMEOUT_MS)? {
            c.bind_timeout = v;
        }
        if let Some(v) = props.parse(k::BIND_RETRIES)? {
            c.bind_retries = v;
        }
        if let Some(v) = props.bool(k::BIND_BLOCKING)? {
            c.bind_blocking = v;
        }
        if let Some(v) = props.millis(k::ACK_TIMER_MS)? {
            c.ack_timer = v;
        }
        if let Some(v) = props.parse(k::ACK_THRESHOLD)? {
            c.ack_threshold = v;
        }
        if let Some(v) = props.bool(k::START_STATE)? {
            c.start_state = v;
        }
        if let Some(v) = props.bool(k::ACTIVE_FLOW_INDICATION)? {
            c.active_flow_indication = v;
        }

        c.validate()
            .map_err(|msg| Error::InvalidParameter(msg.into()))?;
        Ok(c)
    }
}
