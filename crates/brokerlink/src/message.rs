// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Structured message handed to `send` and to message callbacks.
//!
//! Outbound fields are set by the application; receive-side metadata
//! (`flow_id`, `message_id`, cache status, ...) is filled in by the engine
//! and is ignored on send.

use crate::error::{Error, Result};
use crate::topic;

/// Where a message is published to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Topic(String),
    Queue(String),
}

impl Destination {
    pub fn topic(name: impl Into<String>) -> Self {
        Destination::Topic(name.into())
    }

    pub fn queue(name: impl Into<String>) -> Self {
        Destination::Queue(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Destination::Topic(n) | Destination::Queue(n) => n,
        }
    }

    /// Validate for use as a publish destination.
    pub fn validate(&self) -> Result<()> {
        match self {
            Destination::Topic(t) => topic::validate_publish_topic(t),
            Destination::Queue(q) => topic::validate_queue_name(q),
        }
    }
}

/// Delivery mode of a message.
///
/// `Direct` messages bypass the publisher window; the two guaranteed modes
/// are windowed, acknowledged and retransmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    Direct,
    NonPersistent,
    Persistent,
}

impl DeliveryMode {
    pub fn is_guaranteed(self) -> bool {
        !matches!(self, DeliveryMode::Direct)
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            DeliveryMode::Direct => 0,
            DeliveryMode::NonPersistent => 1,
            DeliveryMode::Persistent => 2,
        }
    }

    pub(crate) fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(DeliveryMode::Direct),
            1 => Some(DeliveryMode::NonPersistent),
            2 => Some(DeliveryMode::Persistent),
            _ => None,
        }
    }
}

/// Opaque application token returned verbatim with the ack or reject of a
/// guaranteed message. Never sent to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationTag(pub u64);

/// Origin of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStatus {
    #[default]
    Live,
    Cached,
    Suspect,
}

impl CacheStatus {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            CacheStatus::Live => 0,
            CacheStatus::Cached => 1,
            CacheStatus::Suspect => 2,
        }
    }

    pub(crate) fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(CacheStatus::Live),
            1 => Some(CacheStatus::Cached),
            2 => Some(CacheStatus::Suspect),
            _ => None,
        }
    }
}

/// A message. Cheap to build, `Clone` when needed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    destination: Option<Destination>,
    reply_to: Option<Destination>,
    delivery_mode: DeliveryMode,
    correlation_id: Option<String>,
    correlation_tag: Option<CorrelationTag>,
    attachment: Vec<u8>,
    user_data: Option<Vec<u8>>,
    sequence_id: Option<u64>,
    redelivered: bool,

    // Receive side
    flow_id: Option<u32>,
    message_id: Option<u64>,
    cache_request_id: Option<u64>,
    cache_status: CacheStatus,
    discard_indication: bool,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a topic message with an attachment.
    pub fn to_topic(topic: impl Into<String>, attachment: impl Into<Vec<u8>>) -> Self {
        Self::new()
            .with_destination(Destination::topic(topic))
            .with_attachment(attachment)
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_reply_to(mut self, reply_to: Destination) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_correlation_tag(mut self, tag: CorrelationTag) -> Self {
        self.correlation_tag = Some(tag);
        self
    }

    pub fn with_attachment(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.attachment = data.into();
        self
    }

    pub fn with_user_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.user_data = Some(data.into());
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn set_destination(&mut self, destination: Destination) {
        self.destination = Some(destination);
    }

    /// Topic name when the destination is a topic.
    pub fn topic(&self) -> Option<&str> {
        match &self.destination {
            Some(Destination::Topic(t)) => Some(t),
            _ => None,
        }
    }

    pub fn reply_to(&self) -> Option<&Destination> {
        self.reply_to.as_ref()
    }

    pub fn set_reply_to(&mut self, reply_to: Option<Destination>) {
        self.reply_to = reply_to;
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    pub fn set_delivery_mode(&mut self, mode: DeliveryMode) {
        self.delivery_mode = mode;
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn set_correlation_id(&mut self, id: Option<String>) {
        self.correlation_id = id;
    }

    pub fn correlation_tag(&self) -> Option<CorrelationTag> {
        self.correlation_tag
    }

    pub fn set_correlation_tag(&mut self, tag: Option<CorrelationTag>) {
        self.correlation_tag = tag;
    }

    pub fn attachment(&self) -> &[u8] {
        &self.attachment
    }

    pub fn set_attachment(&mut self, data: impl Into<Vec<u8>>) {
        self.attachment = data.into();
    }

    pub fn user_data(&self) -> Option<&[u8]> {
        self.user_data.as_deref()
    }

    pub fn set_user_data(&mut self, data: Option<Vec<u8>>) {
        self.user_data = data;
    }

    /// Sequence id assigned by the publisher (guaranteed messages only).
    pub fn sequence_id(&self) -> Option<u64> {
        self.sequence_id
    }

    pub fn is_redelivered(&self) -> bool {
        self.redelivered
    }

    /// Flow the message was delivered on, if any.
    pub fn flow_id(&self) -> Option<u32> {
        self.flow_id
    }

    /// Id to pass to `Flow::ack` in client-ack mode.
    pub fn message_id(&self) -> Option<u64> {
        self.message_id
    }

    pub fn cache_request_id(&self) -> Option<u64> {
        self.cache_request_id
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.cache_status
    }

    /// True when the broker discarded messages before this one.
    pub fn discard_indication(&self) -> bool {
        self.discard_indication
    }

    /// Validate the message for sending.
    pub fn validate_for_send(&self) -> Result<()> {
        match &self.destination {
            Some(dest) => dest.validate(),
            None => Err(Error::InvalidParameter("message has no destination".into())),
        }
    }

    // ------------------------------------------------------------------------
    // Engine-side setters
    // ------------------------------------------------------------------------

    pub(crate) fn set_sequence_id(&mut self, seq: Option<u64>) {
        self.sequence_id = seq;
    }

    pub(crate) fn set_redelivered(&mut self, redelivered: bool) {
        self.redelivered = redelivered;
    }

    pub(crate) fn set_flow_id(&mut self, flow_id: Option<u32>) {
        self.flow_id = flow_id;
    }

    pub(crate) fn set_message_id(&mut self, id: Option<u64>) {
        self.message_id = id;
    }

    pub(crate) fn set_cache_info(&mut self, request_id: Option<u64>, status: CacheStatus) {
        self.cache_request_id = request_id;
        self.cache_status = status;
    }

    pub(crate) fn set_discard_indication(&mut self, discard: bool) {
        self.discard_indication = discard;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_accessors() {
        let msg = Message::to_topic("orders/new", b"hello".to_vec())
            .with_delivery_mode(DeliveryMode::Persistent)
            .with_correlation_tag(CorrelationTag(7))
            .with_reply_to(Destination::queue("replies"));

        assert_eq!(msg.topic(), Some("orders/new"));
        assert_eq!(msg.attachment(), b"hello");
        assert!(msg.delivery_mode().is_guaranteed());
        assert_eq!(msg.correlation_tag(), Some(CorrelationTag(7)));
        assert_eq!(msg.reply_to().map(Destination::name), Some("replies"));
        assert_eq!(msg.cache_status(), CacheStatus::Live);
        assert!(msg.sequence_id().is_none());
    }

    #[test]
    fn test_validate_for_send() {
        assert!(Message::new().validate_for_send().is_err());
        assert!(Message::to_topic("a/b", vec![]).validate_for_send().is_ok());
        assert!(Message::to_topic("a/>", vec![]).validate_for_send().is_err());
        let q = Message::new().with_destination(Destination::queue("q".repeat(300)));
        assert!(matches!(
            q.validate_for_send(),
            Err(Error::QueueNameTooLong(300))
        ));
    }

    #[test]
    fn test_wire_enums() {
        for mode in [
            DeliveryMode::Direct,
            DeliveryMode::NonPersistent,
            DeliveryMode::Persistent,
        ] {
            assert_eq!(DeliveryMode::from_wire(mode.to_wire()), Some(mode));
        }
        assert_eq!(DeliveryMode::from_wire(9), None);
        assert_eq!(CacheStatus::from_wire(2), Some(CacheStatus::Suspect));
    }
}
