// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Internal frame format spoken between the engine and a broker endpoint.
//!
//! Transports move opaque frame bodies; this module gives them meaning.
//! Stream transports add their own length prefix (see
//! [`crate::transport::tcp::FrameCodec`]).
//!
//! ```text
//! +-----------+---------+------------------------------+
//! | flags (1) | tag (1) | fields (big-endian, tagged)  |
//! +-----------+---------+------------------------------+
//!   bit0 = fields are deflate-compressed (see compress.rs)
//! ```

pub(crate) mod buf;
pub(crate) mod compress;

use buf::{WireReader, WireWriter};

use crate::error::{Error, Result, Subcode};
use crate::flow::Endpoint;
use crate::message::{CacheStatus, DeliveryMode, Destination, Message};
use crate::session::Capabilities;

/// Upper bound on a decoded (inflated) frame body.
pub const MAX_FRAME_BODY: usize = 16 * 1024 * 1024;

const FLAG_COMPRESSED: u8 = 0x01;

// Frame tags
const TAG_LOGIN: u8 = 1;
const TAG_LOGIN_ACK: u8 = 2;
const TAG_LOGIN_NAK: u8 = 3;
const TAG_KEEPALIVE: u8 = 4;
const TAG_DISCONNECT: u8 = 5;
const TAG_SUBSCRIBE: u8 = 10;
const TAG_UNSUBSCRIBE: u8 = 11;
const TAG_SUBSCRIPTION_ACK: u8 = 12;
const TAG_OPEN_PUBLISHER_FLOW: u8 = 20;
const TAG_PUBLISHER_FLOW_UP: u8 = 21;
const TAG_PUBLISH: u8 = 22;
const TAG_PUB_ACK: u8 = 23;
const TAG_PUB_REJECT: u8 = 24;
const TAG_BIND: u8 = 30;
const TAG_BIND_ACK: u8 = 31;
const TAG_BIND_NAK: u8 = 32;
const TAG_UNBIND: u8 = 33;
const TAG_FLOW_ACK: u8 = 34;
const TAG_FLOW_STATE: u8 = 35;
const TAG_FLOW_DOWN: u8 = 36;
const TAG_DELIVER: u8 = 37;
const TAG_CACHE_REQUEST: u8 = 40;
const TAG_CACHE_RESPONSE: u8 = 41;

/// Status of one cache response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheResponseStatus {
    Ok,
    NoData,
    Suspect,
    Error,
}

impl CacheResponseStatus {
    fn to_wire(self) -> u8 {
        match self {
            CacheResponseStatus::Ok => 0,
            CacheResponseStatus::NoData => 1,
            CacheResponseStatus::Suspect => 2,
            CacheResponseStatus::Error => 3,
        }
    }

    fn from_wire(v: u8) -> Result<Self> {
        match v {
            0 => Ok(CacheResponseStatus::Ok),
            1 => Ok(CacheResponseStatus::NoData),
            2 => Ok(CacheResponseStatus::Suspect),
            3 => Ok(CacheResponseStatus::Error),
            other => Err(Error::Protocol(format!("unknown cache status {}", other))),
        }
    }
}

/// One protocol frame.
///
/// Publisher and consumer flow ids are assigned by the broker; `flow_id == 0`
/// on `Publish`/`Deliver` means a direct (non-guaranteed) message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    // === Session ===
    Login {
        client_name: String,
        vpn_name: String,
        username: String,
        password: String,
        keepalive_ms: u32,
    },
    LoginAck {
        capabilities: Capabilities,
    },
    LoginNak {
        subcode: Subcode,
        reason: String,
    },
    Keepalive,
    Disconnect {
        subcode: Subcode,
        reason: String,
    },

    // === Subscriptions ===
    Subscribe {
        correlation: u64,
        topic: String,
        confirm: bool,
    },
    Unsubscribe {
        correlation: u64,
        topic: String,
        confirm: bool,
    },
    SubscriptionAck {
        correlation: u64,
        topic: String,
        subcode: Subcode,
    },

    // === Guaranteed publishing ===
    OpenPublisherFlow {
        window: u8,
        per_message_acks: bool,
    },
    PublisherFlowUp {
        flow_id: u32,
        window: u8,
    },
    Publish {
        flow_id: u32,
        message: Message,
    },
    PubAck {
        flow_id: u32,
        seq: u64,
    },
    PubReject {
        flow_id: u32,
        seq: u64,
        subcode: Subcode,
    },

    // === Consumer flows ===
    Bind {
        correlation: u32,
        endpoint: Endpoint,
        window: u8,
        active_indication: bool,
    },
    BindAck {
        correlation: u32,
        flow_id: u32,
        active: bool,
    },
    BindNak {
        correlation: u32,
        subcode: Subcode,
        reason: String,
    },
    Unbind {
        flow_id: u32,
    },
    /// Settled message ids plus the credit the broker may use.
    FlowAck {
        flow_id: u32,
        acked: Vec<u64>,
        credit: u32,
    },
    FlowState {
        flow_id: u32,
        active: bool,
    },
    FlowDown {
        flow_id: u32,
        subcode: Subcode,
        reason: String,
    },
    Deliver {
        flow_id: u32,
        msg_id: u64,
        message: Message,
    },

    // === Cache ===
    CacheRequest {
        request_id: u64,
        exchange: u32,
        cache_name: String,
        topic: String,
        max_messages: u32,
        max_age_secs: u32,
        include_other_clusters: bool,
        continuation: Option<Vec<u8>>,
    },
    /// `continuation` set means more data is available.
    CacheResponse {
        request_id: u64,
        exchange: u32,
        status: CacheResponseStatus,
        messages: Vec<Message>,
        continuation: Option<Vec<u8>>,
    },
}

impl Frame {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Login { .. } => "Login",
            Frame::LoginAck { .. } => "LoginAck",
            Frame::LoginNak { .. } => "LoginNak",
            Frame::Keepalive => "Keepalive",
            Frame::Disconnect { .. } => "Disconnect",
            Frame::Subscribe { .. } => "Subscribe",
            Frame::Unsubscribe { .. } => "Unsubscribe",
            Frame::SubscriptionAck { .. } => "SubscriptionAck",
            Frame::OpenPublisherFlow { .. } => "OpenPublisherFlow",
            Frame::PublisherFlowUp { .. } => "PublisherFlowUp",
            Frame::Publish { .. } => "Publish",
            Frame::PubAck { .. } => "PubAck",
            Frame::PubReject { .. } => "PubReject",
            Frame::Bind { .. } => "Bind",
            Frame::BindAck { .. } => "BindAck",
            Frame::BindNak { .. } => "BindNak",
            Frame::Unbind { .. } => "Unbind",
            Frame::FlowAck { .. } => "FlowAck",
            Frame::FlowState { .. } => "FlowState",
            Frame::FlowDown { .. } => "FlowDown",
            Frame::Deliver { .. } => "Deliver",
            Frame::CacheRequest { .. } => "CacheRequest",
            Frame::CacheResponse { .. } => "CacheResponse",
        }
    }

    /// Encode into a frame body; `compression_level` 0 disables deflate.
    pub fn encode(&self, compression_level: u32) -> Vec<u8> {
        let mut w = WireWriter::new();
        let tag = self.write_fields(&mut w);
        let fields = w.into_inner();

        let (flags, fields) = match compress::compress(&fields, compression_level) {
            Some(packed) => (FLAG_COMPRESSED, packed),
            None => (0, fields),
        };
        let mut body = Vec::with_capacity(2 + fields.len());
        body.push(flags);
        body.push(tag);
        body.extend_from_slice(&fields);
        body
    }

    /// Decode a frame body.
    pub fn decode(body: &[u8]) -> Result<Frame> {
        if body.len() < 2 {
            return Err(Error::Protocol("frame body shorter than header".into()));
        }
        let flags = body[0];
        let tag = body[1];
        let inflated;
        let fields = if flags & FLAG_COMPRESSED != 0 {
            inflated = compress::decompress(&body[2..], MAX_FRAME_BODY)?;
            &inflated[..]
        } else {
            &body[2..]
        };

        let mut r = WireReader::new(fields);
        let frame = Self::read_fields(tag, &mut r)?;
        if r.remaining() != 0 {
            return Err(Error::Protocol(format!(
                "{} trailing bytes after {}",
                r.remaining(),
                frame.kind()
            )));
        }
        Ok(frame)
    }

    fn write_fields(&self, w: &mut WireWriter) -> u8 {
        match self {
            Frame::Login {
                client_name,
                vpn_name,
                username,
                password,
                keepalive_ms,
            } => {
                w.str(client_name);
                w.str(vpn_name);
                w.str(username);
                w.str(password);
                w.u32(*keepalive_ms);
                TAG_LOGIN
            }
            Frame::LoginAck { capabilities } => {
                w.str(&capabilities.router_name);
                w.u8(capabilities.to_bits());
                w.u8(capabilities.max_pub_window);
                TAG_LOGIN_ACK
            }
            Frame::LoginNak { subcode, reason } => {
                w.u16(subcode.as_u16());
                w.str(reason);
                TAG_LOGIN_NAK
            }
            Frame::Keepalive => TAG_KEEPALIVE,
            Frame::Disconnect { subcode, reason } => {
                w.u16(subcode.as_u16());
                w.str(reason);
                TAG_DISCONNECT
            }
            Frame::Subscribe {
                correlation,
                topic,
                confirm,
            } => {
                w.u64(*correlation);
                w.str(topic);
                w.bool(*confirm);
                TAG_SUBSCRIBE
            }
            Frame::Unsubscribe {
                correlation,
                topic,
                confirm,
            } => {
                w.u64(*correlation);
                w.str(topic);
                w.bool(*confirm);
                TAG_UNSUBSCRIBE
            }
            Frame::SubscriptionAck {
                correlation,
                topic,
                subcode,
            } => {
                w.u64(*correlation);
                w.str(topic);
                w.u16(subcode.as_u16());
                TAG_SUBSCRIPTION_ACK
            }
            Frame::OpenPublisherFlow {
                window,
                per_message_acks,
            } => {
                w.u8(*window);
                w.bool(*per_message_acks);
                TAG_OPEN_PUBLISHER_FLOW
            }
            Frame::PublisherFlowUp { flow_id, window } => {
                w.u32(*flow_id);
                w.u8(*window);
                TAG_PUBLISHER_FLOW_UP
            }
            Frame::Publish { flow_id, message } => {
                w.u32(*flow_id);
                write_message(w, message);
                TAG_PUBLISH
            }
            Frame::PubAck { flow_id, seq } => {
                w.u32(*flow_id);
                w.u64(*seq);
                TAG_PUB_ACK
            }
            Frame::PubReject {
                flow_id,
                seq,
                subcode,
            } => {
                w.u32(*flow_id);
                w.u64(*seq);
                w.u16(subcode.as_u16());
                TAG_PUB_REJECT
            }
            Frame::Bind {
                correlation,
                endpoint,
                window,
                active_indication,
            } => {
                w.u32(*correlation);
                write_endpoint(w, endpoint);
                w.u8(*window);
                w.bool(*active_indication);
                TAG_BIND
            }
            Frame::BindAck {
                correlation,
                flow_id,
                active,
            } => {
                w.u32(*correlation);
                w.u32(*flow_id);
                w.bool(*active);
                TAG_BIND_ACK
            }
            Frame::BindNak {
                correlation,
                subcode,
                reason,
            } => {
                w.u32(*correlation);
                w.u16(subcode.as_u16());
                w.str(reason);
                TAG_BIND_NAK
            }
            Frame::Unbind { flow_id } => {
                w.u32(*flow_id);
                TAG_UNBIND
            }
            Frame::FlowAck {
                flow_id,
                acked,
                credit,
            } => {
                w.u32(*flow_id);
                w.u32(acked.len() as u32);
                for id in acked {
                    w.u64(*id);
                }
                w.u32(*credit);
                TAG_FLOW_ACK
            }
            Frame::FlowState { flow_id, active } => {
                w.u32(*flow_id);
                w.bool(*active);
                TAG_FLOW_STATE
            }
            Frame::FlowDown {
                flow_id,
                subcode,
                reason,
            } => {
                w.u32(*flow_id);
                w.u16(subcode.as_u16());
                w.str(reason);
                TAG_FLOW_DOWN
            }
            Frame::Deliver {
                flow_id,
                msg_id,
                message,
            } => {
                w.u32(*flow_id);
                w.u64(*msg_id);
                write_message(w, message);
                TAG_DELIVER
            }
            Frame::CacheRequest {
                request_id,
                exchange,
                cache_name,
                topic,
                max_messages,
                max_age_secs,
                include_other_clusters,
                continuation,
            } => {
                w.u64(*request_id);
                w.u32(*exchange);
                w.str(cache_name);
                w.str(topic);
                w.u32(*max_messages);
                w.u32(*max_age_secs);
                w.bool(*include_other_clusters);
                w.opt_bytes(continuation.as_deref());
                TAG_CACHE_REQUEST
            }
            Frame::CacheResponse {
                request_id,
                exchange,
                status,
                messages,
                continuation,
            } => {
                w.u64(*request_id);
                w.u32(*exchange);
                w.u8(status.to_wire());
                w.u32(messages.len() as u32);
                for m in messages {
                    write_message(w, m);
                }
                w.opt_bytes(continuation.as_deref());
                TAG_CACHE_RESPONSE
            }
        }
    }

    fn read_fields(tag: u8, r: &mut WireReader<'_>) -> Result<Frame> {
        let frame = match tag {
            TAG_LOGIN => Frame::Login {
                client_name: r.str()?,
                vpn_name: r.str()?,
                username: r.str()?,
                password: r.str()?,
                keepalive_ms: r.u32()?,
            },
            TAG_LOGIN_ACK => {
                let router_name = r.str()?;
                let bits = r.u8()?;
                let max_pub_window = r.u8()?;
                Frame::LoginAck {
                    capabilities: Capabilities::from_bits(router_name, bits, max_pub_window),
                }
            }
            TAG_LOGIN_NAK => Frame::LoginNak {
                subcode: Subcode::from_u16(r.u16()?),
                reason: r.str()?,
            },
            TAG_KEEPALIVE => Frame::Keepalive,
            TAG_DISCONNECT => Frame::Disconnect {
                subcode: Subcode::from_u16(r.u16()?),
                reason: r.str()?,
            },
            TAG_SUBSCRIBE => Frame::Subscribe {
                correlation: r.u64()?,
                topic: r.str()?,
                confirm: r.bool()?,
            },
            TAG_UNSUBSCRIBE => Frame::Unsubscribe {
                correlation: r.u64()?,
                topic: r.str()?,
                confirm: r.bool()?,
            },
            TAG_SUBSCRIPTION_ACK => Frame::SubscriptionAck {
                correlation: r.u64()?,
                topic: r.str()?,
                subcode: Subcode::from_u16(r.u16()?),
            },
            TAG_OPEN_PUBLISHER_FLOW => Frame::OpenPublisherFlow {
                window: r.u8()?,
                per_message_acks: r.bool()?,
            },
            TAG_PUBLISHER_FLOW_UP => Frame::PublisherFlowUp {
                flow_id: r.u32()?,
                window: r.u8()?,
            },
            TAG_PUBLISH => Frame::Publish {
                flow_id: r.u32()?,
                message: read_message(r)?,
            },
            TAG_PUB_ACK => Frame::PubAck {
                flow_id: r.u32()?,
                seq: r.u64()?,
            },
            TAG_PUB_REJECT => Frame::PubReject {
                flow_id: r.u32()?,
                seq: r.u64()?,
                subcode: Subcode::from_u16(r.u16()?),
            },
            TAG_BIND => Frame::Bind {
                correlation: r.u32()?,
                endpoint: read_endpoint(r)?,
                window: r.u8()?,
                active_indication: r.bool()?,
            },
            TAG_BIND_ACK => Frame::BindAck {
                correlation: r.u32()?,
                flow_id: r.u32()?,
                active: r.bool()?,
            },
            TAG_BIND_NAK => Frame::BindNak {
                correlation: r.u32()?,
                subcode: Subcode::from_u16(r.u16()?),
                reason: r.str()?,
            },
            TAG_UNBIND => Frame::Unbind { flow_id: r.u32()? },
            TAG_FLOW_ACK => {
                let flow_id = r.u32()?;
                let count = r.u32()? as usize;
                if count > r.remaining() / 8 {
                    return Err(Error::Protocol("FlowAck id count exceeds body".into()));
                }
                let mut acked = Vec::with_capacity(count);
                for _ in 0..count {
                    acked.push(r.u64()?);
                }
                Frame::FlowAck {
                    flow_id,
                    acked,
                    credit: r.u32()?,
                }
            }
            TAG_FLOW_STATE => Frame::FlowState {
                flow_id: r.u32()?,
                active: r.bool()?,
            },
            TAG_FLOW_DOWN => Frame::FlowDown {
                flow_id: r.u32()?,
                subcode: Subcode::from_u16(r.u16()?),
                reason: r.str()?,
            },
            TAG_DELIVER => Frame::Deliver {
                flow_id: r.u32()?,
                msg_id: r.u64()?,
                message: read_message(r)?,
            },
            TAG_CACHE_REQUEST => Frame::CacheRequest {
                request_id: r.u64()?,
                exchange: r.u32()?,
                cache_name: r.str()?,
                topic: r.str()?,
                max_messages: r.u32()?,
                max_age_secs: r.u32()?,
                include_other_clusters: r.bool()?,
                continuation: r.opt_bytes()?,
            },
            TAG_CACHE_RESPONSE => {
                let request_id = r.u64()?;
                let exchange = r.u32()?;
                let status = CacheResponseStatus::from_wire(r.u8()?)?;
                let count = r.u32()? as usize;
                let mut messages = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    messages.push(read_message(r)?);
                }
                Frame::CacheResponse {
                    request_id,
                    exchange,
                    status,
                    messages,
                    continuation: r.opt_bytes()?,
                }
            }
            other => return Err(Error::Protocol(format!("unknown frame tag {}", other))),
        };
        Ok(frame)
    }
}

// ============================================================================
// Field groups
// ============================================================================

fn write_destination(w: &mut WireWriter, dest: Option<&Destination>) {
    match dest {
        None => w.u8(0),
        Some(Destination::Topic(t)) => {
            w.u8(1);
            w.str(t);
        }
        Some(Destination::Queue(q)) => {
            w.u8(2);
            w.str(q);
        }
    }
}

fn read_destination(r: &mut WireReader<'_>) -> Result<Option<Destination>> {
    match r.u8()? {
        0 => Ok(None),
        1 => Ok(Some(Destination::Topic(r.str()?))),
        2 => Ok(Some(Destination::Queue(r.str()?))),
        other => Err(Error::Protocol(format!("unknown destination kind {}", other))),
    }
}

/// The correlation tag is local to the sender and never encoded.
fn write_message(w: &mut WireWriter, m: &Message) {
    write_destination(w, m.destination());
    write_destination(w, m.reply_to());
    w.u8(m.delivery_mode().to_wire());
    w.opt_str(m.correlation_id());
    w.opt_bytes(m.user_data());
    w.opt_u64(m.sequence_id());
    w.bool(m.is_redelivered());
    w.opt_u64(m.cache_request_id());
    w.u8(m.cache_status().to_wire());
    w.bool(m.discard_indication());
    w.bytes(m.attachment());
}

fn read_message(r: &mut WireReader<'_>) -> Result<Message> {
    let mut m = Message::new();
    if let Some(dest) = read_destination(r)? {
        m.set_destination(dest);
    }
    m.set_reply_to(read_destination(r)?);
    let mode = r.u8()?;
    m.set_delivery_mode(
        DeliveryMode::from_wire(mode)
            .ok_or_else(|| Error::Protocol(format!("unknown delivery mode {}", mode)))?,
    );
    m.set_correlation_id(r.opt_str()?);
    m.set_user_data(r.opt_bytes()?);
    m.set_sequence_id(r.opt_u64()?);
    m.set_redelivered(r.bool()?);
    let cache_request = r.opt_u64()?;
    let status = r.u8()?;
    m.set_cache_info(
        cache_request,
        CacheStatus::from_wire(status)
            .ok_or_else(|| Error::Protocol(format!("unknown cache status {}", status)))?,
    );
    m.set_discard_indication(r.bool()?);
    m.set_attachment(r.bytes()?);
    Ok(m)
}

fn write_endpoint(w: &mut WireWriter, e: &Endpoint) {
    match e {
        Endpoint::Queue { name, durable } => {
            w.u8(1);
            w.str(name);
            w.bool(*durable);
        }
        Endpoint::TopicEndpoint {
            name,
            durable,
            topic,
        } => {
            w.u8(2);
            w.str(name);
            w.bool(*durable);
            w.str(topic);
        }
    }
}

fn read_endpoint(r: &mut WireReader<'_>) -> Result<Endpoint> {
    match r.u8()? {
        1 => Ok(Endpoint::Queue {
            name: r.str()?,
            durable: r.bool()?,
        }),
        2 => Ok(Endpoint::TopicEndpoint {
            name: r.str()?,
            durable: r.bool()?,
            topic: r.str()?,
        }),
        other => Err(Error::Protocol(format!("unknown endpoint kind {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CorrelationTag;

    #[test]
    fn test_publish_frame_drops_correlation_tag() {
        let mut msg = Message::to_topic("a/b", b"payload".to_vec())
            .with_delivery_mode(DeliveryMode::Persistent)
            .with_correlation_tag(CorrelationTag(99))
            .with_correlation_id("c-1");
        msg.set_sequence_id(Some(4));

        let frame = Frame::Publish {
            flow_id: 7,
            message: msg,
        };
        let decoded = Frame::decode(&frame.encode(0)).unwrap();
        match decoded {
            Frame::Publish { flow_id, message } => {
                assert_eq!(flow_id, 7);
                assert_eq!(message.topic(), Some("a/b"));
                assert_eq!(message.sequence_id(), Some(4));
                assert_eq!(message.correlation_id(), Some("c-1"));
                assert_eq!(message.correlation_tag(), None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_compressed_cache_response() {
        let messages: Vec<Message> = (0..20)
            .map(|i| Message::to_topic("cached/topic", vec![b'z'; 100 + i]))
            .collect();
        let frame = Frame::CacheResponse {
            request_id: 1,
            exchange: 2,
            status: CacheResponseStatus::Ok,
            messages,
            continuation: Some(vec![1, 2, 3]),
        };
        let plain = frame.encode(0);
        let packed = frame.encode(6);
        assert!(packed.len() < plain.len());
        assert_eq!(packed[0] & FLAG_COMPRESSED, FLAG_COMPRESSED);
        assert_eq!(Frame::decode(&packed).unwrap(), frame);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Frame::decode(&[]).is_err());
        assert!(Frame::decode(&[0, 200]).is_err());
        // Keepalive with trailing byte
        assert!(Frame::decode(&[0, TAG_KEEPALIVE, 0]).is_err());
        // FlowAck announcing more ids than present
        let mut body = vec![0, TAG_FLOW_ACK];
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&u32::MAX.to_be_bytes());
        assert!(Frame::decode(&body).is_err());
    }

    #[test]
    fn test_login_ack_capabilities() {
        let caps = Capabilities {
            router_name: "router-1".into(),
            guaranteed_publish: true,
            guaranteed_consume: true,
            cache: false,
            compression: true,
            max_pub_window: 100,
        };
        let frame = Frame::LoginAck {
            capabilities: caps.clone(),
        };
        assert_eq!(
            Frame::decode(&frame.encode(0)).unwrap(),
            Frame::LoginAck { capabilities: caps }
        );
    }
}
