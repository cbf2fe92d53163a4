// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # brokerlink - client-side broker messaging engine
//!
//! Connects an application to a message broker over one persistent link per
//! session and multiplexes everything the application does over it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use brokerlink::{Context, DeliveryMode, Message, Result, SessionConfig, SessionEvent};
//!
//! fn main() -> Result<()> {
//!     let ctx = Context::new()?;
//!     let config = SessionConfig::new("tcp://primary:55555,tcp://backup:55555")
//!         .with_vpn("default")
//!         .with_pub_window_size(10);
//!     let session = ctx
//!         .session_builder(config)
//!         .on_event(|event: &SessionEvent| println!("{:?}", event))
//!         .build()?;
//!     session.connect()?;
//!
//!     let msg = Message::to_topic("orders/new", b"42".to_vec())
//!         .with_delivery_mode(DeliveryMode::Persistent);
//!     session.send(msg)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         Application Layer                           |
//! |   Session | Flow | CacheSession | handlers (closures or traits)     |
//! +---------------------------------------------------------------------+
//! |                           Session Core                              |
//! |   Connection FSM | Publisher window | Dispatch | Flows | Cache      |
//! +---------------------------------------------------------------------+
//! |                    Context (single driving thread)                  |
//! |   transport events | timers | callback queue                        |
//! +---------------------------------------------------------------------+
//! |                         Transport Layer                             |
//! |   TCP (mio I/O thread, length-prefixed frames) | in-process loopback|
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Context`] | Owns the driving thread every callback runs on |
//! | [`Session`] | One broker connection: publish, subscribe, flows, cache |
//! | [`Flow`] | Guaranteed consumer bound to a queue or topic endpoint |
//! | [`CacheSession`] | Last-value retrieval racing live data |
//! | [`SessionConfig`] | Connection, retry and publisher settings |
//!
//! ## Guarantees
//!
//! - Callbacks of a context never run concurrently.
//! - Guaranteed messages are acknowledged in send order; a message leaves
//!   the publisher window exactly once (acked, rejected or returned).
//! - Every cache request completes exactly once, `Cancelled` included.

/// Cache requests and their live data policies.
pub mod cache;
/// Session, flow and cache configuration, with property-map loading.
pub mod config;
/// The driving thread and its timer queue.
pub mod context;
/// Topic dispatch table and subscribe flags.
pub mod dispatch;
/// Error type and stable subcodes.
pub mod error;
/// Guaranteed consumer flows.
pub mod flow;
/// The message container.
pub mod message;
mod publisher;
/// Sessions and the connection state machine.
pub mod session;
/// Per-session counters.
pub mod stats;
mod subscriptions;
mod timer;
/// Topic syntax and wildcard matching.
pub mod topic;
/// Link transports (TCP, loopback).
pub mod transport;
/// Frame codec.
pub mod wire;

pub use cache::{
    CacheEvent, CacheEventHandler, CacheOutcome, CacheRequestFlags, CacheRequestStatus,
    CacheSession, IncompleteReason, LiveDataPolicy,
};
pub use config::{
    CacheConfig, FlowAckMode, FlowConfig, GdReconnectAction, Properties, PublisherAckMode,
    SessionConfig,
};
pub use context::{Context, SessionId};
pub use dispatch::{DispatchHandler, HandlerId, MessageHandler, SubscribeFlags};
pub use error::{Error, ErrorClass, Result, Subcode};
pub use flow::{Endpoint, Flow, FlowEvent, FlowEventHandler, FlowMessageHandler, FlowState};
pub use message::{CacheStatus, CorrelationTag, DeliveryMode, Destination, Message};
pub use session::{
    Capabilities, HostAddr, HostList, Scheme, Session, SessionBuilder, SessionEvent,
    SessionEventHandler, SessionState,
};
pub use stats::StatsSnapshot;
pub use transport::{LoopbackTransport, TcpConfig, TcpTransport, Transport};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
