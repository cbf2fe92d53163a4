// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! brokerlink configuration.
//!
//! Two levels, same as the rest of the crate's public surface:
//!
//! - **Typed configs** ([`SessionConfig`], [`FlowConfig`], [`CacheConfig`]):
//!   `Default` + `with_*` builders + `validate()`.
//! - **String-keyed [`Properties`]**: `session.*`, `flow.*`, `cache.*` keys
//!   (see [`keys`]), parsed into the typed configs with `from_properties`.
//!   Unknown keys are rejected, unspecified keys take defaults.
//!
//! # Example
//!
//! ```ignore
//! use brokerlink::config::{keys, Properties, SessionConfig};
//!
//! let props = Properties::from_pairs([
//!     (keys::session::HOST, "tcp://primary:55555,tcp://backup:55555"),
//!     (keys::session::PUB_WINDOW_SIZE, "10"),
//! ]);
//! let config = SessionConfig::from_properties(&props)?;
//! ```

mod cache;
mod flow;
pub mod keys;
mod properties;
mod session;

pub use cache::CacheConfig;
pub use flow::{FlowAckMode, FlowConfig};
pub use properties::Properties;
pub use session::{GdReconnectAction, PublisherAckMode, SessionConfig};

use std::time::Duration;

// =======================================================================
// Protocol limits and defaults
// =======================================================================

/// Default broker port when a host entry omits one.
pub const DEFAULT_PORT: u16 = 55555;

/// Maximum number of entries in a session host list.
pub const MAX_HOSTS: usize = 16;

/// Largest publisher / consumer window the protocol can express.
pub const MAX_WINDOW_SIZE: u8 = 255;

/// Default publisher window.
pub const DEFAULT_PUB_WINDOW_SIZE: u8 = 50;

/// Default publisher ack (retransmit) timer.
pub const DEFAULT_PUB_ACK_TIME: Duration = Duration::from_millis(2000);

/// Default bound on a blocked guaranteed send.
pub const DEFAULT_BLOCKING_WRITE_TIMEOUT: Duration = Duration::from_secs(90);

/// Floor of the cache protocol timer.
pub const MIN_CACHE_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default cache protocol timer.
pub const DEFAULT_CACHE_REQUEST_TIMEOUT: Duration = Duration::from_millis(10000);
