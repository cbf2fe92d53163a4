// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by every brokerlink operation.
//!
//! Every failure carries a stable [`Subcode`] (what went wrong) and an
//! [`ErrorClass`] (how the caller should react):
//!
//! ```text
//! Parameter  -> fix the call, retrying is pointless
//! Transient  -> the same call may succeed later (timeout, would-block, link down)
//! Rejected   -> the broker refused the operation (permission, quota, duplicate)
//! Fatal      -> the object is unusable (destroyed, unsupported)
//! ```
//!
//! There is no thread-local "last error": all detail travels in the value.

use std::fmt;
use std::io;

// ============================================================================
// Subcodes
// ============================================================================

/// Stable numeric reason codes.
///
/// Values never change between releases; they are safe to log, persist or
/// forward across process boundaries. Broker NAK/reject frames carry the same
/// codes on the wire.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subcode {
    Ok = 0,

    // Parameter errors
    ParamOutOfRange = 1,
    ParamConflict = 2,
    InvalidTopicSyntax = 3,
    TopicTooLarge = 4,
    QueueNameTooLarge = 5,
    UnknownProperty = 6,
    WildcardNotAllowed = 7,

    // Transient / protocol
    SessionNotEstablished = 10,
    CommunicationError = 11,
    Timeout = 12,
    WouldBlock = 13,
    ProtocolError = 14,
    KeepaliveFailure = 15,

    // Login
    LoginFailure = 20,
    VpnNotAllowed = 21,
    ClientNameAlreadyInUse = 22,
    ServiceUnavailable = 23,

    // Broker rejections
    PermissionNotAllowed = 30,
    QuotaExceeded = 31,
    MessageTooBig = 32,
    SubscriptionAlreadyPresent = 33,
    SubscriptionNotFound = 34,
    UnknownEndpoint = 35,
    EndpointShutdown = 36,

    // Guaranteed delivery
    GdReconnectFailed = 40,
    SessionDisconnected = 41,

    // Cache outcomes
    CacheNoData = 50,
    CacheSuspectData = 51,
    CacheTimeout = 52,
    CacheErrorResponse = 53,
    CacheRequestCancelled = 54,
    CacheAlreadyInProgress = 55,

    // Object lifecycle
    InvalidState = 60,
    ObjectDestroyed = 61,
    CannotBlockInContext = 62,
    Unsupported = 63,
    Cancelled = 64,
}

impl Subcode {
    /// Decode a wire value. Unknown codes map to `ProtocolError`.
    pub fn from_u16(value: u16) -> Subcode {
        use Subcode::*;
        const ALL: &[Subcode] = &[
            Ok,
            ParamOutOfRange,
            ParamConflict,
            InvalidTopicSyntax,
            TopicTooLarge,
            QueueNameTooLarge,
            UnknownProperty,
            WildcardNotAllowed,
            SessionNotEstablished,
            CommunicationError,
            Timeout,
            WouldBlock,
            ProtocolError,
            KeepaliveFailure,
            LoginFailure,
            VpnNotAllowed,
            ClientNameAlreadyInUse,
            ServiceUnavailable,
            PermissionNotAllowed,
            QuotaExceeded,
            MessageTooBig,
            SubscriptionAlreadyPresent,
            SubscriptionNotFound,
            UnknownEndpoint,
            EndpointShutdown,
            GdReconnectFailed,
            SessionDisconnected,
            CacheNoData,
            CacheSuspectData,
            CacheTimeout,
            CacheErrorResponse,
            CacheRequestCancelled,
            CacheAlreadyInProgress,
            InvalidState,
            ObjectDestroyed,
            CannotBlockInContext,
            Unsupported,
            Cancelled,
        ];
        ALL.iter()
            .copied()
            .find(|code| *code as u16 == value)
            .unwrap_or(ProtocolError)
    }

    /// Numeric value as carried on the wire.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Login refusals that retrying another host cannot fix.
    pub fn is_terminal_login_failure(self) -> bool {
        matches!(self, Subcode::LoginFailure | Subcode::VpnNotAllowed)
    }
}

impl fmt::Display for Subcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as u16)
    }
}

/// Coarse reaction class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Synchronous misuse: bad argument, conflicting flags, wrong thread.
    Parameter,
    /// May succeed later without changing the call.
    Transient,
    /// Refused by the broker.
    Rejected,
    /// Object can no longer be used.
    Fatal,
}

// ============================================================================
// Error
// ============================================================================

/// Errors returned by brokerlink operations.
#[derive(Debug)]
pub enum Error {
    // ------------------------------------------------------------------------
    // Parameter errors
    // ------------------------------------------------------------------------
    /// Argument outside its allowed range.
    InvalidParameter(String),
    /// Two flags or settings that cannot be combined.
    ConflictingFlags(String),
    /// Topic string violates the topic syntax.
    InvalidTopic(String),
    /// Topic longer than [`crate::topic::MAX_TOPIC_LEN`] bytes.
    TopicTooLong(usize),
    /// Queue/endpoint name longer than [`crate::topic::MAX_QUEUE_NAME_LEN`] bytes.
    QueueNameTooLong(usize),
    /// Property key not recognized by the typed config it was parsed into.
    UnknownProperty(String),
    /// Blocking call attempted on the context's driving thread.
    BlockedInCallback,
    /// Operation not valid in the object's current state.
    InvalidState(String),

    // ------------------------------------------------------------------------
    // Transient errors
    // ------------------------------------------------------------------------
    /// Non-blocking call could not complete now (window full, no connection).
    WouldBlock,
    /// Blocking call or protocol exchange timed out.
    Timeout,
    /// Session has no established connection.
    NotConnected,
    /// Transport-level failure.
    CommunicationError(String),
    /// Malformed or unexpected frame.
    Protocol(String),
    /// I/O error with underlying cause.
    Io(io::Error),
    /// A blocked call was interrupted by destroy or cancel.
    Cancelled,

    // ------------------------------------------------------------------------
    // Broker rejections
    // ------------------------------------------------------------------------
    /// The broker refused the operation.
    Rejected { subcode: Subcode, reason: String },
    /// Identical dispatch entry already registered.
    SubscriptionAlreadyPresent(String),

    // ------------------------------------------------------------------------
    // Fatal
    // ------------------------------------------------------------------------
    /// The object (session, flow, cache session) was destroyed.
    Destroyed,
    /// Requested feature is not supported.
    Unsupported(String),

    // ------------------------------------------------------------------------
    // Composite
    // ------------------------------------------------------------------------
    /// A multi-message send stopped early; `sent` messages were accepted.
    PartialSend { sent: usize, cause: Box<Error> },
}

impl Error {
    /// Stable reason code for this error.
    pub fn subcode(&self) -> Subcode {
        match self {
            Error::InvalidParameter(_) => Subcode::ParamOutOfRange,
            Error::ConflictingFlags(_) => Subcode::ParamConflict,
            Error::InvalidTopic(_) => Subcode::InvalidTopicSyntax,
            Error::TopicTooLong(_) => Subcode::TopicTooLarge,
            Error::QueueNameTooLong(_) => Subcode::QueueNameTooLarge,
            Error::UnknownProperty(_) => Subcode::UnknownProperty,
            Error::BlockedInCallback => Subcode::CannotBlockInContext,
            Error::InvalidState(_) => Subcode::InvalidState,
            Error::WouldBlock => Subcode::WouldBlock,
            Error::Timeout => Subcode::Timeout,
            Error::NotConnected => Subcode::SessionNotEstablished,
            Error::CommunicationError(_) | Error::Io(_) => Subcode::CommunicationError,
            Error::Protocol(_) => Subcode::ProtocolError,
            Error::Cancelled => Subcode::Cancelled,
            Error::Rejected { subcode, .. } => *subcode,
            Error::SubscriptionAlreadyPresent(_) => Subcode::SubscriptionAlreadyPresent,
            Error::Destroyed => Subcode::ObjectDestroyed,
            Error::Unsupported(_) => Subcode::Unsupported,
            Error::PartialSend { cause, .. } => cause.subcode(),
        }
    }

    /// How the caller should react to this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::InvalidParameter(_)
            | Error::ConflictingFlags(_)
            | Error::InvalidTopic(_)
            | Error::TopicTooLong(_)
            | Error::QueueNameTooLong(_)
            | Error::UnknownProperty(_)
            | Error::BlockedInCallback
            | Error::InvalidState(_) => ErrorClass::Parameter,
            Error::WouldBlock
            | Error::Timeout
            | Error::NotConnected
            | Error::CommunicationError(_)
            | Error::Protocol(_)
            | Error::Io(_)
            | Error::Cancelled => ErrorClass::Transient,
            Error::Rejected { .. } | Error::SubscriptionAlreadyPresent(_) => ErrorClass::Rejected,
            Error::Destroyed | Error::Unsupported(_) => ErrorClass::Fatal,
            Error::PartialSend { cause, .. } => cause.class(),
        }
    }

    /// Broker rejection carrying `subcode`.
    pub fn rejected(subcode: Subcode, reason: impl Into<String>) -> Self {
        Error::Rejected {
            subcode,
            reason: reason.into(),
        }
    }

    /// Copy of this error suitable for fanning out to several waiters.
    ///
    /// `io::Error` is not `Clone`; it is flattened to `CommunicationError`.
    pub fn duplicate(&self) -> Error {
        match self {
            Error::InvalidParameter(m) => Error::InvalidParameter(m.clone()),
            Error::ConflictingFlags(m) => Error::ConflictingFlags(m.clone()),
            Error::InvalidTopic(m) => Error::InvalidTopic(m.clone()),
            Error::TopicTooLong(n) => Error::TopicTooLong(*n),
            Error::QueueNameTooLong(n) => Error::QueueNameTooLong(*n),
            Error::UnknownProperty(m) => Error::UnknownProperty(m.clone()),
            Error::BlockedInCallback => Error::BlockedInCallback,
            Error::InvalidState(m) => Error::InvalidState(m.clone()),
            Error::WouldBlock => Error::WouldBlock,
            Error::Timeout => Error::Timeout,
            Error::NotConnected => Error::NotConnected,
            Error::CommunicationError(m) => Error::CommunicationError(m.clone()),
            Error::Protocol(m) => Error::Protocol(m.clone()),
            Error::Io(e) => Error::CommunicationError(e.to_string()),
            Error::Cancelled => Error::Cancelled,
            Error::Rejected { subcode, reason } => Error::Rejected {
                subcode: *subcode,
                reason: reason.clone(),
            },
            Error::SubscriptionAlreadyPresent(m) => Error::SubscriptionAlreadyPresent(m.clone()),
            Error::Destroyed => Error::Destroyed,
            Error::Unsupported(m) => Error::Unsupported(m.clone()),
            Error::PartialSend { sent, cause } => Error::PartialSend {
                sent: *sent,
                cause: Box::new(cause.duplicate()),
            },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            Error::ConflictingFlags(msg) => write!(f, "Conflicting flags: {}", msg),
            Error::InvalidTopic(msg) => write!(f, "Invalid topic: {}", msg),
            Error::TopicTooLong(len) => write!(
                f,
                "Topic too long: {} bytes (max {})",
                len,
                crate::topic::MAX_TOPIC_LEN
            ),
            Error::QueueNameTooLong(len) => write!(
                f,
                "Queue name too long: {} bytes (max {})",
                len,
                crate::topic::MAX_QUEUE_NAME_LEN
            ),
            Error::UnknownProperty(key) => write!(f, "Unknown property: {}", key),
            Error::BlockedInCallback => {
                write!(f, "Blocking call not allowed on the context thread")
            }
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::WouldBlock => write!(f, "Operation would block"),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::NotConnected => write!(f, "Session not established"),
            Error::CommunicationError(msg) => write!(f, "Communication error: {}", msg),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Rejected { subcode, reason } => {
                write!(f, "Rejected by broker ({}): {}", subcode, reason)
            }
            Error::SubscriptionAlreadyPresent(topic) => {
                write!(f, "Subscription already present: {}", topic)
            }
            Error::Destroyed => write!(f, "Object destroyed"),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::PartialSend { sent, cause } => {
                write!(f, "Partial send: {} message(s) accepted, then {}", sent, cause)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::PartialSend { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
