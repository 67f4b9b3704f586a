/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the fixline session engine.
//!
//! Every failure the engine can observe falls into one of the [`ErrorClass`]
//! buckets. The class decides what happens to the ledger and to the session:
//! garbled input never touches sequence numbers, structural errors are counted
//! but not delivered, and transport errors tear the connection down while
//! keeping the sequence numbers for the next logon.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all fixline operations.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error reported by the transport boundary.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error outside the transport boundary.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixError {
    /// Returns the classification of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Decode(e) => e.class(),
            Self::Encode(_) => ErrorClass::Structural,
            Self::Session(e) => e.class(),
            Self::Store(_) => ErrorClass::Store,
            Self::Transport(_) | Self::Io(_) => ErrorClass::Transport,
        }
    }
}

/// Classification of an inbound or session failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// I/O failure or connection reset.
    Transport,
    /// Message failed minimal framing checks; ignored by the ledger.
    Garbled,
    /// Parseable envelope with inconsistent content; counted, not delivered.
    Structural,
    /// Gap, duplicate or sequence regression.
    Sequencing,
    /// Logon parameters or message not allowed in the current state.
    SessionProtocol,
    /// Message store could not serve a request.
    Store,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transport => "transport",
            Self::Garbled => "garbled",
            Self::Structural => "structural",
            Self::Sequencing => "sequencing",
            Self::SessionProtocol => "session-protocol",
            Self::Store => "store",
        };
        f.write_str(s)
    }
}

/// Errors that occur during FIX message decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Ran out of bytes before the frame was complete.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// First field is not a non-empty BeginString.
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Declared BodyLength disagrees with the bytes actually present.
    #[error("body length mismatch: declared {declared}, actual {actual}")]
    BodyLengthMismatch {
        /// Value carried in tag 9.
        declared: usize,
        /// Counted length of the body.
        actual: usize,
    },

    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    #[error("missing checksum field (tag 10)")]
    MissingChecksum,

    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        calculated: u8,
        declared: u8,
    },

    #[error("missing required field: tag {tag}")]
    MissingRequiredField { tag: u32 },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Frame is longer than the configured limit.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge { size: usize, max_size: usize },
}

impl DecodeError {
    /// Returns the classification of this error.
    ///
    /// Everything that prevents a trustworthy MsgSeqNum from being read is
    /// garbled; everything else is structural.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidFieldValue { .. } => ErrorClass::Structural,
            _ => ErrorClass::Garbled,
        }
    }
}

/// Errors that occur during FIX message encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("missing required field: tag {tag}")]
    MissingRequiredField { tag: u32 },

    /// Field is reserved for the engine and cannot be set by the caller.
    #[error("tag {tag} is managed by the session layer")]
    ReservedField {
        /// The tag number of the field.
        tag: u32,
    },
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is not in the correct state for the operation.
    #[error("invalid session state: expected {expected}, current {current}")]
    InvalidState {
        /// Expected state for the operation.
        expected: String,
        /// Current session state.
        current: String,
    },

    /// Message type is not admissible in the current state.
    #[error("unexpected msg type {msg_type} in state {state}")]
    UnexpectedMessage {
        /// MsgType of the offending message.
        msg_type: String,
        /// Current session state.
        state: String,
    },

    /// Logon was rejected.
    #[error("logon rejected: {reason}")]
    LogonRejected {
        /// Reason for rejection.
        reason: String,
    },

    /// TestRequest went unanswered.
    #[error("heartbeat timeout after {elapsed_ms} milliseconds")]
    HeartbeatTimeout {
        elapsed_ms: u64,
    },

    /// Sequence number lower than expected without PossDupFlag.
    #[error("MsgSeqNum too low, expecting {expected} but received {received}")]
    SequenceTooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// SequenceReset attempted to move the inbound sequence backwards.
    #[error("sequence reset to {new_seq} would regress expected {expected}")]
    SequenceResetBackwards {
        /// Current expected sequence number.
        expected: u64,
        /// NewSeqNo carried by the reset.
        new_seq: u64,
    },

    /// Peer asked for messages the store cannot replay.
    #[error("resend request for unavailable range: {begin}..={end}")]
    ResendUnavailable {
        begin: u64,
        end: u64,
    },

    /// Our own resend request was not satisfied in time.
    #[error("resend request {begin}..={end} not satisfied within timeout")]
    ResendTimeout {
        /// Begin of the outstanding range.
        begin: u64,
        /// End of the outstanding range.
        end: u64,
    },

    /// A session with the same identity is already connected.
    #[error("session {0} is already connected")]
    DuplicateSession(String),

    /// No session is registered for the identity.
    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::SequenceTooLow { .. } | Self::SequenceResetBackwards { .. } => {
                ErrorClass::Sequencing
            }
            Self::ResendUnavailable { .. } => ErrorClass::Store,
            Self::Closed => ErrorClass::Transport,
            _ => ErrorClass::SessionProtocol,
        }
    }
}

/// Errors in message store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store no longer holds part of the range.
    #[error("messages not available for range: {range:?}")]
    RangeNotAvailable {
        /// The requested range of sequence numbers.
        range: Range<u64>,
    },

    /// Backend failure.
    #[error("store i/o error: {0}")]
    Io(String),
}

/// Errors raised at the transport boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport has been closed locally or by the peer.
    #[error("transport closed")]
    Closed,

    /// Underlying I/O failure.
    #[error("transport i/o error: {0}")]
    Io(String),

    /// Inbound frame could not be delimited.
    #[error("framing error: {0}")]
    Framing(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => Self::Closed,
            _ => Self::Io(err.to_string()),
        }
    }
}
