//! Error types for mqtt-stream.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Stream-level operations never return errors directly: a failed stream
//! closes its receive channel and latches the first error, which is then
//! available through [`Stream::error`](crate::Stream::error). The codec and
//! the transport traits return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use mqtt_stream::{codec, ControlPacket, Result};
//!
//! async fn first_packet(bytes: &[u8]) -> Result<Option<ControlPacket>> {
//!     let mut source = bytes;
//!     let decoded = codec::decode::<ControlPacket, _>(&mut source).await?;
//!     Ok(decoded.map(|d| d.packet))
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Framing | [`Error::ShortRead`], [`Error::MalformedLength`], [`Error::UnknownPacketType`], [`Error::TrailingData`] |
//! | Packet | [`Error::PacketDecode`], [`Error::PacketEncode`] |
//! | Transport | [`Error::TransportRead`], [`Error::TransportWrite`], [`Error::WebSocket`], [`Error::UnexpectedMessage`] |
//! | Setup | [`Error::Config`], [`Error::Connection`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::packet::PacketType;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Every variant is terminal for a stream: there is no resynchronization
/// after a framing, packet or transport failure.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// Input ended before the frame was complete.
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes the frame structurally required at the point of failure.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Remaining length did not terminate within four bytes.
    #[error("Malformed remaining length")]
    MalformedLength,

    /// Header type nibble does not map to a known packet type.
    #[error("Unknown packet type: {nibble}")]
    UnknownPacketType {
        /// The unrecognized type nibble.
        nibble: u8,
    },

    /// A message carried bytes beyond a single frame.
    #[error("Trailing data: {extra} bytes after frame")]
    TrailingData {
        /// Number of unconsumed bytes.
        extra: usize,
    },

    // ========================================================================
    // Packet Errors
    // ========================================================================
    /// Structurally valid frame rejected by the packet decoder.
    #[error("Failed to decode {packet_type} packet: {source}")]
    PacketDecode {
        /// Type announced by the frame header.
        packet_type: PacketType,
        /// Packet-level reason.
        source: PacketError,
    },

    /// Packet failed validation before any byte was written.
    #[error("Failed to encode {packet_type} packet: {source}")]
    PacketEncode {
        /// Type of the rejected packet.
        packet_type: PacketType,
        /// Packet-level reason.
        source: PacketError,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Reading from the transport failed.
    #[error("Transport read failed: {0}")]
    TransportRead(#[source] IoError),

    /// Writing to the transport failed.
    #[error("Transport write failed: {0}")]
    TransportWrite(#[source] IoError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// A WebSocket message of the wrong kind arrived.
    #[error("Unexpected {kind} message")]
    UnexpectedMessage {
        /// Message kind, e.g. `text`.
        kind: &'static str,
    },

    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// Invalid configuration, e.g. an unsupported URL scheme.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a short read error.
    #[inline]
    pub fn short_read(expected: usize, actual: usize) -> Self {
        Self::ShortRead { expected, actual }
    }

    /// Creates a read timeout error.
    ///
    /// Timeouts are reported as ordinary transport read failures.
    #[inline]
    pub fn read_timeout() -> Self {
        Self::TransportRead(IoError::new(ErrorKind::TimedOut, "read timed out"))
    }

    /// Creates an unexpected message error.
    #[inline]
    pub fn unexpected_message(kind: &'static str) -> Self {
        Self::UnexpectedMessage { kind }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the byte stream itself was not a valid frame.
    #[inline]
    #[must_use]
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            Self::ShortRead { .. }
                | Self::MalformedLength
                | Self::UnknownPacketType { .. }
                | Self::TrailingData { .. }
        )
    }

    /// Returns `true` if the packet library rejected a packet.
    #[inline]
    #[must_use]
    pub fn is_packet_error(&self) -> bool {
        matches!(self, Self::PacketDecode { .. } | Self::PacketEncode { .. })
    }

    /// Returns `true` if the underlying connection failed.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::TransportRead(_)
                | Self::TransportWrite(_)
                | Self::WebSocket(_)
                | Self::UnexpectedMessage { .. }
        )
    }

    /// Returns `true` if this is a read timeout.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TransportRead(e) if e.kind() == ErrorKind::TimedOut)
    }
}

// ============================================================================
// CodecError
// ============================================================================

/// An [`enum@Error`] together with the number of bytes moved before it.
///
/// For decoding this is the number of bytes consumed from the source; for
/// encoding, the number of bytes the sink accepted.
#[derive(Error, Debug)]
#[error("{error} ({bytes} bytes)")]
pub struct CodecError {
    /// Bytes consumed or accepted before the failure.
    pub bytes: usize,
    /// The underlying error.
    #[source]
    pub error: Error,
}

impl CodecError {
    /// Creates a codec error.
    #[inline]
    pub fn new(bytes: usize, error: Error) -> Self {
        Self { bytes, error }
    }
}

impl From<CodecError> for Error {
    #[inline]
    fn from(err: CodecError) -> Self {
        err.error
    }
}

// ============================================================================
// PacketError
// ============================================================================

/// Field-level validation failure raised by the packet library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Body ended before a field was complete.
    #[error("Insufficient bytes for {field}")]
    InsufficientBytes {
        /// Field being read.
        field: &'static str,
    },

    /// Body carried bytes after the last field.
    #[error("Unexpected {extra} bytes after last field")]
    TrailingBytes {
        /// Number of unused bytes.
        extra: usize,
    },

    /// Encode buffer is smaller than the encoded packet.
    #[error("Buffer too small: need {needed}, have {available}")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// Fixed header flags not allowed for the packet type.
    #[error("Invalid flags {flags:#06b}")]
    InvalidFlags {
        /// The offending flags nibble.
        flags: u8,
    },

    /// QoS level outside 0..=2.
    #[error("Invalid QoS level {0}")]
    InvalidQos(u8),

    /// Return code outside the packet's allowed set.
    #[error("Invalid return code {0}")]
    InvalidReturnCode(u8),

    /// CONNECT protocol name not recognized.
    #[error("Invalid protocol name {0:?}")]
    InvalidProtocolName(String),

    /// CONNECT protocol level does not match the protocol name.
    #[error("Invalid protocol level {0}")]
    InvalidProtocolLevel(u8),

    /// CONNECT or CONNACK flag combination not allowed.
    #[error("Invalid connect flags {0:#010b}")]
    InvalidConnectFlags(u8),

    /// String field is not valid UTF-8.
    #[error("Invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// Field being read.
        field: &'static str,
    },

    /// String or binary field longer than 65535 bytes.
    #[error("Field too long: {0} bytes")]
    FieldTooLong(usize),

    /// Packet exceeds what the wire format can encode.
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    /// Topic name empty or containing wildcards.
    #[error("Invalid topic {0:?}")]
    InvalidTopic(String),

    /// QoS 1/2 packet or acknowledgement without a packet identifier.
    #[error("Missing packet identifier")]
    MissingPacketId,

    /// SUBSCRIBE, SUBACK or UNSUBSCRIBE with no entries.
    #[error("Empty payload")]
    EmptyPayload,
}

// ============================================================================
// Tests
// ============================================================================
