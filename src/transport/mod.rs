//! Transport adapters.
//!
//! A transport is split once into a reading half, owned by the stream's
//! receive loop, and a writing half, owned by its writer task. Neither half
//! holds a reference back to the stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │         Stream           │
//! │                          │        ┌──────────────────────┐
//! │  receive loop ──────────────────► │ PacketReader         │
//! │                          │        │  (bytes → frames)    │
//! │  writer task ───────────────────► │ PacketWriter         │
//! │   ▲            ▲         │        │  (frames → bytes)    │
//! │   │ send()     │ outgoing│        └──────────────────────┘
//! └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `buffer` | Independent `AsyncRead` / `AsyncWrite` pair |
//! | `socket` | TCP socket |
//! | `websocket` | WebSocket connection, one frame per binary message |

// ============================================================================
// Submodules
// ============================================================================

/// Independent reader and writer.
pub mod buffer;

/// TCP socket transport.
pub mod socket;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::packet::Packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use buffer::{BufferTransport, ByteReader, ByteWriter};
pub use socket::SocketTransport;
pub use websocket::{WebSocketReader, WebSocketTransport, WebSocketWriter};

// ============================================================================
// Traits
// ============================================================================

/// A connection a [`Stream`](crate::Stream) can be bound to.
pub trait Transport<P: Packet>: Send + 'static {
    /// Reading half.
    type Reader: PacketReader<P>;
    /// Writing half.
    type Writer: PacketWriter<P>;

    /// Splits the transport into its two halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Reading half of a transport.
#[async_trait]
pub trait PacketReader<P: Packet>: Send + 'static {
    /// Reads the next packet.
    ///
    /// Returns `Ok(None)` when the peer closed cleanly with no partial frame
    /// pending.
    async fn read_packet(&mut self) -> Result<Option<P>>;
}

/// Writing half of a transport.
#[async_trait]
pub trait PacketWriter<P: Packet>: Send + 'static {
    /// Encodes and transmits one packet, returning the frame length.
    ///
    /// Invalid packets fail before any byte reaches the transport.
    async fn write_packet(&mut self, packet: &P) -> Result<usize>;

    /// Closes the transport. Must tolerate being called after a failure.
    async fn close(&mut self) -> Result<()>;
}
