//! MQTT Stream - transport-agnostic duplex packet stream.
//!
//! This library binds MQTT control packets to a byte transport and exposes
//! them as a single duplex [`Stream`]: a receive channel fed by a background
//! decode loop, a synchronous and an asynchronous send path, and a
//! terminate-once close that records the first error.
//!
//! # Architecture
//!
//! - **Codec**: frames packets as header byte, variable-length remaining
//!   length and body. Every decode reports how many bytes it consumed.
//! - **Stream**: owns one receive task and one writer task per transport.
//! - **Transports**: TCP sockets, WebSocket connections (one frame per
//!   binary message) and independent reader/writer pairs.
//!
//! # Quick Start
//!
//! ```no_run
//! use mqtt_stream::{Connect, ControlPacket, Result, Stream};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let stream: Stream = mqtt_stream::transport::socket::connect("127.0.0.1:1883").await?;
//!
//!     stream.send(Connect::new("sensor-1").into()).await;
//!
//!     while let Some(packet) = stream.recv().await {
//!         if let ControlPacket::Connack(connack) = packet {
//!             println!("connected: {:?}", connack.code());
//!             break;
//!         }
//!     }
//!
//!     stream.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`codec`] | Frame encoder and decoder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`packet`] | [`Packet`] capability and MQTT 3.1.1 control packets |
//! | [`stream`] | [`Stream`] lifecycle and [`StreamOptions`] |
//! | [`transport`] | Buffer, socket and WebSocket adapters |

// ============================================================================
// Modules
// ============================================================================

/// Frame encoder and decoder.
pub mod codec;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Packet capability and the MQTT 3.1.1 control packet family.
pub mod packet;

/// Duplex packet stream.
pub mod stream;

/// Transport adapters.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{CodecError, Error, PacketError, Result};

// Packet types
pub use packet::{
    Connack, ConnackCode, Connect, ControlPacket, FixedHeader, Packet, PacketType, Publish, QoS,
    Suback, SubackCode, Subscribe, Subscription, Unsubscribe, Will,
};

// Stream types
pub use stream::{Stream, StreamOptions};
