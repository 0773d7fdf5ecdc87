//! Frame codec: packets to and from byte sinks and sources.
//!
//! Pure async functions with no lifecycle state. Both report how many bytes
//! they moved, on success and on failure, so callers can tell exactly how far
//! a broken frame got.
//!
//! # Decode Contract
//!
//! | Input | Result | Bytes reported |
//! |-------|--------|----------------|
//! | empty source | `Ok(None)` | 0 |
//! | EOF inside header or length | [`Error::ShortRead`] | bytes read |
//! | 4th length byte has continuation bit | [`Error::MalformedLength`] | 5 (see below) |
//! | type nibble 0 or 15 | [`Error::UnknownPacketType`] | header + length field |
//! | EOF inside body | [`Error::ShortRead`] | header + length + partial body |
//! | body rejected by packet decoder | [`Error::PacketDecode`] | full frame |
//!
//! A malformed length reports all five bytes it read, not zero. The source
//! is not peekable, so those bytes are gone either way and the count says
//! so. Decoders that peek at the length field report zero instead.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{CodecError, Error, PacketError};
use crate::packet::{FixedHeader, MAX_LENGTH_BYTES, MAX_REMAINING_LENGTH, Packet, PacketType};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for the body buffer allocated up front.
///
/// Larger bodies grow the buffer as bytes actually arrive, so a hostile
/// length field cannot force a large allocation.
const BODY_PREALLOC_LIMIT: usize = 64 * 1024;

/// Largest frame the wire format can carry.
const MAX_FRAME_LEN: usize = 1 + MAX_LENGTH_BYTES + MAX_REMAINING_LENGTH;

// ============================================================================
// Decoded
// ============================================================================

/// A successfully decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<P> {
    /// The decoded packet.
    pub packet: P,
    /// Exact frame length consumed from the source.
    pub bytes: usize,
}

// ============================================================================
// Encode
// ============================================================================

/// Serializes `packet` and hands it to `sink` as one logical write.
///
/// The packet is encoded into an in-memory buffer first, so a validation
/// failure never writes anything. The returned count is what the sink
/// accepted, which may still sit in the sink's own buffer; flushing is up to
/// the caller.
///
/// # Errors
///
/// - [`Error::PacketEncode`] with `bytes == 0` if the packet is invalid
/// - [`Error::TransportWrite`] with the bytes accepted before the failure
pub async fn encode<P, W>(sink: &mut W, packet: &P) -> Result<usize, CodecError>
where
    P: Packet,
    W: AsyncWrite + Unpin + ?Sized,
{
    let buf = to_vec(packet).map_err(|e| CodecError::new(0, e))?;

    let mut accepted = 0;
    while accepted < buf.len() {
        match sink.write(&buf[accepted..]).await {
            Ok(0) => {
                return Err(CodecError::new(
                    accepted,
                    Error::TransportWrite(ErrorKind::WriteZero.into()),
                ));
            }
            Ok(n) => accepted += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(CodecError::new(accepted, Error::TransportWrite(e))),
        }
    }

    trace!(packet_type = %packet.packet_type(), bytes = accepted, "Frame encoded");
    Ok(accepted)
}

/// Serializes `packet` into a new buffer of exactly its frame length.
///
/// Oversized packets are rejected before the buffer is allocated.
///
/// # Errors
///
/// Returns [`Error::PacketEncode`] if the packet fails validation.
pub fn to_vec<P: Packet>(packet: &P) -> Result<Vec<u8>, Error> {
    let encode_error = |source| Error::PacketEncode {
        packet_type: packet.packet_type(),
        source,
    };

    let len = packet.encoded_len();
    if len > MAX_FRAME_LEN {
        return Err(encode_error(PacketError::PacketTooLarge(len)));
    }

    let mut buf = vec![0u8; len];
    let written = packet.encode_into(&mut buf).map_err(encode_error)?;
    buf.truncate(written);
    Ok(buf)
}

// ============================================================================
// Decode
// ============================================================================

/// Reads exactly one frame from `source` and decodes it.
///
/// Returns `Ok(None)` if the source was already at end of input. See the
/// module docs for the byte counts reported on failure.
///
/// # Errors
///
/// - [`Error::ShortRead`] if the source ends mid-frame
/// - [`Error::MalformedLength`] if the length field does not terminate
/// - [`Error::UnknownPacketType`] for reserved type nibbles
/// - [`Error::PacketDecode`] if the packet decoder rejects the body
/// - [`Error::TransportRead`] if the source fails
pub async fn decode<P, R>(source: &mut R) -> Result<Option<Decoded<P>>, CodecError>
where
    P: Packet,
    R: AsyncRead + Unpin + ?Sized,
{
    let Some(first) = read_byte(source)
        .await
        .map_err(|e| CodecError::new(0, Error::TransportRead(e)))?
    else {
        return Ok(None);
    };
    let mut consumed = 1;

    let mut remaining_length = 0usize;
    let mut multiplier = 1usize;
    let mut terminated = false;
    for _ in 0..MAX_LENGTH_BYTES {
        let byte = match read_byte(source).await {
            Ok(Some(byte)) => byte,
            Ok(None) => {
                return Err(CodecError::new(
                    consumed,
                    Error::short_read(consumed + 1, consumed),
                ));
            }
            Err(e) => return Err(CodecError::new(consumed, Error::TransportRead(e))),
        };
        consumed += 1;

        remaining_length += usize::from(byte & 0x7F) * multiplier;
        multiplier *= 128;
        if byte & 0x80 == 0 {
            terminated = true;
            break;
        }
    }
    if !terminated {
        return Err(CodecError::new(consumed, Error::MalformedLength));
    }

    let nibble = first >> 4;
    let Some(packet_type) = PacketType::from_nibble(nibble) else {
        return Err(CodecError::new(
            consumed,
            Error::UnknownPacketType { nibble },
        ));
    };
    let header = FixedHeader::new(packet_type, first & 0x0F, remaining_length);

    let mut body = Vec::with_capacity(remaining_length.min(BODY_PREALLOC_LIMIT));
    let read = (&mut *source)
        .take(remaining_length as u64)
        .read_to_end(&mut body)
        .await;
    if let Err(e) = read {
        return Err(CodecError::new(
            consumed + body.len(),
            Error::TransportRead(e),
        ));
    }
    if body.len() < remaining_length {
        let actual = consumed + body.len();
        return Err(CodecError::new(
            actual,
            Error::short_read(consumed + remaining_length, actual),
        ));
    }
    consumed += remaining_length;

    let packet = P::decode(header, &body).map_err(|source: PacketError| {
        CodecError::new(
            consumed,
            Error::PacketDecode {
                packet_type,
                source,
            },
        )
    })?;

    trace!(%packet_type, bytes = consumed, "Frame decoded");
    Ok(Some(Decoded {
        packet,
        bytes: consumed,
    }))
}

/// Reads a single byte, `None` at end of input.
async fn read_byte<R>(source: &mut R) -> std::io::Result<Option<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut byte = [0u8; 1];
    loop {
        match source.read(&mut byte).await {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Error as IoError;

    use tokio::io::BufWriter;
    use tokio_test::io::Builder;

    use crate::packet::{Connack, Connect, ControlPacket};

    async fn decode_bytes(bytes: &[u8]) -> Result<Option<Decoded<ControlPacket>>, CodecError> {
        let mut source = bytes;
        decode(&mut source).await
    }

    fn invalid_connack() -> ControlPacket {
        ControlPacket::Connack(Connack {
            session_present: false,
            return_code: 11,
        })
    }

    #[tokio::test]
    async fn test_encode_to_writer() {
        let packet = ControlPacket::from(Connack::accepted());
        let mut sink = Vec::new();

        let n = encode(&mut sink, &packet).await.unwrap();

        assert_eq!(n, packet.encoded_len());
        assert_eq!(sink, [0x20, 0x02, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_encode_invalid_packet_writes_nothing() {
        // The mock panics on any write.
        let mut sink = Builder::new().build();

        let err = encode(&mut sink, &invalid_connack()).await.unwrap_err();

        assert_eq!(err.bytes, 0);
        assert!(matches!(
            err.error,
            Error::PacketEncode {
                packet_type: PacketType::Connack,
                source: PacketError::InvalidReturnCode(11),
            }
        ));
    }

    #[tokio::test]
    async fn test_encode_buffered_sink_accepts_before_flush_fails() {
        let failing = Builder::new()
            .write_error(IoError::new(ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut sink = BufWriter::new(failing);
        let packet = ControlPacket::from(Connack::accepted());

        let n = encode(&mut sink, &packet).await.unwrap();
        assert_eq!(n, 4);
        assert!(sink.flush().await.is_err());
    }

    #[tokio::test]
    async fn test_encode_direct_sink_error_reports_zero() {
        let failing = Builder::new()
            .write_error(IoError::new(ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut sink = BufWriter::with_capacity(1, failing);
        let packet = ControlPacket::from(Connack::accepted());

        let err = encode(&mut sink, &packet).await.unwrap_err();
        assert_eq!(err.bytes, 0);
        assert!(matches!(err.error, Error::TransportWrite(_)));
    }

    #[tokio::test]
    async fn test_encode_partial_write_then_error() {
        let mut sink = Builder::new()
            .write(&[0x20, 0x02])
            .write_error(IoError::new(ErrorKind::ConnectionReset, "reset"))
            .build();
        let packet = ControlPacket::from(Connack::accepted());

        let err = encode(&mut sink, &packet).await.unwrap_err();
        assert_eq!(err.bytes, 2);
    }

    #[tokio::test]
    async fn test_decode_roundtrip() {
        let packet = ControlPacket::from(Connect::new("roundtrip"));
        let bytes = to_vec(&packet).unwrap();

        let decoded = decode_bytes(&bytes).await.unwrap().unwrap();

        assert_eq!(decoded.bytes, packet.encoded_len());
        assert_eq!(to_vec(&decoded.packet).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_decode_consumes_one_frame_only() {
        let mut bytes = to_vec(&ControlPacket::Pingreq).unwrap();
        bytes.extend(to_vec(&ControlPacket::Pingresp).unwrap());
        let mut source = bytes.as_slice();

        let first = decode::<ControlPacket, _>(&mut source).await.unwrap().unwrap();
        assert_eq!(first.packet, ControlPacket::Pingreq);
        assert_eq!(source, [0xD0, 0x00]);

        let second = decode::<ControlPacket, _>(&mut source).await.unwrap().unwrap();
        assert_eq!(second.packet, ControlPacket::Pingresp);
        assert!(decode::<ControlPacket, _>(&mut source).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decode_empty_source_is_clean_eof() {
        assert!(decode_bytes(&[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decode_truncated_frame() {
        let bytes = to_vec(&ControlPacket::from(Connack::accepted())).unwrap();

        let err = decode_bytes(&bytes[..2]).await.unwrap_err();

        assert_eq!(err.bytes, 2);
        assert!(matches!(
            err.error,
            Error::ShortRead {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_decode_truncated_length_field() {
        let err = decode_bytes(&[0x30, 0x80]).await.unwrap_err();
        assert_eq!(err.bytes, 2);
        assert!(matches!(err.error, Error::ShortRead { .. }));
    }

    /// Claims a frame no buffer could hold; encoding it must not allocate.
    #[derive(Debug)]
    struct Oversized;

    impl Packet for Oversized {
        fn packet_type(&self) -> PacketType {
            PacketType::Publish
        }

        fn encoded_len(&self) -> usize {
            usize::MAX
        }

        fn encode_into(&self, _buf: &mut [u8]) -> Result<usize, PacketError> {
            unreachable!("oversized packets are rejected before encoding")
        }

        fn decode(_header: FixedHeader, _body: &[u8]) -> Result<Self, PacketError> {
            Ok(Self)
        }
    }

    #[test]
    fn test_to_vec_rejects_oversized_before_allocating() {
        let err = to_vec(&Oversized).unwrap_err();
        assert!(matches!(
            err,
            Error::PacketEncode {
                packet_type: PacketType::Publish,
                source: PacketError::PacketTooLarge(usize::MAX),
            }
        ));
    }

    #[tokio::test]
    async fn test_encode_oversized_writes_nothing() {
        let mut sink = Vec::new();
        let err = encode(&mut sink, &Oversized).await.unwrap_err();
        assert_eq!(err.bytes, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_decode_malformed_length() {
        let bytes = [0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
        let mut source = &bytes[..];

        let err = decode::<ControlPacket, _>(&mut source).await.unwrap_err();

        assert_eq!(err.bytes, 5);
        assert!(matches!(err.error, Error::MalformedLength));
        assert_eq!(source, [0x7F]);
    }

    #[tokio::test]
    async fn test_decode_unknown_packet_type() {
        let err = decode_bytes(&[0x00, 0x00]).await.unwrap_err();
        assert_eq!(err.bytes, 2);
        assert!(matches!(err.error, Error::UnknownPacketType { nibble: 0 }));

        let err = decode_bytes(&[0xF0, 0x02, 0x00, 0x00]).await.unwrap_err();
        assert_eq!(err.bytes, 2);
        assert!(matches!(err.error, Error::UnknownPacketType { nibble: 15 }));
    }

    #[tokio::test]
    async fn test_decode_invalid_packet_consumes_frame() {
        let err = decode_bytes(&[0x20, 0x02, 0x00, 0x06]).await.unwrap_err();

        assert_eq!(err.bytes, 4);
        assert!(matches!(
            err.error,
            Error::PacketDecode {
                packet_type: PacketType::Connack,
                source: PacketError::InvalidReturnCode(6),
            }
        ));
    }

    #[tokio::test]
    async fn test_decode_read_error_mid_body() {
        let mut source = Builder::new()
            .read(&[0x20, 0x02, 0x00])
            .read_error(IoError::new(ErrorKind::ConnectionReset, "reset"))
            .build();

        let err = decode::<ControlPacket, _>(&mut source).await.unwrap_err();

        assert_eq!(err.bytes, 3);
        assert!(matches!(err.error, Error::TransportRead(_)));
    }

    #[tokio::test]
    async fn test_decode_large_body() {
        let packet = ControlPacket::from(crate::packet::Publish::new("big", vec![7u8; 100_000]));
        let bytes = to_vec(&packet).unwrap();

        let decoded = decode_bytes(&bytes).await.unwrap().unwrap();

        assert_eq!(decoded.bytes, bytes.len());
        assert_eq!(decoded.packet, packet);
    }
}
