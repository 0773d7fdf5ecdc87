//! Independent reader and writer.
//!
//! Binds any [`AsyncRead`] and [`AsyncWrite`] that share no connection
//! object: pipes, in-memory buffers, test harnesses. The halves are also
//! reused by the socket transport.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use crate::codec;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::stream::Stream;

use super::{PacketReader, PacketWriter, Transport};

// ============================================================================
// ByteReader
// ============================================================================

/// Decodes frames from a byte source.
pub struct ByteReader<R> {
    /// Buffered source; the codec reads the header byte by byte.
    inner: BufReader<R>,
    /// Deadline for one frame, if any.
    read_timeout: Option<Duration>,
}

impl<R: AsyncRead> ByteReader<R> {
    /// Wraps `source` in a buffered reader.
    #[must_use]
    pub fn new(source: R, read_timeout: Option<Duration>) -> Self {
        Self {
            inner: BufReader::new(source),
            read_timeout,
        }
    }
}

#[async_trait]
impl<P, R> PacketReader<P> for ByteReader<R>
where
    P: Packet,
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn read_packet(&mut self) -> Result<Option<P>> {
        let decode = codec::decode::<P, _>(&mut self.inner);
        let decoded = match self.read_timeout {
            Some(limit) => timeout(limit, decode)
                .await
                .map_err(|_| Error::read_timeout())?,
            None => decode.await,
        }?;

        Ok(decoded.map(|d| d.packet))
    }
}

// ============================================================================
// ByteWriter
// ============================================================================

/// Encodes frames onto a byte sink, flushing after each one.
pub struct ByteWriter<W> {
    inner: W,
}

impl<W> ByteWriter<W> {
    /// Wraps `sink`.
    #[inline]
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self { inner: sink }
    }
}

#[async_trait]
impl<P, W> PacketWriter<P> for ByteWriter<W>
where
    P: Packet,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write_packet(&mut self, packet: &P) -> Result<usize> {
        let bytes = codec::encode(&mut self.inner, packet).await?;
        self.inner.flush().await.map_err(Error::TransportWrite)?;
        Ok(bytes)
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(Error::TransportWrite)
    }
}

// ============================================================================
// BufferTransport
// ============================================================================

/// Transport over an independent byte source and byte sink.
///
/// # Example
///
/// ```ignore
/// use mqtt_stream::transport::BufferTransport;
/// use mqtt_stream::{Stream, StreamOptions};
///
/// let (source, sink) = (tokio::io::stdin(), tokio::io::stdout());
/// let stream: Stream = Stream::open(BufferTransport::new(source, sink), StreamOptions::new());
/// ```
pub struct BufferTransport<R, W> {
    reader: R,
    writer: W,
    read_timeout: Option<Duration>,
}

impl<R, W> BufferTransport<R, W> {
    /// Creates a transport from a source and a sink.
    #[inline]
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            read_timeout: None,
        }
    }

    /// Fails the stream if a frame takes longer than `limit` to arrive.
    #[inline]
    #[must_use]
    pub fn with_read_timeout(mut self, limit: Duration) -> Self {
        self.read_timeout = Some(limit);
        self
    }
}

impl<P, R, W> Transport<P> for BufferTransport<R, W>
where
    P: Packet,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Reader = ByteReader<R>;
    type Writer = ByteWriter<W>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (
            ByteReader::new(self.reader, self.read_timeout),
            ByteWriter::new(self.writer),
        )
    }
}

// ============================================================================
// Stream Constructor
// ============================================================================

impl<P: Packet> Stream<P> {
    /// Creates a stream over an independent source and sink.
    ///
    /// Must be called within a tokio runtime.
    pub fn buffer<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(BufferTransport::new(reader, writer))
    }
}

// ============================================================================
// Tests
// ============================================================================
