//! WebSocket transport.
//!
//! Each frame travels in exactly one binary message, and each binary message
//! must hold exactly one frame.
//!
//! | Message | Handling |
//! |---------|----------|
//! | Binary | Decoded as one frame; leftover bytes fail the stream |
//! | Text | Fails the stream |
//! | Ping / Pong | Skipped |
//! | Close | Clean end of input |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use crate::codec;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::stream::Stream;

use super::{PacketReader, PacketWriter, Transport};

// ============================================================================
// WebSocketReader
// ============================================================================

/// Reading half of a WebSocket transport.
pub struct WebSocketReader<S> {
    inner: SplitStream<WebSocketStream<S>>,
    read_timeout: Option<Duration>,
}

impl<S> WebSocketReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Waits for the next binary message and decodes it.
    async fn next_packet<P: Packet>(&mut self) -> Result<Option<P>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return decode_message(&data).await.map(Some);
                }
                Some(Ok(Message::Text(_))) => {
                    return Err(Error::unexpected_message("text"));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return Ok(None);
                }
                Some(Ok(_)) => {
                    trace!("Skipping control message");
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl<P, S> PacketReader<P> for WebSocketReader<S>
where
    P: Packet,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_packet(&mut self) -> Result<Option<P>> {
        match self.read_timeout {
            Some(limit) => timeout(limit, self.next_packet::<P>())
                .await
                .map_err(|_| Error::read_timeout())?,
            None => self.next_packet::<P>().await,
        }
    }
}

/// Decodes a message that must hold exactly one frame.
async fn decode_message<P: Packet>(data: &[u8]) -> Result<P> {
    let mut source = data;

    match codec::decode::<P, _>(&mut source).await? {
        Some(decoded) if source.is_empty() => Ok(decoded.packet),
        Some(_) => Err(Error::TrailingData {
            extra: source.len(),
        }),
        None => Err(Error::short_read(1, 0)),
    }
}

// ============================================================================
// WebSocketWriter
// ============================================================================

/// Writing half of a WebSocket transport.
pub struct WebSocketWriter<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<P, S> PacketWriter<P> for WebSocketWriter<S>
where
    P: Packet,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_packet(&mut self, packet: &P) -> Result<usize> {
        let buf = codec::to_vec(packet)?;
        let bytes = buf.len();
        self.inner.send(Message::Binary(buf.into())).await?;
        Ok(bytes)
    }

    async fn close(&mut self) -> Result<()> {
        match self.inner.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over an established WebSocket connection.
pub struct WebSocketTransport<S> {
    ws: WebSocketStream<S>,
    read_timeout: Option<Duration>,
}

impl<S> WebSocketTransport<S> {
    /// Wraps an established connection.
    #[inline]
    #[must_use]
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self {
            ws,
            read_timeout: None,
        }
    }

    /// Fails the stream if a message takes longer than `limit` to arrive.
    #[inline]
    #[must_use]
    pub fn with_read_timeout(mut self, limit: Duration) -> Self {
        self.read_timeout = Some(limit);
        self
    }
}

impl<P, S> Transport<P> for WebSocketTransport<S>
where
    P: Packet,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WebSocketReader<S>;
    type Writer = WebSocketWriter<S>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.ws.split();
        (
            WebSocketReader {
                inner: stream,
                read_timeout: self.read_timeout,
            },
            WebSocketWriter { inner: sink },
        )
    }
}

// ============================================================================
// Stream Constructors
// ============================================================================

impl<P: Packet> Stream<P> {
    /// Creates a stream over an established WebSocket connection.
    ///
    /// Must be called within a tokio runtime.
    pub fn websocket<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(WebSocketTransport::new(ws))
    }
}

/// Opens a WebSocket connection to `url` and binds a stream to it.
///
/// # Errors
///
/// - [`Error::Config`] if `url` is not a `ws://` or `wss://` URL
/// - [`Error::Connection`] if the handshake fails
pub async fn connect<P: Packet>(url: &str) -> Result<Stream<P>> {
    let url = Url::parse(url).map_err(|e| Error::config(format!("Invalid URL '{url}': {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(Error::config(format!(
            "Unsupported URL scheme '{}'",
            url.scheme()
        )));
    }

    let (ws, response): (WebSocketStream<MaybeTlsStream<TcpStream>>, _) =
        tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

    debug!(%url, status = %response.status(), "WebSocket connection established");

    Ok(Stream::websocket(ws))
}

/// Completes the server side of a WebSocket handshake on `stream`.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the upgrade fails.
pub async fn accept<P: Packet>(stream: TcpStream) -> Result<Stream<P>> {
    let peer = stream.peer_addr().ok();

    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

    debug!(?peer, "WebSocket connection accepted");

    Ok(Stream::websocket(ws))
}

// ============================================================================
// Tests
// ============================================================================
