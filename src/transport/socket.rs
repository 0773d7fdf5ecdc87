//! TCP socket transport.

use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::stream::Stream;

use super::Transport;
use super::buffer::{ByteReader, ByteWriter};

// ============================================================================
// SocketTransport
// ============================================================================

/// Transport over a connected TCP socket.
///
/// Closing the stream shuts down the write side, which the peer observes as
/// EOF.
pub struct SocketTransport {
    stream: TcpStream,
    read_timeout: Option<Duration>,
}

impl SocketTransport {
    /// Wraps a connected socket.
    #[inline]
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
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

impl<P: Packet> Transport<P> for SocketTransport {
    type Reader = ByteReader<OwnedReadHalf>;
    type Writer = ByteWriter<OwnedWriteHalf>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (read_half, write_half) = self.stream.into_split();
        (
            ByteReader::new(read_half, self.read_timeout),
            ByteWriter::new(write_half),
        )
    }
}

// ============================================================================
// Stream Constructors
// ============================================================================

impl<P: Packet> Stream<P> {
    /// Creates a stream over a connected TCP socket.
    ///
    /// Must be called within a tokio runtime.
    pub fn socket(stream: TcpStream) -> Self {
        Self::new(SocketTransport::new(stream))
    }
}

/// Dials `addr` and binds a stream to the connection.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the connection cannot be established.
pub async fn connect<P: Packet>(addr: impl ToSocketAddrs) -> Result<Stream<P>> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::connection(format!("TCP connect failed: {e}")))?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
    if let Ok(peer) = stream.peer_addr() {
        debug!(%peer, "TCP connection established");
    }

    Ok(Stream::socket(stream))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::codec;
    use crate::packet::{Connack, Connect, ControlPacket, Publish};

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), server.unwrap().0)
    }

    #[tokio::test]
    async fn test_socket_exchange() {
        let (client, server) = tcp_pair().await;
        let client: Stream = Stream::socket(client);
        let server: Stream = Stream::socket(server);

        assert!(client.send(Connect::new("test").into()).await);
        let received = server.recv().await.unwrap();
        assert!(matches!(received, ControlPacket::Connect(ref c) if c.client_id == "test"));

        assert!(server.send(Connack::accepted().into()).await);
        assert_eq!(
            client.recv().await,
            Some(ControlPacket::Connack(Connack::accepted()))
        );

        client.close();
        assert!(server.recv().await.is_none());
        assert!(server.error().is_none());
        assert!(client.error().is_none());
    }

    #[tokio::test]
    async fn test_socket_outgoing() {
        let (client, server) = tcp_pair().await;
        let client: Stream = Stream::socket(client);
        let server: Stream = Stream::socket(server);

        let outgoing = client.outgoing();
        for i in 0..3u8 {
            outgoing
                .send(Publish::new("a/b", vec![i]).into())
                .await
                .unwrap();
        }

        for i in 0..3u8 {
            match server.recv().await {
                Some(ControlPacket::Publish(p)) => assert_eq!(p.payload, vec![i]),
                other => panic!("unexpected packet: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_socket_encode_error() {
        let (client, mut server) = tcp_pair().await;
        let client: Stream = Stream::socket(client);

        let invalid = ControlPacket::Connack(Connack {
            session_present: false,
            return_code: 11,
        });
        assert!(!client.send(invalid).await);

        client.closed().await;
        assert!(client.error().is_some_and(|e| e.is_packet_error()));

        // Nothing reached the wire before the socket closed.
        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_socket_decode_error() {
        let (client, mut server) = tcp_pair().await;
        let client: Stream = Stream::socket(client);

        server.write_all(&[0x00, 0x00]).await.unwrap();

        assert!(client.recv().await.is_none());
        assert!(matches!(
            client.error().as_deref(),
            Some(Error::UnknownPacketType { nibble: 0 })
        ));
    }

    #[tokio::test]
    async fn test_socket_truncated_by_peer() {
        let (client, mut server) = tcp_pair().await;
        let client: Stream = Stream::socket(client);

        let frame = codec::to_vec(&ControlPacket::from(Publish::new("t", b"payload".to_vec())))
            .unwrap();
        server.write_all(&frame[..frame.len() - 2]).await.unwrap();
        drop(server);

        assert!(client.recv().await.is_none());
        assert!(matches!(
            client.error().as_deref(),
            Some(Error::ShortRead { .. })
        ));
    }

    #[tokio::test]
    async fn test_socket_read_timeout() {
        let (client, _server) = tcp_pair().await;
        let transport = SocketTransport::new(client).with_read_timeout(Duration::from_millis(20));
        let client: Stream = Stream::new(transport);

        client.closed().await;
        assert!(client.error().is_some_and(|e| e.is_timeout()));
    }

    #[tokio::test]
    async fn test_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, accepted) = tokio::join!(connect::<ControlPacket>(addr), listener.accept());
        let client = client.unwrap();
        let server: Stream = Stream::socket(accepted.unwrap().0);

        assert!(client.send(ControlPacket::Pingreq).await);
        assert_eq!(server.recv().await, Some(ControlPacket::Pingreq));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with no listener.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let result = connect::<ControlPacket>(addr).await;
        assert!(matches!(result, Err(Error::Connection { .. })));
    }
}
