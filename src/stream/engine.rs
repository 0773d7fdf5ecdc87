//! Stream lifecycle engine.
//!
//! A [`Stream`] spawns two tokio tasks when it is created:
//!
//! - **Receive loop**: decodes frames from the transport's reading half and
//!   publishes them on the receive channel.
//! - **Writer task**: owns the writing half and serves both [`Stream::send`]
//!   and the [`Stream::outgoing`] queue, so frames never interleave.
//!
//! Every way a stream can end (caller close, receive failure, write failure,
//! peer EOF) goes through one terminate-once transition. It latches the
//! first error, flips the closed flag and wakes both tasks, which then drop
//! the receive channel sender and close the transport.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::packet::{ControlPacket, Packet};
use crate::transport::{PacketReader, PacketWriter, Transport};

use super::options::StreamOptions;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for closing the transport after termination.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Shared State
// ============================================================================

/// Terminal state, mutated only by [`Shared::transition`].
#[derive(Default)]
struct TerminalState {
    closed: bool,
    error: Option<Arc<Error>>,
    /// Set by a caller close; packets still buffered are dropped.
    discard_incoming: bool,
}

/// State shared between the handle and both tasks.
struct Shared {
    state: Mutex<TerminalState>,
    /// Flips to `true` once, on termination.
    done: watch::Sender<bool>,
}

impl Shared {
    fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            state: Mutex::new(TerminalState::default()),
            done,
        }
    }

    /// Ends the stream from inside. Returns `false` if it had already ended.
    fn terminate(&self, cause: Option<Error>) -> bool {
        self.transition(cause, false)
    }

    /// Ends the stream on the caller's request and discards buffered packets,
    /// even if it had already ended.
    fn close(&self) -> bool {
        self.transition(None, true)
    }

    /// The terminate-once transition.
    ///
    /// A cause arriving after termination is logged and dropped.
    fn transition(&self, cause: Option<Error>, discard_incoming: bool) -> bool {
        {
            let mut state = self.state.lock();
            state.discard_incoming |= discard_incoming;
            if state.closed {
                if let Some(error) = cause {
                    debug!(%error, "Discarding error after termination");
                }
                return false;
            }

            state.closed = true;
            match cause {
                Some(error) => {
                    warn!(%error, "Stream failed");
                    state.error = Some(Arc::new(error));
                }
                None => debug!("Stream closed"),
            }
        }

        self.done.send_replace(true);
        true
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn error(&self) -> Option<Arc<Error>> {
        self.state.lock().error.clone()
    }

    /// Hands a decoded packet to the receive channel unless the stream has
    /// already terminated.
    fn deliver<P>(&self, permit: mpsc::Permit<'_, P>, packet: P) -> bool {
        let state = self.state.lock();
        if state.closed {
            return false;
        }
        permit.send(packet);
        true
    }

    fn discards_incoming(&self) -> bool {
        self.state.lock().discard_incoming
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }
}

/// Closes the receive channel and drops whatever it still buffers.
fn discard<P>(incoming: &mut mpsc::Receiver<P>) {
    incoming.close();
    let mut dropped = 0usize;
    while incoming.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(dropped, "Discarded buffered packets on close");
    }
}

/// Resolves once the stream has terminated.
async fn terminated(done: &mut watch::Receiver<bool>) {
    // The sender lives in `Shared`, which outlives every receiver.
    let _ = done.wait_for(|closed| *closed).await;
}

// ============================================================================
// SendRequest
// ============================================================================

/// A [`Stream::send`] call waiting for the writer task.
struct SendRequest<P> {
    packet: P,
    result_tx: oneshot::Sender<bool>,
}

// ============================================================================
// Stream
// ============================================================================

/// Duplex packet stream over one transport.
///
/// # Thread Safety
///
/// `Stream` is `Send + Sync`; share it behind an [`Arc`] to send, receive
/// and close from different tasks. Dropping the stream closes it.
///
/// # Example
///
/// ```ignore
/// use mqtt_stream::{Connect, ControlPacket, Stream};
///
/// let tcp = tokio::net::TcpStream::connect("127.0.0.1:1883").await?;
/// let stream: Stream = Stream::socket(tcp);
///
/// stream.send(Connect::new("client").into()).await;
/// while let Some(packet) = stream.recv().await {
///     println!("{packet:?}");
/// }
/// if let Some(error) = stream.error() {
///     eprintln!("stream failed: {error}");
/// }
/// ```
pub struct Stream<P: Packet = ControlPacket> {
    /// Terminal state and completion signal.
    shared: Arc<Shared>,
    /// Receive channel; `None` from it marks termination.
    incoming: tokio::sync::Mutex<mpsc::Receiver<P>>,
    /// Synchronous send path into the writer task.
    requests: mpsc::UnboundedSender<SendRequest<P>>,
    /// Asynchronous send path into the writer task.
    outgoing: mpsc::Sender<P>,
}

impl<P: Packet> Stream<P> {
    /// Binds a stream to `transport` with default options.
    ///
    /// Must be called within a tokio runtime.
    pub fn new<T: Transport<P>>(transport: T) -> Self {
        Self::open(transport, StreamOptions::new())
    }

    /// Binds a stream to `transport` and starts its tasks.
    ///
    /// Must be called within a tokio runtime.
    pub fn open<T: Transport<P>>(transport: T, options: StreamOptions) -> Self {
        let (reader, writer) = transport.split();

        let (incoming_tx, incoming_rx) = mpsc::channel(options.incoming_capacity.max(1));
        let (outgoing_tx, outgoing_rx) = mpsc::channel(options.outgoing_capacity.max(1));
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new());

        tokio::spawn(Self::run_receive_loop(
            reader,
            incoming_tx,
            Arc::clone(&shared),
        ));
        tokio::spawn(Self::run_writer(
            writer,
            requests_rx,
            outgoing_rx,
            Arc::clone(&shared),
        ));

        debug!(
            incoming_capacity = options.incoming_capacity,
            outgoing_capacity = options.outgoing_capacity,
            "Stream opened"
        );

        Self {
            shared,
            incoming: tokio::sync::Mutex::new(incoming_rx),
            requests: requests_tx,
            outgoing: outgoing_tx,
        }
    }

    /// Receives the next packet.
    ///
    /// Packets arrive in wire order. Returns `None` once the stream has
    /// terminated: immediately after [`close`](Self::close), otherwise once
    /// every packet decoded before a peer EOF or failure has been taken. Call
    /// [`error`](Self::error) to tell a failure from a clean close.
    pub async fn recv(&self) -> Option<P> {
        let mut incoming = self.incoming.lock().await;
        if self.shared.discards_incoming() {
            discard(&mut incoming);
            return None;
        }
        incoming.recv().await
    }

    /// Encodes and writes one packet.
    ///
    /// Returns `true` if the packet was written and flushed before the stream
    /// terminated. Returns `false` without writing if the stream is already
    /// closed. A failed encode or write terminates the stream.
    pub async fn send(&self, packet: P) -> bool {
        if self.is_closed() {
            return false;
        }

        let (result_tx, result_rx) = oneshot::channel();
        if self
            .requests
            .send(SendRequest { packet, result_tx })
            .is_err()
        {
            return false;
        }

        result_rx.await.unwrap_or(false)
    }

    /// Returns a sender for the asynchronous send path.
    ///
    /// Queued packets are written in order by the writer task. A failure
    /// terminates the stream like a receive failure; the queue then rejects
    /// further packets.
    #[inline]
    #[must_use]
    pub fn outgoing(&self) -> mpsc::Sender<P> {
        self.outgoing.clone()
    }

    /// Closes the stream.
    ///
    /// Idempotent and safe to call concurrently with in-flight sends and
    /// receives. Does not record an error. Packets decoded but not yet
    /// received are dropped, so every later [`recv`](Self::recv) returns
    /// `None`.
    pub fn close(&self) {
        if self.shared.close() {
            debug!("Stream closed by caller");
        }

        // A receiver held by an in-flight recv() is drained by the next one.
        if let Ok(mut incoming) = self.incoming.try_lock() {
            discard(&mut incoming);
        }
    }

    /// Returns `true` once the stream has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Returns the error that terminated the stream, if any.
    ///
    /// `None` while open and after a clean close; set at most once.
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<Arc<Error>> {
        self.shared.error()
    }

    /// Waits until the stream has terminated.
    ///
    /// Any number of tasks may wait; returns immediately if already closed.
    pub async fn closed(&self) {
        terminated(&mut self.shared.subscribe()).await;
    }

    /// Receive loop: decodes frames until EOF, failure or termination.
    async fn run_receive_loop<R: PacketReader<P>>(
        mut reader: R,
        incoming_tx: mpsc::Sender<P>,
        shared: Arc<Shared>,
    ) {
        let mut done = shared.subscribe();

        loop {
            // Wait for room before reading, so a slow consumer holds back the
            // transport instead of a growing queue.
            let permit = tokio::select! {
                biased;
                () = terminated(&mut done) => break,
                permit = incoming_tx.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        debug!("Receive channel dropped");
                        shared.terminate(None);
                        break;
                    }
                },
            };

            let result = tokio::select! {
                biased;
                () = terminated(&mut done) => break,
                result = reader.read_packet() => result,
            };

            match result {
                Ok(Some(packet)) => {
                    let packet_type = packet.packet_type();
                    if !shared.deliver(permit, packet) {
                        debug!(%packet_type, "Dropping packet decoded after termination");
                        break;
                    }
                    trace!(%packet_type, "Packet received");
                }
                Ok(None) => {
                    debug!("Transport reached end of input");
                    shared.terminate(None);
                    break;
                }
                Err(e) => {
                    shared.terminate(Some(e));
                    break;
                }
            }
        }

        debug!("Receive loop terminated");
    }

    /// Writer task: serializes both send paths onto the transport.
    async fn run_writer<W: PacketWriter<P>>(
        mut writer: W,
        mut requests: mpsc::UnboundedReceiver<SendRequest<P>>,
        mut outgoing: mpsc::Receiver<P>,
        shared: Arc<Shared>,
    ) {
        let mut done = shared.subscribe();

        loop {
            let (packet, result_tx) = tokio::select! {
                biased;
                () = terminated(&mut done) => break,
                Some(request) = requests.recv() => (request.packet, Some(request.result_tx)),
                Some(packet) = outgoing.recv() => (packet, None),
            };

            let written = tokio::select! {
                biased;
                () = terminated(&mut done) => break,
                written = writer.write_packet(&packet) => written,
            };

            match written {
                Ok(bytes) => {
                    trace!(packet_type = %packet.packet_type(), bytes, "Packet sent");
                    if let Some(tx) = result_tx {
                        let _ = tx.send(true);
                    }
                }
                Err(e) => {
                    shared.terminate(Some(e));
                    if let Some(tx) = result_tx {
                        let _ = tx.send(false);
                    }
                    break;
                }
            }
        }

        // Pending send() calls observe their dropped result channel as failure.
        requests.close();
        outgoing.close();

        match timeout(CLOSE_TIMEOUT, writer.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Transport close failed"),
            Err(_) => debug!(
                timeout_ms = CLOSE_TIMEOUT.as_millis() as u64,
                "Transport close timed out"
            ),
        }

        debug!("Writer task terminated");
    }
}

impl<P: Packet> Drop for Stream<P> {
    fn drop(&mut self) {
        // The handle is the only owner of the send paths and the receive
        // channel, so nothing can observe the stream after this.
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
