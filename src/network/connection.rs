//! Connection state machine
//!
//! Owns the socket for one logical connection and drives the
//! connect / receive / send / disconnect / reconnect transitions.
//! All user-visible notifications are delivered through a single event
//! channel per connection, so the consumer never observes two callbacks
//! concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{pick_addr, resolve_host, NetworkConfig};
use crate::protocol::{FrameDecoder, Packet};

/// Lifecycle phase of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No socket, no background activity
    Idle,
    /// A caller-initiated connect attempt is in flight
    Connecting,
    /// Socket is live, receive loop running
    Connected,
    /// Teardown in progress
    Disconnecting,
    /// Retry loop is attempting to restore the link
    Reconnecting,
    /// Socket was torn down by an error; waiting on the caller
    Faulted,
}

/// Events emitted by a connection.
///
/// Status events fire only when the status actually changes; identical
/// repeated transitions are suppressed.
#[derive(Debug, Clone)]
pub enum NetEvent {
    /// A caller-initiated connect completed
    Connected,
    /// The connection was shut down by the caller
    Disconnected,
    /// The retry loop restored the link
    Reconnected,
    /// The socket was torn down by an error
    Error { message: String },
    /// A complete inbound frame, in wire order
    Message { id: i32, body: Bytes },
}

/// A resilient connection to one (host, port).
///
/// The socket handle is owned exclusively by background tasks spawned by
/// this type; it is replaced, never shared, across reconnect attempts.
pub struct NetConnection {
    shared: Arc<Shared>,
    event_rx: Mutex<Option<mpsc::Receiver<NetEvent>>>,
}

struct Shared {
    host: String,
    port: u16,
    config: NetworkConfig,
    /// Single source of truth for socket usability. Set before the
    /// handle is torn down so concurrent send/receive paths stop using
    /// it mid-teardown.
    released: AtomicBool,
    /// True while the retry loop is active. Errors are not surfaced to
    /// the caller while this holds.
    reconnecting: AtomicBool,
    event_tx: mpsc::Sender<NetEvent>,
    inner: Mutex<Inner>,
}

struct Inner {
    status: ConnectionStatus,
    last_error: Option<String>,
    /// Outbound frame queue of the live I/O task, if any
    send_tx: Option<mpsc::Sender<Bytes>>,
    /// Cancels the live I/O task
    io_cancel: CancellationToken,
    /// Cancels in-flight connect/reconnect work
    retry_cancel: CancellationToken,
}

impl NetConnection {
    /// Create a connection for (host, port). No I/O happens until
    /// [`connect`](Self::connect) is called.
    pub fn new(host: impl Into<String>, port: u16, config: NetworkConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_size);

        Self {
            shared: Arc::new(Shared {
                host: host.into(),
                port,
                config,
                released: AtomicBool::new(true),
                reconnecting: AtomicBool::new(false),
                event_tx,
                inner: Mutex::new(Inner {
                    status: ConnectionStatus::Idle,
                    last_error: None,
                    send_tx: None,
                    io_cancel: CancellationToken::new(),
                    retry_cancel: CancellationToken::new(),
                }),
            }),
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Take the event receiver (can only be called once)
    pub async fn take_event_receiver(&self) -> Option<mpsc::Receiver<NetEvent>> {
        self.event_rx.lock().await.take()
    }

    /// Remote host this connection targets
    pub fn host(&self) -> &str {
        &self.shared.host
    }

    /// Remote port this connection targets
    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// Current lifecycle phase
    pub async fn status(&self) -> ConnectionStatus {
        self.shared.inner.lock().await.status
    }

    /// Whether a live socket is installed
    pub async fn is_connected(&self) -> bool {
        !self.shared.released.load(Ordering::SeqCst)
            && self.shared.inner.lock().await.status == ConnectionStatus::Connected
    }

    /// Whether the retry loop is active
    pub fn is_reconnecting(&self) -> bool {
        self.shared.reconnecting.load(Ordering::SeqCst)
    }

    /// Message of the most recent error, if any
    pub async fn last_error(&self) -> Option<String> {
        self.shared.inner.lock().await.last_error.clone()
    }

    /// Start a connect attempt in the background.
    ///
    /// Only one attempt may be outstanding; calling this while one is
    /// pending cancels the pending attempt. The outcome arrives as a
    /// [`NetEvent::Connected`] or [`NetEvent::Error`] event.
    pub async fn connect(&self) {
        let cancel = self.shared.begin_retry().await;
        self.shared
            .set_status(ConnectionStatus::Connecting, None)
            .await;

        tracing::info!("connecting to {}:{}", self.shared.host, self.shared.port);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let attempt = tokio::time::timeout(
                shared.config.connect_timeout(),
                try_connect(shared.host.clone(), shared.port),
            );
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = attempt => result,
            };
            match result {
                Ok(Ok(stream)) => {
                    shared.clone().install_stream(stream).await;
                    shared
                        .set_status(ConnectionStatus::Connected, Some(NetEvent::Connected))
                        .await;
                    tracing::info!("connected to {}:{}", shared.host, shared.port);
                }
                Ok(Err(e)) => shared.error_occurred(e.to_string()).await,
                Err(_) => shared.error_occurred("connect attempt timed out").await,
            }
        });
    }

    /// Start the reconnect loop. Idempotent: a second call while the
    /// loop is active is a no-op.
    ///
    /// The loop releases the current socket, then retries at a fixed
    /// cadence until the link is restored or [`disconnect`](Self::disconnect)
    /// is called. Failures inside the loop are silent; the only events it
    /// emits are [`NetEvent::Reconnected`] on success.
    pub async fn reconnect(&self) {
        let shared = &self.shared;
        if shared
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        shared.release_socket().await;
        let cancel = shared.begin_retry().await;
        shared
            .set_status(ConnectionStatus::Reconnecting, None)
            .await;

        tracing::info!(
            "reconnecting to {}:{} every {}ms",
            shared.host,
            shared.port,
            shared.config.reconnect_interval_ms
        );

        let shared = shared.clone();
        tokio::spawn(async move {
            shared.run_reconnect(cancel).await;
        });
    }

    /// Release the socket, cancel any in-flight connect/reconnect work
    /// and report [`NetEvent::Disconnected`]. Safe to call from any
    /// state, including already-disconnected; never blocks on in-flight
    /// operations.
    pub async fn disconnect(&self) {
        let shared = &self.shared;
        shared
            .set_status(ConnectionStatus::Disconnecting, None)
            .await;
        shared.release_socket().await;
        shared.inner.lock().await.retry_cancel.cancel();
        shared.reconnecting.store(false, Ordering::SeqCst);
        shared
            .set_status(ConnectionStatus::Idle, Some(NetEvent::Disconnected))
            .await;

        tracing::info!("disconnected from {}:{}", shared.host, shared.port);
    }

    /// Enqueue a packet for transmission.
    ///
    /// Writes are serialized through the connection's single I/O task,
    /// so concurrent sends never interleave frame bytes on the wire. If
    /// the socket is released this either surfaces an error (idle) or
    /// drops the frame silently (reconnecting; callers retry once the
    /// link is back - there is no outbound replay queue).
    pub async fn send(&self, packet: Packet) {
        let shared = &self.shared;
        if shared.released.load(Ordering::SeqCst) {
            if !shared.reconnecting.load(Ordering::SeqCst) {
                shared
                    .error_occurred("socket has already been released")
                    .await;
            }
            return;
        }

        let send_tx = shared.inner.lock().await.send_tx.clone();
        match send_tx {
            Some(tx) => {
                if tx.send(packet.encode()).await.is_err() {
                    shared.error_occurred("send queue closed").await;
                }
            }
            // Released between the flag check and the queue lookup
            None => {
                if !shared.reconnecting.load(Ordering::SeqCst) {
                    shared
                        .error_occurred("socket has already been released")
                        .await;
                }
            }
        }
    }
}

impl Shared {
    /// Cancel any pending connect/reconnect work and hand out a fresh
    /// cancellation token for the next attempt.
    async fn begin_retry(&self) -> CancellationToken {
        let mut inner = self.inner.lock().await;
        inner.retry_cancel.cancel();
        inner.retry_cancel = CancellationToken::new();
        inner.retry_cancel.clone()
    }

    /// Transition to `status`, emitting `event` only if the status
    /// actually changed. Repeated identical transitions are silent.
    async fn set_status(&self, status: ConnectionStatus, event: Option<NetEvent>) {
        let changed = {
            let mut inner = self.inner.lock().await;
            if inner.status == status {
                false
            } else {
                inner.status = status;
                true
            }
        };
        if !changed {
            return;
        }
        if let Some(event) = event {
            let _ = self.event_tx.send(event).await;
        }
    }

    /// Tear down the current socket, if any. Idempotent.
    ///
    /// The released flag flips first; the I/O task observes the
    /// cancellation afterwards and performs a best-effort graceful
    /// shutdown before dropping the handle.
    async fn release_socket(&self) {
        self.released.store(true, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        inner.send_tx = None;
        inner.io_cancel.cancel();
    }

    /// Funnel for every failure: always releases the socket, then
    /// surfaces the error unless a reconnection is in progress (failures
    /// are expected and retried there).
    async fn error_occurred(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}:{} error: {}", self.host, self.port, message);

        self.release_socket().await;
        self.inner.lock().await.last_error = Some(message.clone());

        if !self.reconnecting.load(Ordering::SeqCst) {
            self.set_status(ConnectionStatus::Faulted, Some(NetEvent::Error { message }))
                .await;
        }
    }

    /// Adopt a freshly connected stream: replace any stale I/O task,
    /// clear the released flag and start the receive loop.
    async fn install_stream(self: Arc<Self>, stream: TcpStream) {
        let (rd, wr) = stream.into_split();
        let (send_tx, send_rx) = mpsc::channel(self.config.send_queue_size);
        let io_cancel = CancellationToken::new();

        {
            let mut inner = self.inner.lock().await;
            inner.io_cancel.cancel();
            inner.io_cancel = io_cancel.clone();
            inner.send_tx = Some(send_tx);
            inner.last_error = None;
        }
        self.released.store(false, Ordering::SeqCst);

        tokio::spawn(self.run_io(rd, wr, send_rx, io_cancel));
    }

    /// The per-socket I/O task: single receive loop plus serialized
    /// writer. Inbound frames are dispatched in wire order; the loop
    /// re-arms only after the previous frame has been delivered.
    async fn run_io(
        self: Arc<Self>,
        mut rd: OwnedReadHalf,
        mut wr: OwnedWriteHalf,
        mut send_rx: mpsc::Receiver<Bytes>,
        cancel: CancellationToken,
    ) {
        let mut decoder = FrameDecoder::with_max_frame_size(self.config.max_frame_size);
        let mut read_buf = BytesMut::with_capacity(self.config.read_buffer_size);
        let mut chunk = vec![0u8; self.config.read_buffer_size];

        let failure: Option<String> = loop {
            // Drain complete frames before touching the socket again.
            // Partial headers and bodies stay buffered, so short reads
            // accumulate until the frame is whole.
            match decoder.decode(&mut read_buf) {
                Ok(Some(frame)) => {
                    let delivered = self
                        .event_tx
                        .send(NetEvent::Message {
                            id: frame.id,
                            body: frame.body,
                        })
                        .await;
                    if delivered.is_err() {
                        break None;
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => break Some(e.to_string()),
            }

            tokio::select! {
                _ = cancel.cancelled() => break None,

                outbound = send_rx.recv() => match outbound {
                    Some(frame) => {
                        if let Err(e) = wr.write_all(&frame).await {
                            break Some(format!("write failed: {}", e));
                        }
                        if let Err(e) = wr.flush().await {
                            break Some(format!("write failed: {}", e));
                        }
                    }
                    None => break None,
                },

                result = rd.read(&mut chunk) => match result {
                    Ok(0) => break Some("connection closed by remote host".to_string()),
                    Ok(n) => read_buf.extend_from_slice(&chunk[..n]),
                    Err(e) => break Some(format!("read failed: {}", e)),
                },
            }
        };

        // Graceful shutdown, best effort; failures here are swallowed
        let _ = wr.shutdown().await;

        if let Some(message) = failure {
            self.error_occurred(message).await;
        }
    }

    /// The retry loop. Each round resolves the host again, picks a
    /// fresh random address and polls the attempt at `poll_interval`
    /// until it completes or `attempt_timeout` passes. Rounds are paced
    /// so successive attempt starts sit `reconnect_interval` apart
    /// regardless of how long the attempt itself took.
    async fn run_reconnect(self: Arc<Self>, cancel: CancellationToken) {
        let poll = self.config.poll_interval();
        let attempt_timeout = self.config.attempt_timeout();
        let cadence = self.config.reconnect_interval();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let mut elapsed = Duration::ZERO;
            let attempt = tokio::spawn(try_connect(self.host.clone(), self.port));

            let outcome = loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        attempt.abort();
                        break None;
                    }
                    _ = tokio::time::sleep(poll) => {}
                }
                elapsed += poll;
                if attempt.is_finished() {
                    break attempt.await.ok();
                }
                if elapsed > attempt_timeout {
                    // Neither succeeded nor failed in time: abandon the
                    // attempt and move on to the next round
                    attempt.abort();
                    break None;
                }
            };

            if cancel.is_cancelled() {
                break;
            }

            match outcome {
                Some(Ok(stream)) => {
                    self.clone().install_stream(stream).await;
                    self.reconnecting.store(false, Ordering::SeqCst);
                    self.set_status(ConnectionStatus::Connected, Some(NetEvent::Reconnected))
                        .await;
                    tracing::info!("reconnected to {}:{}", self.host, self.port);
                    return;
                }
                // Failed or timed-out attempts stay silent while retrying
                _ => {
                    let wait = cadence.saturating_sub(elapsed);
                    if !wait.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(wait) => {}
                        }
                    }
                }
            }
        }

        self.reconnecting.store(false, Ordering::SeqCst);
    }
}

/// One transport-level connect: resolve, pick a random address, dial
async fn try_connect(host: String, port: u16) -> std::io::Result<TcpStream> {
    let addrs = resolve_host(&host, port).await?;
    let addr = pick_addr(&addrs).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no addresses for {}", host),
        )
    })?;
    tracing::debug!("dialing {}", addr);
    TcpStream::connect(addr).await
}
