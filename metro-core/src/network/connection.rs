use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::codec::{Decoded, MetroCodec};
use crate::config::NetworkConfig;
use crate::error::MetroError;
use crate::frame::Frame;
use crate::network::FrameTransport;

/// Replies buffered between the reader task and the foreground caller.
const REPLY_INBOX_SIZE: usize = 32;

/// How long `close` waits for buffered writes and the reader task.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

type FrameSink = Pin<Box<dyn Sink<Frame, Error = MetroError> + Send>>;
type FrameStream = Pin<Box<dyn Stream<Item = Result<Decoded, MetroError>> + Send>>;

/// A connection to the metro server.
///
/// One background task owns the read half and demultiplexes every line
/// exactly once: `TELEMETRY` pushes go to the telemetry subscriber (if
/// any), everything else lands in the reply inbox read by
/// [`FrameTransport::recv`]. Writes go straight to the sink from the
/// caller's task.
pub struct Connection {
    info: ConnectionInfo,
    sink: Option<FrameSink>,
    replies: mpsc::Receiver<Decoded>,
    telemetry: TelemetrySlot,
    shutdown: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// Wrap an established stream and start the reader task.
    pub fn new<S>(stream: S, info: ConnectionInfo) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (net_writer, net_reader) = Framed::new(stream, MetroCodec::new()).split::<Frame>();

        // Network -> caller
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_INBOX_SIZE);
        let telemetry = TelemetrySlot::default();
        let shutdown = CancellationToken::new();

        let reader = tokio::spawn(demultiplex(
            Box::pin(net_reader),
            reply_tx,
            telemetry.clone(),
            shutdown.clone(),
        ));

        Self {
            info,
            sink: Some(Box::pin(net_writer)),
            replies: reply_rx,
            telemetry,
            shutdown,
            reader: Some(reader),
        }
    }

    /// Resolve and connect to `info`, bounded by the configured timeout.
    pub async fn connect(info: &ConnectionInfo, config: &NetworkConfig) -> Result<Self, MetroError> {
        let timeout = config.connect_timeout();
        tracing::info!(server = %info, "connecting");

        let stream = match tokio::time::timeout(
            timeout,
            TcpStream::connect((info.host(), info.port())),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(MetroError::Connection(format!("{info}: {e}"))),
            Err(_) => {
                return Err(MetroError::Connection(format!(
                    "{info}: timed out after {timeout:?}"
                )));
            }
        };
        stream.set_nodelay(true)?;

        tracing::info!(server = %info, "connected");
        Ok(Self::new(stream, info.clone()))
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// `false` once the server has gone away or `close` was called.
    pub fn is_open(&self) -> bool {
        self.sink.is_some() && self.reader.as_ref().is_some_and(|r| !r.is_finished())
    }

    /// Attach the single telemetry consumer and return its feed.
    ///
    /// Fails with [`MetroError::ListenerBusy`] while another feed is
    /// still being read, and with [`MetroError::ConnectionClosed`] when
    /// the reader task has already stopped.
    pub fn subscribe_telemetry(&self, capacity: usize) -> Result<mpsc::Receiver<Frame>, MetroError> {
        self.telemetry.attach(capacity.max(1))
    }

    /// Close the connection. Safe to call any number of times.
    ///
    /// Teardown problems are logged, never returned.
    pub async fn close(&mut self) {
        let Some(mut sink) = self.sink.take() else {
            return;
        };
        self.shutdown.cancel();

        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "error flushing on close"),
            Err(_) => tracing::debug!("flush on close timed out"),
        }

        if let Some(mut reader) = self.reader.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut reader).await.is_err() {
                reader.abort();
            }
        }
        self.telemetry.close();
        tracing::info!(server = %self.info, "connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .field("open", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl FrameTransport for Connection {
    async fn send(&mut self, frame: Frame) -> Result<(), MetroError> {
        let sink = self.sink.as_mut().ok_or(MetroError::ConnectionClosed)?;
        tracing::debug!(%frame, "sending");
        sink.send(frame).await
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Decoded, MetroError> {
        match tokio::time::timeout(timeout, self.replies.recv()).await {
            Ok(Some(decoded)) => Ok(decoded),
            Ok(None) => Err(MetroError::ConnectionClosed),
            Err(_) => Err(MetroError::Timeout(timeout)),
        }
    }

    fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while let Ok(stale) = self.replies.try_recv() {
            tracing::debug!(?stale, "discarding stale reply");
            discarded += 1;
        }
        discarded
    }
}

// ── Reader task ──────────────────────────────────────────────────

async fn demultiplex(
    mut net_reader: FrameStream,
    replies: mpsc::Sender<Decoded>,
    telemetry: TelemetrySlot,
    shutdown: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => break,
            item = net_reader.next() => item,
        };

        match item {
            Some(Ok(Ok(frame))) if frame.kind().is_push() => telemetry.deliver(frame),
            Some(Ok(decoded)) => {
                if let Ok(frame) = &decoded {
                    tracing::debug!(%frame, "received");
                }
                match replies.try_send(decoded) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(dropped)) => {
                        tracing::warn!(?dropped, "reply inbox full; dropping reply");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "read failed; closing connection");
                break;
            }
            None => {
                tracing::info!("server closed the connection");
                break;
            }
        }
    }
    // Dropping the feed sender wakes a waiting listener.
    telemetry.close();
}

// ── Telemetry slot ───────────────────────────────────────────────

#[derive(Debug, Default)]
struct SlotState {
    sender: Option<mpsc::Sender<Frame>>,
    closed: bool,
}

/// The single place telemetry pushes are forwarded to.
#[derive(Debug, Clone, Default)]
struct TelemetrySlot {
    inner: Arc<Mutex<SlotState>>,
}

impl TelemetrySlot {
    fn attach(&self, capacity: usize) -> Result<mpsc::Receiver<Frame>, MetroError> {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if slot.closed {
            return Err(MetroError::ConnectionClosed);
        }
        if slot.sender.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(MetroError::ListenerBusy);
        }
        let (tx, rx) = mpsc::channel(capacity);
        slot.sender = Some(tx);
        Ok(rx)
    }

    fn deliver(&self, frame: Frame) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = slot.sender.as_ref() else {
            tracing::trace!(%frame, "no telemetry listener; dropping push");
            return;
        };
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("telemetry listener is lagging; dropping push");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                slot.sender = None;
            }
        }
    }

    fn close(&self) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        slot.closed = true;
        slot.sender = None;
    }
}

// ── ConnectionInfo ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn duplex_connection() -> (Connection, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        (Connection::new(client, ConnectionInfo::new("test", 0)), server)
    }

    #[test]
    fn connection_info_display() {
        assert_eq!(ConnectionInfo::new("10.0.0.1", 5000).to_string(), "10.0.0.1:5000");
        assert_eq!(ConnectionInfo::new("::1", 5000).to_string(), "[::1]:5000");
    }

    #[tokio::test]
    async fn send_writes_one_line() {
        let (mut conn, server) = duplex_connection();
        conn.send(Frame::logout("abc").unwrap()).await.unwrap();

        let mut lines = BufReader::new(server).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "TYPE:LOGOUT;TOKEN:abc");
    }

    #[tokio::test]
    async fn replies_and_pushes_are_separated() {
        let (mut conn, mut server) = duplex_connection();
        let mut feed = conn.subscribe_telemetry(8).unwrap();

        server
            .write_all(b"TYPE:TELEMETRY;SPEED:1;BATTERY:2\nTYPE:ACK\n")
            .await
            .unwrap();

        let reply = conn.recv(Duration::from_secs(1)).await.unwrap().unwrap();
        assert!(reply.is(MessageType::Ack));

        let push = feed.recv().await.unwrap();
        assert!(push.is(MessageType::Telemetry));
    }

    #[tokio::test]
    async fn pushes_without_listener_are_dropped() {
        let (mut conn, mut server) = duplex_connection();
        server
            .write_all(b"TYPE:TELEMETRY;SPEED:1;BATTERY:2\nTYPE:ERR;REASON:x\n")
            .await
            .unwrap();

        let reply = conn.recv(Duration::from_secs(1)).await.unwrap().unwrap();
        assert!(reply.is(MessageType::Err));
    }

    #[tokio::test]
    async fn malformed_line_reaches_inbox() {
        let (mut conn, mut server) = duplex_connection();
        server.write_all(b"nonsense\n").await.unwrap();

        let decoded = conn.recv(Duration::from_secs(1)).await.unwrap();
        assert!(decoded.unwrap_err().is_protocol());
    }

    #[tokio::test]
    async fn invalid_utf8_keeps_connection_open() {
        let (mut conn, mut server) = duplex_connection();
        server
            .write_all(b"TYPE:ERR;REASON:caf\xe9\nTYPE:ACK\n")
            .await
            .unwrap();

        let first = conn.recv(Duration::from_secs(1)).await.unwrap().unwrap();
        assert!(first.is(MessageType::Err));
        let second = conn.recv(Duration::from_secs(1)).await.unwrap().unwrap();
        assert!(second.is(MessageType::Ack));
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn overlong_line_keeps_connection_open() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let mut conn = Connection::new(client, ConnectionInfo::new("test", 0));

        let mut line = b"TYPE:ERR;REASON:".to_vec();
        line.extend(std::iter::repeat_n(b'x', 9000));
        line.extend_from_slice(b"\nTYPE:ACK\n");
        server.write_all(&line).await.unwrap();

        let first = conn.recv(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(first, Err(MetroError::LineTooLong)));
        let second = conn.recv(Duration::from_secs(1)).await.unwrap().unwrap();
        assert!(second.is(MessageType::Ack));
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn recv_times_out() {
        let (mut conn, _server) = duplex_connection();
        let err = conn.recv(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, MetroError::Timeout(_)));
    }

    #[tokio::test]
    async fn peer_close_is_reported() {
        let (mut conn, server) = duplex_connection();
        drop(server);
        let err = conn.recv(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, MetroError::ConnectionClosed));
        assert!(matches!(
            conn.subscribe_telemetry(8),
            Err(MetroError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn discard_pending_drops_stale_replies() {
        let (mut conn, mut server) = duplex_connection();
        server.write_all(b"TYPE:ACK\nTYPE:ACK\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(conn.discard_pending(), 2);
        assert_eq!(conn.discard_pending(), 0);
    }

    #[tokio::test]
    async fn second_subscriber_is_refused() {
        let (conn, _server) = duplex_connection();
        let first = conn.subscribe_telemetry(8).unwrap();
        assert!(matches!(
            conn.subscribe_telemetry(8),
            Err(MetroError::ListenerBusy)
        ));
        drop(first);
        assert!(conn.subscribe_telemetry(8).is_ok());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut conn, _server) = duplex_connection();
        conn.close().await;
        assert!(!conn.is_open());
        conn.close().await;

        let err = conn.send(Frame::logout("abc").unwrap()).await.unwrap_err();
        assert!(matches!(err, MetroError::ConnectionClosed));
    }
}
