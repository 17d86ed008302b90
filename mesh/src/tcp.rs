//! TCP session for the remote-sensor protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::{self, MAX_FRAME_SIZE};
use crate::error::SessionError;
use crate::message::{Message, SensorReport};
use crate::session::{Connector, Session};

/// Port the remote console listens on.
pub const DEFAULT_PORT: u16 = 42001;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Appends [`DEFAULT_PORT`] to `addr` unless it already names a port.
pub fn with_default_port(addr: &str) -> String {
    let addr = addr.trim();
    if addr.parse::<SocketAddr>().is_ok() {
        return addr.to_string();
    }
    if let Some((host, port)) = addr.rsplit_once(':') {
        if !host.contains(':') && port.parse::<u16>().is_ok() {
            return addr.to_string();
        }
        // Bare IPv6 literal.
        return format!("[{}]:{}", addr.trim_matches(|c| c == '[' || c == ']'), DEFAULT_PORT);
    }
    format!("{}:{}", addr, DEFAULT_PORT)
}

/// Opens [`TcpSession`]s.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
    max_frame_size: usize,
}

impl TcpConnector {
    /// Creates a connector for `addr` (`host` or `host:port`).
    pub fn new(addr: &str) -> Self {
        Self {
            addr: with_default_port(addr),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the maximum inbound frame size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn target(&self) -> String {
        self.addr.clone()
    }

    async fn connect(&self) -> Result<Arc<dyn Session>, SessionError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| SessionError::Connect(format!("{}: timed out", self.addr)))?
            .map_err(|e| SessionError::Connect(format!("{}: {}", self.addr, e)))?;
        stream.set_nodelay(true)?;
        debug!("connected to {}", self.addr);
        Ok(Arc::new(TcpSession::start(stream, self.max_frame_size)))
    }
}

/// A session over one TCP connection.
///
/// A reader task decodes inbound frames into a channel, which keeps
/// [`Session::recv`] cancel-safe.
pub struct TcpSession {
    writer: Mutex<OwnedWriteHalf>,
    inbound: Mutex<mpsc::Receiver<Result<Message, SessionError>>>,
    cancel: CancellationToken,
}

impl TcpSession {
    /// Wraps a connected stream and starts its reader task.
    pub fn start(stream: TcpStream, max_frame_size: usize) -> Self {
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        tokio::spawn(read_loop(reader, tx, cancel.clone(), max_frame_size));

        Self {
            writer: Mutex::new(writer),
            inbound: Mutex::new(rx),
            cancel,
        }
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    tx: mpsc::Sender<Result<Message, SessionError>>,
    cancel: CancellationToken,
    max_frame_size: usize,
) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = codec::read_frame(&mut reader, &mut buf, max_frame_size) => {
                match result {
                    Ok(frame) => {
                        let msg = codec::decode_message(&frame);
                        trace!("recv {:?}", msg);
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Session for TcpSession {
    async fn recv(&self) -> Result<Message, SessionError> {
        let mut rx = self.inbound.lock().await;
        match rx.recv().await {
            Some(result) => result,
            None => Err(SessionError::Closed),
        }
    }

    async fn send(&self, report: &SensorReport) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }
        let text = codec::encode_report(report);
        trace!("send {}", text);
        let mut writer = self.writer.lock().await;
        codec::write_frame(&mut *writer, text.as_bytes()).await
    }

    async fn close(&self) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        // The peer may already be gone; nothing left to report.
        let _ = writer.shutdown().await;
        Ok(())
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
