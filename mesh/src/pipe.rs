//! In-memory session for testing.
//!
//! [`new_pipe`] returns a [`PipeSession`] (our side) and a [`PipePeer`] that
//! plays the remote console: it injects messages, observes reports and can
//! break the connection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::message::{Message, SensorReport};
use crate::session::{Connector, Session};

/// Creates a connected session/peer pair.
pub fn new_pipe() -> (PipeSession, PipePeer) {
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let shared = Arc::new(parking_lot::Mutex::new(PipeShared::default()));
    let broken = CancellationToken::new();

    let session = PipeSession {
        inbound: Mutex::new(inbound_rx),
        outbound: outbound_tx,
        shared: shared.clone(),
        broken: broken.clone(),
    };
    let peer = PipePeer {
        inbound: inbound_tx,
        outbound: Mutex::new(outbound_rx),
        shared,
        broken,
    };
    (session, peer)
}

#[derive(Default)]
struct PipeShared {
    error: Option<SessionError>,
    closed: bool,
}

/// Our side of a pipe.
pub struct PipeSession {
    inbound: Mutex<mpsc::Receiver<Message>>,
    outbound: mpsc::Sender<SensorReport>,
    shared: Arc<parking_lot::Mutex<PipeShared>>,
    broken: CancellationToken,
}

impl PipeSession {
    fn failure(&self) -> SessionError {
        self.shared
            .lock()
            .error
            .clone()
            .unwrap_or(SessionError::Closed)
    }
}

#[async_trait]
impl Session for PipeSession {
    async fn recv(&self) -> Result<Message, SessionError> {
        let mut rx = self.inbound.lock().await;
        tokio::select! {
            biased;
            _ = self.broken.cancelled() => Err(self.failure()),
            msg = rx.recv() => msg.ok_or_else(|| self.failure()),
        }
    }

    async fn send(&self, report: &SensorReport) -> Result<(), SessionError> {
        if self.broken.is_cancelled() {
            return Err(self.failure());
        }
        self.outbound
            .send(report.clone())
            .await
            .map_err(|_| SessionError::Closed)
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.shared.lock().closed = true;
        Ok(())
    }
}

/// The remote console's side of a pipe.
pub struct PipePeer {
    inbound: mpsc::Sender<Message>,
    outbound: Mutex<mpsc::Receiver<SensorReport>>,
    shared: Arc<parking_lot::Mutex<PipeShared>>,
    broken: CancellationToken,
}

impl PipePeer {
    /// Delivers a message to the session.
    pub async fn send(&self, msg: Message) -> Result<(), SessionError> {
        self.inbound.send(msg).await.map_err(|_| SessionError::Closed)
    }

    /// Delivers a single-token broadcast.
    pub async fn broadcast(&self, token: &str) -> Result<(), SessionError> {
        self.send(Message::Broadcast(vec![token.to_string()])).await
    }

    /// Waits for the next report sent by the session.
    pub async fn recv_report(&self) -> Option<SensorReport> {
        self.outbound.lock().await.recv().await
    }

    /// Returns a report if one is already queued.
    pub fn try_recv_report(&self) -> Option<SensorReport> {
        self.outbound.try_lock().ok()?.try_recv().ok()
    }

    /// Breaks the connection: pending and future session calls fail with
    /// `err`.
    pub fn break_with(&self, err: SessionError) {
        self.shared.lock().error = Some(err);
        self.broken.cancel();
    }

    /// Returns true once the session side called `close`.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

/// A [`Connector`] that hands out scripted outcomes in order.
#[derive(Default)]
pub struct PipeConnector {
    queue: parking_lot::Mutex<VecDeque<Result<PipeSession, SessionError>>>,
    attempts: AtomicUsize,
}

impl PipeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a session for a future connect.
    pub fn push_session(&self, session: PipeSession) {
        self.queue.lock().push_back(Ok(session));
    }

    /// Queues a failed connect.
    pub fn push_failure(&self, err: SessionError) {
        self.queue.lock().push_back(Err(err));
    }

    /// Returns the number of connect calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for PipeConnector {
    fn target(&self) -> String {
        "pipe".to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn Session>, SessionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().pop_front();
        match next {
            Some(Ok(session)) => Ok(Arc::new(session)),
            Some(Err(e)) => Err(e),
            None => Err(SessionError::Connect("no session queued".to_string())),
        }
    }
}
