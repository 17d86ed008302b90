//! Session traits for talking to the remote console.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SessionError;
use crate::message::{Message, SensorReport};

/// An open connection to the remote console.
#[async_trait]
pub trait Session: Send + Sync {
    /// Receives the next inbound message.
    ///
    /// Cancel-safe: dropping the future loses no message. Returns
    /// `Err(SessionError::Closed)` once the peer has gone away.
    async fn recv(&self) -> Result<Message, SessionError>;

    /// Sends a batched report as one frame.
    async fn send(&self, report: &SensorReport) -> Result<(), SessionError>;

    /// Closes the session. Closing twice is a no-op.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Opens sessions against a configured remote address.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the address sessions are opened against, for logs.
    fn target(&self) -> String;

    /// Opens a new session.
    async fn connect(&self) -> Result<Arc<dyn Session>, SessionError>;
}
