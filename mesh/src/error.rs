//! Error types for mesh sessions.

/// Error type for session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("connection closed")]
    Closed,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("timeout")]
    Timeout,
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => SessionError::Closed,
            _ => SessionError::Io(e.to_string()),
        }
    }
}
