//! Error types for the bridge.

use acmemesh_mesh::SessionError;

/// Result type alias for startup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Per-item registry failure. Never fatal: callers log it and move on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown pin {0}")]
    UnknownPin(String),
    #[error("invalid value {0}, expected 0 or 1")]
    InvalidValue(i64),
    #[error("invalid bit pattern {0:?}")]
    InvalidPattern(String),
    /// The registry task is gone.
    #[error("pin registry closed")]
    Closed,
}

/// A token that maps to no command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unrecognised command {0:?}")]
    UnknownCommand(String),
    #[error("invalid value {0:?}")]
    InvalidValue(String),
}

/// Reason the connection loop gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    #[error("gave up after {attempts} connect attempts: {last}")]
    RetriesExhausted { attempts: u32, last: SessionError },
}

/// Fatal startup error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("gpio: {0}")]
    Gpio(#[from] acmemesh_gpio::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("config file: {0}")]
    ConfigFile(#[from] std::io::Error),

    #[error("config parse: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}
