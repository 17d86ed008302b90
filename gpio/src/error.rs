//! Error types for GPIO access.

use std::io;
use std::path::PathBuf;

use crate::KernelId;

/// Result type alias for GPIO operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for GPIO operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error while touching a GPIO file.
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Board name not known, or known but without a pin table.
    #[error("board {0} not supported")]
    UnsupportedBoard(String),

    /// MCU pin name that does not follow the `P<bank><offset>` scheme.
    #[error("invalid mcu pin name: {0}")]
    InvalidMcuName(String),

    /// Kernel id that the driver does not manage.
    #[error("unknown kernel id {0}")]
    UnknownKernelId(KernelId),

    /// Value outside `0`/`1`, either written or read back.
    #[error("invalid pin value: {0}")]
    InvalidValue(String),

    /// The GPIO interface is missing or not usable.
    #[error("gpio interface unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
