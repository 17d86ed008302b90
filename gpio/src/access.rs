//! The pin access capability.

use std::fmt;

use async_trait::async_trait;

use crate::board::{Board, KernelId, PinInfo};
use crate::error::Result;

/// Direction of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// Returns the sysfs spelling of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "in",
            Direction::Output => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Low-level access to the GPIO lines of a board.
///
/// Implementations are addressed by [`KernelId`]; the mapping from pin names
/// to kernel ids comes from [`PinAccess::catalog`]. Values are always `0` or
/// `1`.
#[async_trait]
pub trait PinAccess: Send + Sync {
    /// Short driver name for logs.
    fn name(&self) -> &'static str;

    /// Checks that the underlying interface is present and usable.
    async fn probe(&self) -> Result<()>;

    /// Returns the pins of `board` this driver can address, in catalog order.
    fn catalog(&self, board: Board) -> Result<Vec<PinInfo>>;

    /// Sets the direction of a line.
    async fn set_direction(&self, id: KernelId, direction: Direction) -> Result<()>;

    /// Reads the current level of a line.
    async fn read(&self, id: KernelId) -> Result<u8>;

    /// Drives a line to `value`.
    async fn write(&self, id: KernelId, value: u8) -> Result<()>;
}
