//! GPIO access for Acme Systems boards.
//!
//! - [`Board`] and [`catalog`]: which pins a board exposes and how the kernel
//!   addresses them
//! - [`PinAccess`]: the capability the pin registry drives
//! - [`SysfsPins`]: driver for the kernel's `/sys/class/gpio` interface
//! - [`MemoryPins`]: in-memory driver for offline runs and tests
//!
//! # Example
//!
//! ```rust
//! use acmemesh_gpio::{Board, KernelId, catalog};
//!
//! let pins = catalog(Board::AriettaG25).unwrap();
//! assert_eq!(pins[0].kernel_id, KernelId::from_mcu("PA23").unwrap());
//! ```

mod access;
mod board;
mod error;
pub mod memory;
pub mod sysfs;

pub use access::*;
pub use board::*;
pub use error::{Error, Result};
pub use memory::MemoryPins;
pub use sysfs::SysfsPins;
