//! Bridge between a Scratch remote-sensor mesh and board GPIOs.
//!
//! - [`PinRegistry`]: pin modes and values, kept in step with the hardware
//! - [`RegistryHandle`]: access to the registry task shared by all workers
//! - [`command`]: broadcast token parsing
//! - [`Listener`] and [`Notifier`]: the two per-session workers
//! - [`Supervisor`]: connect, serve, tear down, retry
//! - [`Bridge`]: startup assembly from a [`Config`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use acmemesh_bridge::{Bridge, Config, HostSystem};
//! use acmemesh_gpio::MemoryPins;
//! use acmemesh_mesh::TcpConnector;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let connector = TcpConnector::new(&config.remote_address);
//! let bridge = Bridge::new(
//!     config,
//!     Arc::new(MemoryPins::new()),
//!     Arc::new(connector),
//!     Arc::new(HostSystem::new()),
//! )
//! .await?;
//! bridge.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

mod bridge;
pub mod command;
mod config;
mod error;
mod handle;
mod listener;
pub mod logger;
mod notifier;
mod pin;
mod registry;
mod supervisor;
pub mod system;

pub use bridge::Bridge;
pub use command::{Command, Value};
pub use config::*;
pub use error::*;
pub use handle::{RegistryHandle, spawn_registry};
pub use listener::{Listener, ListenerExit};
pub use logger::{Logger, NopLogger, default_logger};
pub use notifier::{DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE, Notifier};
pub use pin::{PinMode, PinState};
pub use registry::{PinRegistry, WriteOutcome};
pub use supervisor::{ConnectionState, Exit, Supervisor, SupervisorEvent, SupervisorOptions};
pub use system::{HostSystem, SystemControl};

#[cfg(test)]
mod tests;
