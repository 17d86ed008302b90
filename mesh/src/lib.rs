//! Scratch remote-sensor protocol.
//!
//! This crate provides the transport between the GPIO bridge and the remote
//! console:
//!
//! - [`Message`] and [`SensorReport`]: inbound messages and outbound reports
//! - [`codec`]: length-prefixed framing and message text encoding
//! - Session traits ([`Session`], [`Connector`])
//! - [`TcpConnector`]: sessions over TCP (port 42001 by default)
//! - Pipe for testing ([`new_pipe`], [`PipeConnector`])
//!
//! # Example
//!
//! ```rust
//! use acmemesh_mesh::{Message, codec};
//!
//! let msg = codec::decode_message(b"broadcast \"allon\"");
//! assert_eq!(msg, Message::Broadcast(vec!["allon".to_string()]));
//! ```

pub mod codec;
mod error;
mod message;
pub mod pipe;
mod session;
pub mod tcp;

pub use error::*;
pub use message::*;
pub use pipe::{PipeConnector, PipePeer, PipeSession, new_pipe};
pub use session::*;
pub use tcp::{TcpConnector, TcpSession};
