//! Line-oriented TCP sender and receiver, built on a minimal blocking socket
//! with an explicit connection-state machine.
//!
//! - [net::Socket] owns one IPv4 TCP endpoint and enforces the
//!   `Created → Bound → Listening` / `Created → Connected` lifecycle.
//! - [receiver::Receiver] accepts connections and streams each one's bytes to a
//!   handler on its own thread.
//! - [sender::Sender] connects with bounded retry and sends its input one line
//!   at a time.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

#[cfg(not(target_os = "linux"))]
compile_error!("This crate is only compatible with Linux systems.");

pub mod config;
pub mod error;
pub mod log;
pub mod net;
pub mod receiver;
pub mod sender;

pub use error::{Error, Result, SenderError};
pub use net::{Socket, SocketState};
pub use receiver::{Receiver, ShutdownHandle};
pub use sender::{Connection, Inputs, Sender};
