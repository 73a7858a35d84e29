//! Minimal blocking TCP over IPv4.
//!
//! This module provides an owned socket handle with an explicit lifecycle,
//! built directly on the BSD socket syscalls.

pub mod addr;
pub mod fd;

pub mod socket;
pub use socket::{Socket, SocketState};
