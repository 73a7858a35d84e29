//! Error types for socket operations and the sender/receiver roles built on
//! top of them.

use std::{error, fmt, io, result};

use crate::net::SocketState;

/// Creates a [`crate::Error::Io`] with a custom message prefixed to the current
/// `errno` value.
///
/// An already captured `io::Error` can be given first, separated by `;`, when
/// `errno` had to be inspected before building the error.
macro_rules! errno {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        let errno = ::std::io::Error::last_os_error();
        $crate::error::errno!(errno; $fmt $(, $arg)*)
    }};
    ($err:expr; $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let errno: ::std::io::Error = $err;
        let prefix = format!($fmt $(, $arg)*);
        let msg = format!("{prefix}: {errno}");
        $crate::Error::Io(::std::io::Error::new(errno.kind(), msg))
    }};
}
pub(crate) use errno;

/// A convenience wrapper around `Result` for [crate::Error].
pub type Result<T> = result::Result<T, Error>;

/// Represents errors that can occur during socket communication.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An underlying OS call failed. Carries the OS-provided description.
    Io(io::Error),
    /// The address is not a well-formed IPv4 dotted-quad.
    InvalidAddress(String),
    /// An operation was invoked outside of its required predecessor state.
    ///
    /// This is a logic error in the caller, never an expected runtime
    /// condition.
    State {
        /// The operation that was attempted.
        op: &'static str,
        /// The state the operation requires.
        expected: SocketState,
        /// The state the socket was actually in.
        actual: SocketState,
    },
    /// The peer actively refused the connection attempt.
    ///
    /// Only produced by `connect()`, and the only kind the sender retries on.
    ConnectionRefused {
        /// The address that refused the connection.
        addr: String,
        /// The port that refused the connection.
        port: u16,
    },
    /// An error raised by the sender role.
    Sender(SenderError),
}

impl Error {
    /// Returns `true` if this error is [`Error::ConnectionRefused`].
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Error::ConnectionRefused { .. })
    }

    /// Returns `true` if this error is [`Error::State`].
    pub fn is_state_error(&self) -> bool {
        matches!(self, Error::State { .. })
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Sender(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<SenderError> for Error {
    fn from(err: SenderError) -> Error {
        Error::Sender(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref e) => fmt::Display::fmt(e, f),
            Error::InvalidAddress(ref addr) => {
                write!(f, "invalid IPv4 address: {addr:?} (expected dotted-quad)")
            }
            Error::State {
                op,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "cannot {op}: socket must be {expected:?} (currently {actual:?})"
                )
            }
            Error::ConnectionRefused { ref addr, port } => {
                write!(f, "connection refused by {addr}:{port}")
            }
            Error::Sender(ref e) => fmt::Display::fmt(e, f),
        }
    }
}

/// Represents errors that can occur in the sender role.
#[derive(Debug)]
#[non_exhaustive]
pub enum SenderError {
    /// Every connection attempt was refused.
    ConnectFailed {
        /// The total number of attempts made.
        attempts: u32,
    },
    /// Input was streamed before a connection was established.
    NotConnected,
}

impl error::Error for SenderError {}

impl fmt::Display for SenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SenderError::ConnectFailed { attempts } => {
                write!(f, "failed to connect after {attempts} attempt(s)")
            }
            SenderError::NotConnected => {
                write!(f, "cannot send: sender is not connected")
            }
        }
    }
}
