//! Exclusively-owned native socket descriptor.

use std::os::unix::io::RawFd;

use crate::Result;
use crate::error::errno;

/// Sentinel held by an [Fd] that owns nothing.
pub const NO_HANDLE: RawFd = -1;

/// An owned file descriptor.
///
/// Exactly one `Fd` refers to a given descriptor. Ownership moves out with
/// [Fd::take], which leaves [NO_HANDLE] behind so that closing or dropping the
/// source is a no-op.
#[derive(Debug)]
pub struct Fd {
    raw: RawFd,
}

impl Fd {
    /// Allocates a new IPv4 stream socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS cannot allocate the descriptor.
    pub fn stream_socket() -> Result<Self> {
        let raw = unsafe {
            libc::socket(
                libc::AF_INET,
                libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if raw == -1 {
            return Err(errno!("failed to create socket"));
        }

        Ok(Self { raw })
    }

    /// Takes ownership of `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must be an open descriptor not owned by anything else.
    pub unsafe fn from_raw(raw: RawFd) -> Self {
        Self { raw }
    }

    /// Returns the raw descriptor, or [NO_HANDLE].
    pub fn raw(&self) -> RawFd {
        self.raw
    }

    /// Returns `true` if this `Fd` owns nothing.
    pub fn is_empty(&self) -> bool {
        self.raw == NO_HANDLE
    }

    /// Moves the descriptor into a new `Fd`, leaving this one empty.
    pub fn take(&mut self) -> Fd {
        Fd {
            raw: std::mem::replace(&mut self.raw, NO_HANDLE),
        }
    }

    /// Releases the descriptor without closing it.
    pub fn into_raw(mut self) -> RawFd {
        self.take().raw
    }

    /// Closes the descriptor. Closing an empty `Fd` does nothing.
    ///
    /// Returns `true` if a descriptor was closed.
    pub fn close(&mut self) -> bool {
        if self.is_empty() {
            return false;
        }

        let raw = std::mem::replace(&mut self.raw, NO_HANDLE);

        // The descriptor is released even if `close` reports an error, so
        // retrying would risk closing a reused descriptor.
        let _ = unsafe { libc::close(raw) };
        true
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        self.close();
    }
}
