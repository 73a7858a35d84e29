//! Blocking IPv4 TCP socket with an explicit lifecycle.
//!
//! ```text
//!              bind()          listen()
//!   Created ----------> Bound ----------> Listening --accept()--> (new) Connected
//!      |
//!      +------ connect() ------> Connected
//!
//!   any state --close()/drop--> Destroyed
//! ```
//!
//! Each operation checks its required predecessor state before making any
//! syscall; calling it from the wrong state is an [Error::State].

use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use std::{fmt, io, mem};

use super::addr::{self, SOCKADDR_IN_LEN};
use super::fd::Fd;
use crate::error::errno;
use crate::{Error, Result};

/// Lifecycle states of a [Socket].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketState {
    /// Handle allocated, nothing else done.
    Created,
    /// Bound to its local address and port.
    Bound,
    /// Accepting incoming connections.
    Listening,
    /// Connected to a peer; data can be sent and received.
    Connected,
    /// Handle released.
    Destroyed,
}

/// An IPv4 TCP socket that exclusively owns its native handle.
///
/// `Socket` is move-only. The handle is released when the socket is closed or
/// dropped, whichever comes first.
#[derive(Debug)]
pub struct Socket {
    fd: Fd,
    ip: Ipv4Addr,
    port: u16,
    state: SocketState,
    /// Set by [Socket::shutdown], possibly from another thread.
    aborted: AtomicBool,
}

impl Socket {
    /// Creates a socket for `addr:port`.
    ///
    /// `addr` is the local address for the server path (bind/listen) and the
    /// peer address for the client path (connect). Port 0 lets the OS choose
    /// an ephemeral port when binding.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidAddress] if `addr` is not an IPv4 dotted-quad,
    /// before any syscall is made, or [Error::Io] if the handle cannot be
    /// allocated.
    pub fn new(addr: &str, port: u16) -> Result<Self> {
        let ip = addr::parse_ipv4(addr)?;
        let fd = Fd::stream_socket()?;

        Ok(Self {
            fd,
            ip,
            port,
            state: SocketState::Created,
            aborted: AtomicBool::new(false),
        })
    }

    /// Returns the address given at construction, or the peer address for a
    /// socket produced by [Socket::accept].
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Returns the port given at construction, or the peer port for a socket
    /// produced by [Socket::accept].
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SocketState {
        self.state
    }

    /// Returns `true` if the socket is in the [SocketState::Connected] state.
    pub fn is_connected(&self) -> bool {
        self.state == SocketState::Connected
    }

    /// Binds the socket to its address and port.
    ///
    /// # Errors
    ///
    /// Returns [Error::State] unless the socket is
    /// [SocketState::Created], or [Error::Io] if the OS rejects the bind.
    pub fn bind(&mut self) -> Result<()> {
        self.require("bind", SocketState::Created)?;

        let sa = addr::to_sockaddr_in(self.ip, self.port);
        let ret = unsafe {
            libc::bind(
                self.fd.raw(),
                &sa as *const libc::sockaddr_in as *const libc::sockaddr,
                SOCKADDR_IN_LEN,
            )
        };
        if ret == -1 {
            return Err(errno!("failed to bind {}", self));
        }

        self.state = SocketState::Bound;
        Ok(())
    }

    /// Marks the socket as accepting connections, queueing at most `backlog`
    /// pending ones.
    ///
    /// # Errors
    ///
    /// Returns [Error::State] unless the socket is [SocketState::Bound], or
    /// [Error::Io] if the OS call fails.
    pub fn listen(&mut self, backlog: i32) -> Result<()> {
        self.require("listen", SocketState::Bound)?;

        if unsafe { libc::listen(self.fd.raw(), backlog) } == -1 {
            return Err(errno!("failed to listen on {}", self));
        }

        self.state = SocketState::Listening;
        Ok(())
    }

    /// Blocks until a connection arrives and returns it as a new socket in the
    /// [SocketState::Connected] state.
    ///
    /// Returns `Ok(None)` when the accept was aborted, either by the OS
    /// (`ECONNABORTED`) or because [Socket::shutdown] was called on this
    /// listener. That signals the end of the accept loop, not a failure.
    ///
    /// # Errors
    ///
    /// Returns [Error::State] unless the socket is [SocketState::Listening],
    /// or [Error::Io] for any other OS failure.
    pub fn accept(&self) -> Result<Option<Socket>> {
        self.require("accept", SocketState::Listening)?;

        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };

        loop {
            let mut len = SOCKADDR_IN_LEN;
            let raw = unsafe {
                libc::accept4(
                    self.fd.raw(),
                    &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
                    &mut len,
                    libc::SOCK_CLOEXEC,
                )
            };

            if raw != -1 {
                let peer = addr::from_sockaddr_in(&sa);

                return Ok(Some(Socket {
                    // SAFETY: `accept4` returned a fresh descriptor owned by
                    // nothing else.
                    fd: unsafe { Fd::from_raw(raw) },
                    ip: *peer.ip(),
                    port: peer.port(),
                    state: SocketState::Connected,
                    aborted: AtomicBool::new(false),
                }));
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) if !self.is_aborted() => continue,
                Some(libc::ECONNABORTED) => return Ok(None),
                // A listener shut down from another thread wakes with `EINVAL`.
                _ if self.is_aborted() => return Ok(None),
                _ => {
                    return Err(errno!(err; "failed to accept connection on {}", self));
                }
            }
        }
    }

    /// Connects to the socket's address and port.
    ///
    /// A refused attempt leaves the socket in [SocketState::Created], so the
    /// connect can be retried.
    ///
    /// # Errors
    ///
    /// Returns [Error::ConnectionRefused] if the peer actively refused,
    /// [Error::State] unless the socket is [SocketState::Created], or
    /// [Error::Io] for any other OS failure.
    pub fn connect(&mut self) -> Result<()> {
        self.require("connect", SocketState::Created)?;

        let sa = addr::to_sockaddr_in(self.ip, self.port);
        let ret = unsafe {
            libc::connect(
                self.fd.raw(),
                &sa as *const libc::sockaddr_in as *const libc::sockaddr,
                SOCKADDR_IN_LEN,
            )
        };

        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ECONNREFUSED) {
                return Err(Error::ConnectionRefused {
                    addr: self.ip.to_string(),
                    port: self.port,
                });
            }

            return Err(errno!(err; "failed to connect to {}", self));
        }

        self.state = SocketState::Connected;
        Ok(())
    }

    /// Writes all of `buf` to the connection, blocking as needed.
    ///
    /// # Errors
    ///
    /// Returns [Error::State] unless the socket is [SocketState::Connected],
    /// or [Error::Io] if the OS call fails.
    pub fn send(&self, buf: &[u8]) -> Result<()> {
        self.require("send", SocketState::Connected)?;

        let mut sent = 0;
        while sent < buf.len() {
            let rest = &buf[sent..];

            // `MSG_NOSIGNAL` turns a write to a closed peer into `EPIPE`
            // instead of killing the process with `SIGPIPE`.
            let n = unsafe {
                libc::send(
                    self.fd.raw(),
                    rest.as_ptr() as *const libc::c_void,
                    rest.len(),
                    libc::MSG_NOSIGNAL,
                )
            };

            if n == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(errno!(err; "failed to send to {}", self));
            }

            sent += n as usize;
        }

        Ok(())
    }

    /// Reads up to `buf.len()` bytes from the connection, blocking until at
    /// least one byte is available.
    ///
    /// Returns `Ok(None)` when the peer closed the connection gracefully, the
    /// connection was aborted, or [Socket::shutdown] was called locally.
    ///
    /// # Errors
    ///
    /// Returns [Error::State] unless the socket is [SocketState::Connected],
    /// [Error::Io] of kind `InvalidInput` for an empty `buf`, or [Error::Io]
    /// for any other OS failure (including an expired read timeout).
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        self.require("receive", SocketState::Connected)?;

        // A zero-length read cannot tell "no data" from a closed peer.
        if buf.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "receive buffer is empty",
            )));
        }

        loop {
            let n = unsafe {
                libc::recv(
                    self.fd.raw(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };

            match n {
                0 => return Ok(None),
                n if n > 0 => return Ok(Some(n as usize)),
                _ => {}
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                _ if self.is_aborted() => return Ok(None),
                Some(libc::EINTR) => continue,
                Some(libc::ECONNABORTED) => return Ok(None),
                _ => return Err(errno!(err; "failed to receive from {}", self)),
            }
        }
    }

    /// Aborts the socket: a blocked [Socket::accept] or [Socket::recv] on it,
    /// in any thread, returns `Ok(None)`, as do all later calls.
    ///
    /// The handle is not released; that still happens on close or drop.
    ///
    /// # Errors
    ///
    /// Returns [Error::Io] if the OS call fails for a reason other than the
    /// socket not being connected.
    pub fn shutdown(&self) -> Result<()> {
        self.aborted.store(true, Ordering::SeqCst);

        if self.fd.is_empty() {
            return Ok(());
        }

        if unsafe { libc::shutdown(self.fd.raw(), libc::SHUT_RDWR) } == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOTCONN) {
                return Err(errno!(err; "failed to shut down {}", self));
            }
        }

        Ok(())
    }

    /// Returns `true` once [Socket::shutdown] has been called.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Releases the native handle. Closing an already closed socket does
    /// nothing.
    pub fn close(&mut self) {
        self.fd.close();
        self.state = SocketState::Destroyed;
    }

    /// Sets the receive timeout (`SO_RCVTIMEO`). `None` blocks indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [Error::Io] for a zero duration or if the OS call fails.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let tv = match timeout {
            Some(d) if d.is_zero() => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "cannot set a zero duration read timeout",
                )));
            }
            Some(d) => {
                let mut tv = libc::timeval {
                    tv_sec: d.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
                    tv_usec: d.subsec_micros() as libc::suseconds_t,
                };
                // An all-zero timeval would disable the timeout.
                if tv.tv_sec == 0 && tv.tv_usec == 0 {
                    tv.tv_usec = 1;
                }
                tv
            }
            None => libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
        };

        self.setsockopt(libc::SO_RCVTIMEO, tv)
            .map_err(|err| errno!(err; "failed to set read timeout on {}", self))
    }

    /// Sets `SO_REUSEADDR`, letting a restarted listener bind an address still
    /// held by connections in `TIME_WAIT`.
    ///
    /// # Errors
    ///
    /// Returns [Error::Io] if the OS call fails.
    pub fn set_reuse_address(&self, reuse: bool) -> Result<()> {
        self.setsockopt(libc::SO_REUSEADDR, libc::c_int::from(reuse))
            .map_err(|err| errno!(err; "failed to set SO_REUSEADDR on {}", self))
    }

    /// Returns the local address the handle is bound to, including an
    /// OS-chosen port.
    ///
    /// # Errors
    ///
    /// Returns [Error::Io] if the OS call fails.
    pub fn local_addr(&self) -> Result<SocketAddrV4> {
        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = SOCKADDR_IN_LEN;

        let ret = unsafe {
            libc::getsockname(
                self.fd.raw(),
                &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
            )
        };
        if ret == -1 {
            return Err(errno!("failed to get local address of {}", self));
        }

        Ok(addr::from_sockaddr_in(&sa))
    }

    fn require(&self, op: &'static str, expected: SocketState) -> Result<()> {
        if self.state != expected || self.fd.is_empty() {
            return Err(Error::State {
                op,
                expected,
                actual: self.state,
            });
        }

        Ok(())
    }

    fn setsockopt<T>(&self, opt: libc::c_int, val: T) -> io::Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.fd.raw(),
                libc::SOL_SOCKET,
                opt,
                &val as *const T as *const libc::c_void,
                mem::size_of::<T>() as libc::socklen_t,
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.raw()
    }
}

impl IntoRawFd for Socket {
    fn into_raw_fd(mut self) -> RawFd {
        self.fd.take().into_raw()
    }
}
