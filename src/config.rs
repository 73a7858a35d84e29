//! Default endpoint, sizing and timing values, with overrides read from the
//! environment.

use std::io;
use std::time::Duration;

use crate::log::{self, Level};
use crate::{Error, Result};

/// Address the bundled receiver listens on and the sender connects to.
pub const SERVER_ADDR: &str = "127.0.0.1";

/// Port the bundled receiver listens on and the sender connects to.
pub const SERVER_PORT: u16 = 56743;

/// Maximum number of pending connections queued on a listening socket.
pub const DEFAULT_BACKLOG: i32 = 10;

/// Number of connection retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 4;

/// Delay between refused connection attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Size of receive buffers and of each transmitted line, newline included.
pub const BUFFER_SIZE: usize = 1024;

/// Overrides [SERVER_ADDR].
pub const ENV_ADDR: &str = "SENDRECV_ADDR";
/// Overrides [SERVER_PORT].
pub const ENV_PORT: &str = "SENDRECV_PORT";
/// Sets the maximum log level (`error`, `warn`, `info`, `debug`).
pub const ENV_LOG: &str = "SENDRECV_LOG";

/// An IPv4 address and port pair, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// IPv4 dotted-quad address.
    pub addr: String,
    /// Port number.
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            addr: SERVER_ADDR.to_string(),
            port: SERVER_PORT,
        }
    }
}

impl Endpoint {
    /// Builds the endpoint from `SENDRECV_ADDR` / `SENDRECV_PORT`, falling
    /// back to the defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `SENDRECV_PORT` is set but is not a valid port.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [Endpoint::from_env], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut endpoint = Self::default();

        if let Some(addr) = lookup(ENV_ADDR) {
            endpoint.addr = addr;
        }

        if let Some(port) = lookup(ENV_PORT) {
            endpoint.port = port.trim().parse().map_err(|_| {
                Error::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid {ENV_PORT}: {port:?} (expected 0..=65535)"),
                ))
            })?;
        }

        Ok(endpoint)
    }
}

/// Applies `SENDRECV_LOG` to the global log level, if set.
///
/// An unrecognized value is reported and the current level kept.
pub fn init_logging() {
    init_logging_from(std::env::var(ENV_LOG).ok().as_deref());
}

fn init_logging_from(value: Option<&str>) {
    if let Some(value) = value {
        match value.parse::<Level>() {
            Ok(level) => log::set_max_level(level),
            Err(err) => crate::warn!("ignoring {ENV_LOG}: {err}"),
        }
    }
}

/// Settings for the receiver role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Listen backlog.
    pub backlog: i32,
    /// Size of each worker's receive buffer. Values below 1 are raised to 1
    /// when the receiver binds.
    pub buffer_size: usize,
    /// Receive timeout applied to accepted connections. `None` blocks
    /// indefinitely.
    pub read_timeout: Option<Duration>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            buffer_size: BUFFER_SIZE,
            read_timeout: None,
        }
    }
}

impl ReceiverConfig {
    /// Sets the listen backlog.
    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Sets the size of each worker's receive buffer. Zero is raised to one.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Sets the receive timeout for accepted connections.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Settings for the sender role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Retries after the first refused connection attempt.
    pub retries: u32,
    /// Delay between refused attempts.
    pub retry_delay: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            retry_delay: RETRY_DELAY,
        }
    }
}

impl SenderConfig {
    /// Sets the number of retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the delay between refused attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_defaults() {
        let endpoint = Endpoint::from_lookup(|_| None).unwrap();
        assert_eq!(endpoint.addr, "127.0.0.1");
        assert_eq!(endpoint.port, 56743);
    }

    #[test]
    fn endpoint_overrides() {
        let endpoint = Endpoint::from_lookup(|key| match key {
            ENV_ADDR => Some("10.0.0.1".into()),
            ENV_PORT => Some(" 8080 ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(
            endpoint,
            Endpoint {
                addr: "10.0.0.1".into(),
                port: 8080
            }
        );
    }

    #[test]
    fn endpoint_rejects_bad_port() {
        let err = Endpoint::from_lookup(|key| (key == ENV_PORT).then(|| "70000".into()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }

    #[test]
    fn config_defaults() {
        let rc = ReceiverConfig::default();
        assert_eq!(rc.backlog, 10);
        assert_eq!(rc.buffer_size, 1024);
        assert_eq!(rc.read_timeout, None);

        let sc = SenderConfig::default();
        assert_eq!(sc.retries, 4);
        assert_eq!(sc.retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn config_builders() {
        let rc = ReceiverConfig::default()
            .with_backlog(1)
            .with_buffer_size(0)
            .with_read_timeout(Some(Duration::from_millis(5)));
        assert_eq!(rc.backlog, 1);
        assert_eq!(rc.buffer_size, 1);
        assert_eq!(rc.read_timeout, Some(Duration::from_millis(5)));

        let sc = SenderConfig::default()
            .with_retries(0)
            .with_retry_delay(Duration::ZERO);
        assert_eq!(sc.retries, 0);
        assert_eq!(sc.retry_delay, Duration::ZERO);
    }
}
