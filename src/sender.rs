//! Client role: connects with bounded retry and streams line-delimited input to
//! the server.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;

use crate::config::{BUFFER_SIZE, SenderConfig};
use crate::error::{SenderError, errno};
use crate::net::Socket;
use crate::{Result, debug, info, warn};

/// Argument that switches input to standard input and ends file collection.
pub const STDIN_ARG: &str = "-";

/// The operations the sender needs from its connection.
pub trait Connection {
    /// Makes one connection attempt.
    ///
    /// Must report a refusal as [crate::Error::ConnectionRefused] for the
    /// attempt to be retried.
    fn connect(&mut self) -> Result<()>;

    /// Returns `true` once a connection attempt has succeeded.
    fn is_connected(&self) -> bool;

    /// Transmits all of `buf`.
    fn send(&mut self, buf: &[u8]) -> Result<()>;
}

impl Connection for Socket {
    fn connect(&mut self) -> Result<()> {
        Socket::connect(self)
    }

    fn is_connected(&self) -> bool {
        Socket::is_connected(self)
    }

    fn send(&mut self, buf: &[u8]) -> Result<()> {
        Socket::send(self, buf)
    }
}

/// The sources to stream, in order: every file, then standard input if
/// requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    /// Files to send.
    pub files: Vec<PathBuf>,
    /// Whether to send standard input after the files.
    pub read_stdin: bool,
}

impl Inputs {
    /// Returns `true` if there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && !self.read_stdin
    }
}

/// Classifies command-line arguments into input sources.
///
/// The first argument (the program name) is skipped. Arguments are file paths
/// until a literal `-`, which selects standard input; anything after it is
/// ignored.
pub fn parse_command_line<I, S>(args: I) -> Inputs
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut inputs = Inputs::default();

    for arg in args.into_iter().skip(1) {
        let arg = arg.as_ref();
        if arg == STDIN_ARG {
            inputs.read_stdin = true;
            break;
        }
        inputs.files.push(PathBuf::from(arg));
    }

    inputs
}

/// Streams input to a server, one line per send.
#[derive(Debug)]
pub struct Sender<C = Socket> {
    conn: C,
    config: SenderConfig,
}

impl Sender<Socket> {
    /// Creates a sender for the server at `addr:port` with the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is malformed or the socket cannot be
    /// created.
    pub fn new(addr: &str, port: u16) -> Result<Self> {
        Self::with_config(addr, port, SenderConfig::default())
    }

    /// Creates a sender for the server at `addr:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is malformed or the socket cannot be
    /// created.
    pub fn with_config(addr: &str, port: u16, config: SenderConfig) -> Result<Self> {
        Ok(Self::from_connection(Socket::new(addr, port)?, config))
    }
}

impl<C: Connection> Sender<C> {
    /// Creates a sender over an existing, not yet connected, connection.
    pub fn from_connection(conn: C, config: SenderConfig) -> Self {
        Self { conn, config }
    }

    /// Returns `true` once connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Connects, making up to `retries + 1` attempts.
    ///
    /// Only refused attempts are retried, each after the configured delay.
    ///
    /// # Errors
    ///
    /// Returns [SenderError::ConnectFailed] once every attempt was refused.
    /// Any other connection error is returned immediately.
    pub fn connect(&mut self, retries: u32) -> Result<()> {
        if self.conn.is_connected() {
            debug!("already connected");
            return Ok(());
        }

        let attempts = retries.saturating_add(1);

        for attempt in 1..=attempts {
            match self.conn.connect() {
                Ok(()) => break,
                Err(err) if err.is_connection_refused() => {
                    warn!("{err} (attempt {attempt} of {attempts})");

                    if attempt < attempts {
                        info!("cannot connect to server, retrying...");
                        thread::sleep(self.config.retry_delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        if !self.conn.is_connected() {
            return Err(SenderError::ConnectFailed { attempts }.into());
        }

        info!("connected");
        Ok(())
    }

    /// Sends `input` line by line and returns the number of lines sent.
    ///
    /// Each line is sent with exactly one trailing `\n` in a single send of at
    /// most [BUFFER_SIZE] bytes; longer lines are truncated. A final line
    /// without a terminator is sent too.
    ///
    /// # Errors
    ///
    /// Returns [SenderError::NotConnected] if not connected, or the first
    /// read or send error.
    pub fn send_stream<R: BufRead>(&mut self, mut input: R) -> Result<usize> {
        if !self.conn.is_connected() {
            return Err(SenderError::NotConnected.into());
        }

        let mut line = Vec::with_capacity(BUFFER_SIZE);
        let mut count = 0;

        while read_line_capped(&mut input, &mut line, BUFFER_SIZE - 1)? {
            line.push(b'\n');
            self.conn.send(&line)?;
            count += 1;
        }

        Ok(count)
    }

    /// Sends every file in `inputs` in order, then standard input if
    /// requested.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be opened or any stream fails.
    pub fn send_inputs(&mut self, inputs: &Inputs) -> Result<()> {
        for path in &inputs.files {
            let file = File::open(path)
                .map_err(|err| errno!(err; "failed to open {}", path.display()))?;

            let count = self.send_stream(BufReader::new(file))?;
            info!("sent {count} line(s) from {}", path.display());
        }

        if inputs.read_stdin {
            let count = self.send_stream(io::stdin().lock())?;
            info!("sent {count} line(s) from standard input");
        }

        Ok(())
    }

    /// Parses `args`, connects using the configured retry count and sends
    /// every input.
    ///
    /// # Errors
    ///
    /// See [Sender::connect] and [Sender::send_inputs].
    pub fn execute<I, S>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let inputs = parse_command_line(args);

        self.connect(self.config.retries)?;
        self.send_inputs(&inputs)
    }
}

/// Reads the next line into `line` without its terminator, keeping at most
/// `cap` bytes and discarding the rest of the line.
///
/// Returns `false` at end of input.
fn read_line_capped<R: BufRead>(input: &mut R, line: &mut Vec<u8>, cap: usize) -> io::Result<bool> {
    line.clear();
    let mut read_any = false;

    loop {
        let (consumed, complete) = {
            let available = match input.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };

            if available.is_empty() {
                return Ok(read_any);
            }

            let (len, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos, true),
                None => (available.len(), false),
            };

            let room = cap.saturating_sub(line.len());
            line.extend_from_slice(&available[..len.min(room)]);

            (if complete { len + 1 } else { len }, complete)
        };

        input.consume(consumed);
        read_any = true;

        if complete {
            return Ok(true);
        }
    }
}
