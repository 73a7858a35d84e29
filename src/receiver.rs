//! Server role: accepts connections and streams each one's bytes to a handler
//! on its own worker thread.

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::ReceiverConfig;
use crate::net::Socket;
use crate::{Result, debug, error, info, warn};

/// Callback receiving the bytes of each successful `recv()`.
///
/// The same handler is invoked concurrently from every worker thread, without
/// any synchronization from the receiver; it must be `Send + Sync`.
pub type Handler = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// A bound, listening server socket plus the accept loop that drives it.
#[derive(Debug)]
pub struct Receiver {
    listener: Arc<Socket>,
    config: ReceiverConfig,
}

/// Stops a running [Receiver::run] from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    listener: Arc<Socket>,
}

impl ShutdownHandle {
    /// Aborts the listening socket. The blocked `accept()` returns no
    /// connection, the accept loop ends, and [Receiver::run] returns after
    /// joining every worker.
    ///
    /// Workers still blocked on a live peer keep running until that peer
    /// closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the listening socket cannot be shut down.
    pub fn shutdown(&self) -> Result<()> {
        info!("shutting down listener on {}", self.listener);
        self.listener.shutdown()
    }
}

impl Receiver {
    /// Creates a socket for `addr:port`, binds it and starts listening.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is malformed or any of the socket
    /// calls fail.
    pub fn bind(addr: &str, port: u16, config: ReceiverConfig) -> Result<Self> {
        let config = ReceiverConfig {
            buffer_size: config.buffer_size.max(1),
            ..config
        };

        let mut listener = Socket::new(addr, port)?;
        listener.set_reuse_address(true)?;
        listener.bind()?;
        listener.listen(config.backlog)?;

        let local = listener.local_addr()?;
        info!("listening on {local} (backlog {})", config.backlog);

        Ok(Self {
            listener: Arc::new(listener),
            config,
        })
    }

    /// Binds `addr:port` with the default configuration and runs the accept
    /// loop until the listener is shut down.
    ///
    /// # Errors
    ///
    /// See [Receiver::bind] and [Receiver::run].
    pub fn execute<H>(addr: &str, port: u16, handler: H) -> Result<()>
    where
        H: Fn(&[u8]) + Send + Sync + 'static,
    {
        Self::bind(addr, port, ReceiverConfig::default())?.run(handler)
    }

    /// Returns the address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddrV4> {
        self.listener.local_addr()
    }

    /// Returns a handle that stops the accept loop.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            listener: Arc::clone(&self.listener),
        }
    }

    /// Runs the accept loop on the calling thread.
    ///
    /// Every accepted connection gets its own worker thread that passes the
    /// received bytes to `handler` until the peer disconnects. Failures inside
    /// a worker are logged there and never reach the acceptor or other
    /// workers.
    ///
    /// Returns once the listener is shut down and every worker has finished.
    ///
    /// # Errors
    ///
    /// Returns the acceptor's own `accept()` failure, after joining the
    /// workers.
    pub fn run<H>(self, handler: H) -> Result<()>
    where
        H: Fn(&[u8]) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let mut workers = Vec::new();

        let result = self.accept_loop(&handler, &mut workers);

        if !workers.is_empty() {
            info!("waiting for {} connection(s) to finish", workers.len());
        }
        join_all(workers);

        result
    }

    fn accept_loop(&self, handler: &Handler, workers: &mut Vec<JoinHandle<()>>) -> Result<()> {
        let mut next_id: u64 = 0;

        while let Some(socket) = self.listener.accept()? {
            next_id += 1;
            info!("[conn {next_id}] accepted connection from {socket}");

            if let Err(err) = socket.set_read_timeout(self.config.read_timeout) {
                warn!("[conn {next_id}] {err}");
            }

            let task = ConnectionTask {
                id: next_id,
                socket,
                handler: Arc::clone(handler),
                buffer_size: self.config.buffer_size,
            };

            reap_finished(workers);

            match thread::Builder::new()
                .name(format!("conn-{next_id}"))
                .spawn(move || task.run())
            {
                Ok(worker) => workers.push(worker),
                Err(err) => error!("[conn {next_id}] failed to spawn worker: {err}"),
            }
        }

        info!("listener on {} closed", self.listener);
        Ok(())
    }
}

/// Worker unit owning one accepted connection.
struct ConnectionTask {
    id: u64,
    socket: Socket,
    handler: Handler,
    buffer_size: usize,
}

impl ConnectionTask {
    fn run(self) {
        match self.recv_loop() {
            Ok(total) => {
                info!(
                    "[conn {}] {} disconnected after {total} bytes",
                    self.id, self.socket
                );
            }
            Err(err) => {
                error!("[conn {}] {err}", self.id);
            }
        }
    }

    fn recv_loop(&self) -> Result<usize> {
        let mut buf = vec![0u8; self.buffer_size.max(1)];
        let mut total = 0;

        while let Some(nbytes) = self.socket.recv(&mut buf[..])? {
            debug!("[conn {}] received {nbytes} bytes", self.id);
            (self.handler)(&buf[..nbytes]);
            total += nbytes;
        }

        Ok(total)
    }
}

/// Joins workers that have already exited so the list tracks live ones only.
fn reap_finished(workers: &mut Vec<JoinHandle<()>>) {
    let (finished, running): (Vec<_>, Vec<_>) =
        workers.drain(..).partition(|worker| worker.is_finished());
    *workers = running;
    join_all(finished);
}

fn join_all(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        let name = worker.thread().name().unwrap_or("worker").to_string();
        if worker.join().is_err() {
            error!("{name} panicked while handling its connection");
        }
    }
}
