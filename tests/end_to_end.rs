//! Loopback tests driving the receiver and sender against each other over real
//! sockets.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sendrecv::config::{ReceiverConfig, SenderConfig};
use sendrecv::{Error, Receiver, Sender, SenderError, Socket};

const LOCALHOST: &str = "127.0.0.1";

/// Bound receiver on an OS-chosen port, collecting everything it receives.
struct Harness {
    port: u16,
    received: Arc<Mutex<Vec<u8>>>,
    shutdown: sendrecv::ShutdownHandle,
    server: thread::JoinHandle<sendrecv::Result<()>>,
}

impl Harness {
    fn start() -> Self {
        let receiver = Receiver::bind(LOCALHOST, 0, ReceiverConfig::default()).unwrap();
        let port = receiver.local_addr().unwrap().port();
        let shutdown = receiver.shutdown_handle();
        let received = Arc::new(Mutex::new(Vec::new()));

        let server = {
            let received = Arc::clone(&received);
            thread::spawn(move || {
                receiver.run(move |data| received.lock().unwrap().extend_from_slice(data))
            })
        };

        Self {
            port,
            received,
            shutdown,
            server,
        }
    }

    fn wait_for(&self, len: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.received.lock().unwrap().len() < len {
            assert!(Instant::now() < deadline, "timed out waiting for data");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn stop(self) -> Vec<u8> {
        self.shutdown.shutdown().unwrap();
        self.server.join().unwrap().unwrap();
        Arc::try_unwrap(self.received).unwrap().into_inner().unwrap()
    }
}

fn connect(port: u16) -> Socket {
    let mut sock = Socket::new(LOCALHOST, port).unwrap();
    sock.connect().unwrap();
    sock
}

/// Bound but never listening: connections to its port are refused while the
/// socket is alive.
fn refusing_port() -> (Socket, u16) {
    let mut sock = Socket::new(LOCALHOST, 0).unwrap();
    sock.bind().unwrap();
    let port = sock.local_addr().unwrap().port();
    (sock, port)
}

#[test]
fn segmented_message_is_reconstructed() {
    let harness = Harness::start();
    let message: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

    let mut client = connect(harness.port);
    for segment in [&message[..1], &message[1..1500], &message[1500..1501], &message[1501..]] {
        client.send(segment).unwrap();
        thread::sleep(Duration::from_millis(2));
    }
    client.close();

    harness.wait_for(message.len());
    assert_eq!(harness.stop(), message);
}

#[test]
fn shutdown_joins_outstanding_workers() {
    let harness = Harness::start();
    let peer_closed = Arc::new(AtomicBool::new(false));

    let client = connect(harness.port);
    client.send(b"still here").unwrap();
    harness.wait_for(10);

    let closer = {
        let peer_closed = Arc::clone(&peer_closed);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            peer_closed.store(true, Ordering::SeqCst);
            drop(client);
        })
    };

    // Returns only once the worker has seen the peer close.
    let received = harness.stop();
    assert!(peer_closed.load(Ordering::SeqCst));
    assert_eq!(received, b"still here");

    closer.join().unwrap();
}

#[test]
fn sender_lines_reach_receiver() {
    let harness = Harness::start();

    let mut sender = Sender::new(LOCALHOST, harness.port).unwrap();
    sender.connect(0).unwrap();
    let count = sender
        .send_stream(Cursor::new("line1\nline2\nline3"))
        .unwrap();
    assert_eq!(count, 3);
    drop(sender);

    let expected = b"line1\nline2\nline3\n";
    harness.wait_for(expected.len());
    assert_eq!(harness.stop(), expected);
}

#[test]
fn concurrent_clients_are_served() {
    let harness = Harness::start();

    let clients: Vec<_> = (0..8)
        .map(|i| {
            let port = harness.port;
            thread::spawn(move || {
                let sock = connect(port);
                sock.send(format!("client-{i}\n").as_bytes()).unwrap();
            })
        })
        .collect();
    for client in clients {
        client.join().unwrap();
    }

    let expected_len: usize = (0..8).map(|i| format!("client-{i}\n").len()).sum();
    harness.wait_for(expected_len);

    let received = String::from_utf8(harness.stop()).unwrap();
    let mut lines: Vec<_> = received.lines().collect();
    lines.sort_unstable();
    let expected: Vec<_> = (0..8).map(|i| format!("client-{i}")).collect();
    assert_eq!(lines, expected);
}

#[test]
fn sender_gives_up_on_refusing_endpoint() {
    let (_guard, port) = refusing_port();
    let delay = Duration::from_millis(20);
    let mut sender = Sender::with_config(
        LOCALHOST,
        port,
        SenderConfig::default().with_retry_delay(delay),
    )
    .unwrap();

    let start = Instant::now();
    let err = sender.connect(2).unwrap_err();

    assert!(matches!(
        err,
        Error::Sender(SenderError::ConnectFailed { attempts: 3 })
    ));
    assert!(start.elapsed() >= delay * 2);
    assert!(!sender.is_connected());
}

#[test]
fn sender_retries_until_receiver_starts() {
    let (guard, port) = refusing_port();

    let server = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        drop(guard);
        let receiver = Receiver::bind(LOCALHOST, port, ReceiverConfig::default()).unwrap();
        let shutdown = receiver.shutdown_handle();
        let received = Arc::new(Mutex::new(Vec::new()));
        let server = {
            let received = Arc::clone(&received);
            thread::spawn(move || {
                receiver.run(move |data| received.lock().unwrap().extend_from_slice(data))
            })
        };
        (shutdown, server, received)
    });

    let mut sender = Sender::with_config(
        LOCALHOST,
        port,
        SenderConfig::default().with_retry_delay(Duration::from_millis(50)),
    )
    .unwrap();
    sender.connect(20).unwrap();
    sender.send_stream(Cursor::new("late\n")).unwrap();
    drop(sender);

    let (shutdown, server, received) = server.join().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while received.lock().unwrap().len() < 5 {
        assert!(Instant::now() < deadline, "timed out waiting for data");
        thread::sleep(Duration::from_millis(5));
    }

    shutdown.shutdown().unwrap();
    server.join().unwrap().unwrap();
    assert_eq!(received.lock().unwrap().as_slice(), b"late\n");
}

#[test]
fn send_stream_before_connect_is_rejected() {
    let (_guard, port) = refusing_port();
    let mut sender = Sender::new(LOCALHOST, port).unwrap();
    let err = sender.send_stream(Cursor::new("x\n")).unwrap_err();
    assert!(matches!(err, Error::Sender(SenderError::NotConnected)));
}
