//! End-to-end tests over a pseudo-terminal pair.
//!
//! Each test opens both ends of a PTY pair as ports, the same setup the
//! engine's facade is exercised with from C (`socat -d -d pty,raw,echo=0
//! pty,raw,echo=0` style), so the timeout, framing, and listener contracts
//! are verified against real OS file descriptors.

#![cfg(unix)]

use parking_lot::Mutex;
use serial_test::serial;
use serialbridge::device::NativeDevice;
use serialbridge::{ListenerState, Port, TransferError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Opt-in test logging: `RUST_LOG=serialbridge=debug cargo test`.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Both ends of a pseudo-terminal pair, wrapped as ports.
fn pty_pair(timeout_secs: f32) -> (Port, Port) {
    init_logging();
    let (master, slave) = serialport::TTYPort::pair().expect("pseudo-terminal pair");
    let timeout = Duration::from_secs_f32(timeout_secs);

    let a = NativeDevice::from_raw(Box::new(master), "pty-master");
    let b = NativeDevice::from_raw(Box::new(slave), "pty-slave");
    let a = Port::from_device(Box::new(a), 115_200, timeout).expect("port A");
    let b = Port::from_device(Box::new(b), 115_200, timeout).expect("port B");
    (a, b)
}

/// Line collector shared with listener callbacks.
#[derive(Clone, Default)]
struct Lines(Arc<Mutex<Vec<Vec<u8>>>>);

impl Lines {
    fn callback(&self) -> impl FnMut(&[u8]) + Send + 'static {
        let lines = Arc::clone(&self.0);
        move |bytes: &[u8]| lines.lock().push(bytes.to_vec())
    }

    fn snapshot(&self) -> Vec<Vec<u8>> {
        self.0.lock().clone()
    }

    fn wait_for(&self, count: usize, deadline: Duration) -> Vec<Vec<u8>> {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if self.0.lock().len() >= count {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.snapshot()
    }
}

#[test]
#[serial]
fn write_str_then_read_line_round_trips() {
    let (a, b) = pty_pair(2.5);

    let written = a.write_str("Hello From C++!\n").expect("write");
    assert_eq!(written, 16);

    let mut line = Vec::new();
    let consumed = b.read_line(&mut line).expect("read_line");
    assert_eq!(consumed, 16);
    assert_eq!(line, b"Hello From C++!");
}

#[test]
#[serial]
fn read_line_strips_crlf_and_counts_raw_bytes() {
    let (a, b) = pty_pair(2.5);

    a.write_str("DONE\r\n").expect("write");

    let mut line = Vec::new();
    let consumed = b.read_line(&mut line).expect("read_line");
    assert_eq!(consumed, 6);
    assert_eq!(line, b"DONE");
}

#[test]
#[serial]
fn listener_delivers_ping_within_a_second() {
    let (a, b) = pty_pair(0.25);

    let lines = Lines::default();
    let mut builder = b.create_listener_builder().expect("builder");
    builder.add_read_callback(lines.callback());
    let listener = builder.build();
    listener.listen().expect("listen");

    a.write_str("ping\n").expect("write");

    let delivered = lines.wait_for(1, Duration::from_secs(1));
    assert_eq!(delivered, vec![b"ping".to_vec()]);

    listener.stop();
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[test]
#[serial]
fn listener_exactly_once_per_callback_then_silent_after_stop() {
    let (a, b) = pty_pair(0.1);

    let first = Lines::default();
    let second = Lines::default();
    let mut builder = b.create_listener_builder().expect("builder");
    builder.add_read_callback(first.callback());
    builder.add_read_callback(second.callback());
    let listener = builder.build();
    listener.listen().expect("listen");

    a.write_str("one\ntwo\nthree\n").expect("write");

    let expected = vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()];
    assert_eq!(first.wait_for(3, Duration::from_secs(2)), expected);
    assert_eq!(second.wait_for(3, Duration::from_secs(2)), expected);

    listener.stop();

    // Data sent after stop() returns must never reach the callbacks.
    a.write_str("late\n").expect("write");
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(first.snapshot().len(), 3);
    assert_eq!(second.snapshot().len(), 3);
}

#[test]
#[serial]
fn read_times_out_within_the_configured_bound() {
    let (_a, b) = pty_pair(0.2);

    let started = Instant::now();
    let mut buffer = [0u8; 16];
    let err = b.read(&mut buffer).expect_err("nothing was written");
    let elapsed = started.elapsed();

    assert!(err.is_timeout());
    assert!(elapsed >= Duration::from_millis(150), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "overran the timeout: {elapsed:?}");
}

#[test]
#[serial]
fn shorter_timeout_returns_sooner() {
    let (_a, b) = pty_pair(0.1);

    let mut buffer = [0u8; 16];

    let started = Instant::now();
    let _ = b.read(&mut buffer).expect_err("silent device");
    let short = started.elapsed();

    b.set_timeout(0.5).expect("set_timeout");
    let started = Instant::now();
    let _ = b.read(&mut buffer).expect_err("silent device");
    let long = started.elapsed();

    assert!(short < long, "timeout {short:?} should undercut {long:?}");
}

#[test]
#[serial]
fn close_is_idempotent_and_terminal() {
    let (a, b) = pty_pair(0.5);

    b.close();
    b.close();

    let mut buffer = [0u8; 8];
    assert!(matches!(
        b.read(&mut buffer).expect_err("closed"),
        TransferError::Closed
    ));
    assert!(matches!(
        b.write(b"x").expect_err("closed"),
        TransferError::Closed
    ));

    drop(b);
    drop(a);
}

#[test]
#[serial]
fn listener_faults_when_the_peer_disappears() {
    let (a, b) = pty_pair(0.1);

    let lines = Lines::default();
    let mut builder = b.create_listener_builder().expect("builder");
    builder.add_read_callback(lines.callback());
    let listener = builder.build();
    listener.listen().expect("listen");

    a.write_str("still here\n").expect("write");
    assert_eq!(lines.wait_for(1, Duration::from_secs(2)).len(), 1);

    // Dropping the master end kills the line; the listener must stop on
    // the resulting device fault rather than spin or hang.
    drop(a);

    let deadline = Instant::now() + Duration::from_secs(3);
    while listener.state() != ListenerState::Stopped && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(listener.state(), ListenerState::Stopped);
    assert!(listener.has_fault());
}

#[test]
#[serial]
fn manual_reads_resume_after_listener_stops() {
    let (a, b) = pty_pair(0.1);

    let listener = b.create_listener_builder().expect("builder").build();
    listener.listen().expect("listen");
    listener.stop();

    a.write_str("manual\n").expect("write");
    let mut line = Vec::new();
    let consumed = b.read_line(&mut line).expect("read_line");
    assert_eq!(consumed, 7);
    assert_eq!(line, b"manual");
}
