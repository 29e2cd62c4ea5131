//! Mock serial device for testing.
//!
//! Simulates serial device behavior without hardware: reads block on a
//! condvar until data is queued or the configured timeout elapses, writes
//! are logged for inspection, and faults can be injected to exercise the
//! terminal paths of the port and listener.
//!
//! Clones share the same underlying state, mirroring how cloned OS handles
//! address one device. That lets a test hold a `MockDevice` while a port
//! built over a clone of it is being driven from another thread.

use super::{DataBits, DeviceAdapter, Parity, StopBits};
use crate::error::PortError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct MockState {
    /// Bytes waiting to be returned by reads.
    read_queue: VecDeque<u8>,
    /// Every chunk accepted by a write, in order.
    write_log: Vec<Vec<u8>>,
    /// Timeout currently configured on the handle.
    timeout: Duration,
    /// When set, every subsequent read fails with this kind.
    read_fault: Option<io::ErrorKind>,
    /// When set, every subsequent write fails with this kind.
    write_fault: Option<io::ErrorKind>,
    /// Cap on how many bytes one write call accepts, to simulate partial
    /// writes.
    max_write_chunk: Option<usize>,
}

#[derive(Debug)]
struct MockShared {
    state: Mutex<MockState>,
    data_ready: Condvar,
}

/// Mock serial device.
///
/// # Example
/// ```
/// use serialbridge::device::{DeviceAdapter, MockDevice};
///
/// let mut device = MockDevice::new("MOCK0");
/// device.push_read(b"Hello");
///
/// let mut buffer = [0u8; 16];
/// let n = device.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello");
///
/// device.write_bytes(b"ACK").unwrap();
/// assert_eq!(device.write_log(), vec![b"ACK".to_vec()]);
/// ```
#[derive(Clone, Debug)]
pub struct MockDevice {
    name: String,
    shared: Arc<MockShared>,
}

impl MockDevice {
    /// Create a mock device with an empty read queue and a 1 s timeout.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(MockShared {
                state: Mutex::new(MockState {
                    read_queue: VecDeque::new(),
                    write_log: Vec::new(),
                    timeout: Duration::from_secs(1),
                    read_fault: None,
                    write_fault: None,
                    max_write_chunk: None,
                }),
                data_ready: Condvar::new(),
            }),
        }
    }

    /// Queue bytes for subsequent reads and wake any blocked reader.
    pub fn push_read(&self, data: &[u8]) {
        let mut state = self.shared.state.lock();
        state.read_queue.extend(data);
        self.shared.data_ready.notify_all();
    }

    /// Every chunk accepted by writes so far.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// All written bytes concatenated, for tests that loop partial writes.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.shared.state.lock().write_log.concat()
    }

    /// Fail every subsequent read with the given kind, waking blocked
    /// readers so the fault is observed promptly.
    pub fn inject_read_fault(&self, kind: io::ErrorKind) {
        let mut state = self.shared.state.lock();
        state.read_fault = Some(kind);
        self.shared.data_ready.notify_all();
    }

    /// Fail every subsequent write with the given kind.
    pub fn inject_write_fault(&self, kind: io::ErrorKind) {
        self.shared.state.lock().write_fault = Some(kind);
    }

    /// Cap how many bytes a single write call accepts.
    pub fn set_max_write_chunk(&self, max: usize) {
        self.shared.state.lock().max_write_chunk = Some(max);
    }

    /// Bytes currently queued for reads.
    pub fn available(&self) -> usize {
        self.shared.state.lock().read_queue.len()
    }
}

impl DeviceAdapter for MockDevice {
    fn read_bytes(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.state.lock();
        let timeout = state.timeout;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(kind) = state.read_fault {
                return Err(io::Error::new(kind, "injected device fault"));
            }

            if !state.read_queue.is_empty() {
                let mut read = 0;
                for slot in buffer.iter_mut() {
                    match state.read_queue.pop_front() {
                        Some(byte) => {
                            *slot = byte;
                            read += 1;
                        }
                        None => break,
                    }
                }
                return Ok(read);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "mock read timed out",
                ));
            }
            self.shared.data_ready.wait_for(&mut state, remaining);
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.shared.state.lock();

        if let Some(kind) = state.write_fault {
            return Err(io::Error::new(kind, "injected device fault"));
        }

        let accepted = match state.max_write_chunk {
            Some(max) => data.len().min(max),
            None => data.len(),
        };
        state.write_log.push(data[..accepted].to_vec());
        Ok(accepted)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.shared.state.lock().timeout = timeout;
        Ok(())
    }

    fn set_data_bits(&mut self, _bits: DataBits) -> Result<(), PortError> {
        Ok(())
    }

    fn set_parity(&mut self, _parity: Parity) -> Result<(), PortError> {
        Ok(())
    }

    fn set_stop_bits(&mut self, _bits: StopBits) -> Result<(), PortError> {
        Ok(())
    }

    fn try_clone_device(&self) -> Result<Box<dyn DeviceAdapter>, PortError> {
        Ok(Box::new(self.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&self) -> Option<usize> {
        Some(self.available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_read() {
        let mut device = MockDevice::new("MOCK0");
        device.push_read(b"Hello");

        let mut buffer = [0u8; 10];
        let n = device.read_bytes(&mut buffer).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buffer[..n], b"Hello");
    }

    #[test]
    fn test_partial_read_leaves_remainder_queued() {
        let mut device = MockDevice::new("MOCK0");
        device.push_read(b"Hello, World!");

        let mut buffer = [0u8; 5];
        let n = device.read_bytes(&mut buffer).unwrap();
        assert_eq!(n, 5);
        assert_eq!(device.available(), 8);
    }

    #[test]
    fn test_empty_read_times_out() {
        let mut device = MockDevice::new("MOCK0");
        device.set_timeout(Duration::from_millis(20)).unwrap();

        let mut buffer = [0u8; 4];
        let err = device.read_bytes(&mut buffer).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_read_wakes_on_push_from_clone() {
        let device = MockDevice::new("MOCK0");
        let mut reader = device.clone();
        reader.set_timeout(Duration::from_secs(5)).unwrap();

        let feeder = device.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            feeder.push_read(b"late");
        });

        let started = Instant::now();
        let mut buffer = [0u8; 8];
        let n = reader.read_bytes(&mut buffer).unwrap();
        handle.join().unwrap();

        assert_eq!(&buffer[..n], b"late");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_write_logging_and_partial_writes() {
        let mut device = MockDevice::new("MOCK0");
        device.set_max_write_chunk(3);

        let n = device.write_bytes(b"abcdef").unwrap();
        assert_eq!(n, 3);
        assert_eq!(device.write_log(), vec![b"abc".to_vec()]);
    }

    #[test]
    fn test_injected_read_fault() {
        let mut device = MockDevice::new("MOCK0");
        device.inject_read_fault(io::ErrorKind::BrokenPipe);

        let mut buffer = [0u8; 4];
        let err = device.read_bytes(&mut buffer).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_clones_share_state() {
        let device = MockDevice::new("MOCK0");
        let mut a = device.clone();
        let mut b = device.clone();

        a.write_bytes(b"one").unwrap();
        b.write_bytes(b"two").unwrap();
        assert_eq!(device.write_log().len(), 2);
    }
}
