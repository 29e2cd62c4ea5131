//! Port abstraction: one open serial device with timeout-governed I/O.
//!
//! A `Port` owns two handles onto the same device — a writer and a cloned
//! reader — so writes proceed independently of the read path, and a
//! running listener never blocks a writer. The reader side additionally
//! carries a small buffer for bytes read past a line terminator, which are
//! served to the next read instead of being dropped.
//!
//! # Shared-resource contract
//!
//! The device is a single exclusively-owned resource. Driving manual reads
//! while a listener built on the same port is running is a caller contract
//! violation: the internal reader lock keeps it memory-safe, but which
//! caller receives which bytes is unspecified. Writes are always safe to
//! issue concurrently with a running listener.

use crate::device::{
    DataBits, DeviceAdapter, NativeDevice, Parity, PortSettings, StopBits,
};
use crate::error::{PortError, TransferError};
use crate::listener::ListenerBuilder;
use memchr::memchr;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Scratch size for chunked reads on the line-framing path.
const READ_CHUNK_SIZE: usize = 256;

/// Shared port state: both device handles, the configured timeout, and the
/// reader-side carry buffer. Held behind an `Arc` so listeners keep it
/// alive for as long as their background thread runs.
pub(crate) struct Shared {
    path: String,
    baud_rate: u32,
    timeout: Mutex<Duration>,
    writer: Mutex<Option<Box<dyn DeviceAdapter>>>,
    reader: Mutex<ReadChannel>,
}

/// The exclusive read path: a cloned device handle plus bytes read past the
/// last consumed line terminator.
struct ReadChannel {
    device: Option<Box<dyn DeviceAdapter>>,
    carry: Vec<u8>,
}

impl Shared {
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Line-oriented read into `out`, bounded by the currently configured
    /// timeout. Used by both `Port::read_line` and the listener loop.
    pub(crate) fn read_line_into(&self, out: &mut Vec<u8>) -> Result<usize, TransferError> {
        let timeout = self.timeout();
        self.reader.lock().read_line(out, timeout)
    }

    fn read_into(&self, buffer: &mut [u8]) -> Result<usize, TransferError> {
        let timeout = self.timeout();
        self.reader.lock().read(buffer, timeout)
    }

    fn close(&self) {
        let writer = self.writer.lock().take();
        let was_open = writer.is_some();
        drop(writer);

        // Taking the reader lock waits out any read in flight (bounded by
        // the timeout), so the handle is never dropped mid-read.
        let mut reader = self.reader.lock();
        reader.device = None;
        reader.carry.clear();

        if was_open {
            debug!(path = %self.path, "serial port closed");
        }
    }
}

impl ReadChannel {
    /// Fill `buffer` with whatever arrives first: carried-over bytes, or a
    /// single bounded read from the device.
    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, TransferError> {
        if self.device.is_none() {
            return Err(TransferError::Closed);
        }
        if buffer.is_empty() {
            return Ok(0);
        }

        if !self.carry.is_empty() {
            let n = self.carry.len().min(buffer.len());
            buffer[..n].copy_from_slice(&self.carry[..n]);
            self.carry.drain(..n);
            return Ok(n);
        }

        let device = match self.device.as_mut() {
            Some(device) => device,
            None => return Err(TransferError::Closed),
        };
        arm_timeout(device.as_mut(), timeout)?;

        let deadline = Instant::now() + timeout;
        loop {
            match device.read_bytes(buffer) {
                Ok(0) => {
                    return Err(TransferError::Io {
                        bytes: 0,
                        source: io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "device returned end of stream",
                        ),
                    })
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if Instant::now() >= deadline {
                        return Err(TransferError::TimedOut { bytes: 0, timeout });
                    }
                }
                Err(e) if is_timeout_kind(e.kind()) => {
                    return Err(TransferError::TimedOut { bytes: 0, timeout })
                }
                Err(e) => return Err(TransferError::Io { bytes: 0, source: e }),
            }
        }
    }

    /// Append bytes to `out` until a `\n` is consumed or the deadline
    /// passes.
    ///
    /// The terminator (and a `\r` immediately before it) is consumed from
    /// the stream but excluded from `out`; the returned count is the raw
    /// bytes consumed this call, terminator included. On timeout the
    /// partial line stays appended to `out` and the timeout error carries
    /// its length; bytes past the terminator are kept in `carry` for the
    /// next read.
    fn read_line(&mut self, out: &mut Vec<u8>, timeout: Duration) -> Result<usize, TransferError> {
        if self.device.is_none() {
            return Err(TransferError::Closed);
        }

        let deadline = Instant::now() + timeout;
        let mut consumed = 0usize;

        // Carried-over bytes are the oldest data, so they go first.
        if !self.carry.is_empty() {
            match memchr(b'\n', &self.carry) {
                Some(pos) => {
                    out.extend_from_slice(&self.carry[..pos]);
                    strip_trailing_cr(out);
                    consumed += pos + 1;
                    self.carry.drain(..=pos);
                    return Ok(consumed);
                }
                None => {
                    consumed += self.carry.len();
                    out.append(&mut self.carry);
                }
            }
        }

        let device = match self.device.as_mut() {
            Some(device) => device,
            None => return Err(TransferError::Closed),
        };

        let mut scratch = [0u8; READ_CHUNK_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Err(e) = arm_timeout(device.as_mut(), remaining) {
                return match e {
                    TransferError::Io { source, .. } => Err(TransferError::Io {
                        bytes: consumed,
                        source,
                    }),
                    other => Err(other),
                };
            }

            match device.read_bytes(&mut scratch) {
                Ok(0) => {
                    return Err(TransferError::Io {
                        bytes: consumed,
                        source: io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "device returned end of stream",
                        ),
                    })
                }
                Ok(n) => {
                    let chunk = &scratch[..n];
                    match memchr(b'\n', chunk) {
                        Some(pos) => {
                            out.extend_from_slice(&chunk[..pos]);
                            strip_trailing_cr(out);
                            self.carry.extend_from_slice(&chunk[pos + 1..]);
                            consumed += pos + 1;
                            return Ok(consumed);
                        }
                        None => {
                            out.extend_from_slice(chunk);
                            consumed += n;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if is_timeout_kind(e.kind()) => {
                    return Err(TransferError::TimedOut {
                        bytes: consumed,
                        timeout,
                    })
                }
                Err(e) => {
                    return Err(TransferError::Io {
                        bytes: consumed,
                        source: e,
                    })
                }
            }

            if Instant::now() >= deadline {
                return Err(TransferError::TimedOut {
                    bytes: consumed,
                    timeout,
                });
            }
        }
    }
}

/// A `\r` left at the end of the accumulated line belongs to the terminator
/// that was just consumed, including when the pair was split across reads.
fn strip_trailing_cr(out: &mut Vec<u8>) {
    if out.last() == Some(&b'\r') {
        out.pop();
    }
}

fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn arm_timeout(device: &mut dyn DeviceAdapter, timeout: Duration) -> Result<(), TransferError> {
    device.set_timeout(timeout).map_err(|e| TransferError::Io {
        bytes: 0,
        source: io::Error::other(e),
    })
}

/// An open serial port.
///
/// Created by [`Port::open`], configured with [`Port::set_timeout`], and
/// torn down by [`Port::close`] or drop. All operations take `&self`; the
/// port is safe to share by reference between a writer thread and a
/// listener.
///
/// # Example
/// ```no_run
/// use serialbridge::Port;
///
/// let port = Port::open("/dev/ttyUSB0", 115_200)?;
/// port.set_timeout(2.5)?;
/// port.write_str("AT\r\n")?;
///
/// let mut line = Vec::new();
/// let consumed = port.read_line(&mut line)?;
/// println!("{} bytes consumed, line: {:?}", consumed, line);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Port {
    shared: Arc<Shared>,
}

impl Port {
    /// Open the serial device at `path` with 8N1 settings at `baud`.
    ///
    /// The port starts with an effectively unbounded timeout; call
    /// [`Port::set_timeout`] before relying on bounded reads.
    pub fn open(path: &str, baud: u32) -> Result<Self, PortError> {
        Self::open_with(path, &PortSettings::with_baud(baud))
    }

    /// Open the serial device at `path` with explicit settings.
    pub fn open_with(path: &str, settings: &PortSettings) -> Result<Self, PortError> {
        let device = NativeDevice::open(path, settings)?;
        Self::from_device(Box::new(device), settings.baud_rate, settings.timeout)
    }

    /// Build a port over an already-open device handle.
    ///
    /// The handle is cloned for the read path; the original becomes the
    /// writer. This is the seam used to run the port over mocks or
    /// pseudo-terminal ends in tests.
    pub fn from_device(
        device: Box<dyn DeviceAdapter>,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Self, PortError> {
        let reader = device.try_clone_device()?;
        let shared = Arc::new(Shared {
            path: device.name().to_string(),
            baud_rate,
            timeout: Mutex::new(timeout),
            writer: Mutex::new(Some(device)),
            reader: Mutex::new(ReadChannel {
                device: Some(reader),
                carry: Vec::new(),
            }),
        });
        Ok(Self { shared })
    }

    /// The device path this port was opened from.
    pub fn path(&self) -> &str {
        self.shared.path()
    }

    /// The baud rate fixed at open time.
    pub fn baud_rate(&self) -> u32 {
        self.shared.baud_rate
    }

    /// Whether the port is still open.
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// The currently configured timeout.
    pub fn timeout(&self) -> Duration {
        self.shared.timeout()
    }

    /// Set the maximum wait for subsequent reads and writes, in seconds.
    ///
    /// Zero means non-blocking: return immediately with whatever is
    /// available. Negative or non-finite values are rejected with
    /// `InvalidArgument`. Takes effect for operations issued after the
    /// call; an operation already in flight keeps its deadline.
    pub fn set_timeout(&self, seconds: f32) -> Result<(), PortError> {
        let timeout = Duration::try_from_secs_f32(seconds).map_err(|_| {
            PortError::invalid_argument(format!(
                "timeout must be a finite, non-negative number of seconds, got {seconds}"
            ))
        })?;
        *self.shared.timeout.lock() = timeout;
        Ok(())
    }

    /// Set the character size.
    pub fn set_data_bits(&self, bits: DataBits) -> Result<(), PortError> {
        self.with_writer(|device| device.set_data_bits(bits))
    }

    /// Set the parity checking mode.
    pub fn set_parity(&self, parity: Parity) -> Result<(), PortError> {
        self.with_writer(|device| device.set_parity(parity))
    }

    /// Set the number of stop bits.
    pub fn set_stop_bits(&self, bits: StopBits) -> Result<(), PortError> {
        self.with_writer(|device| device.set_stop_bits(bits))
    }

    /// Write as many bytes as the device accepts within the timeout.
    ///
    /// On timeout or device fault the error carries the number of bytes
    /// already written, so the caller can resume from the remainder.
    pub fn write(&self, data: &[u8]) -> Result<usize, TransferError> {
        let timeout = self.shared.timeout();
        let mut guard = self.shared.writer.lock();
        let device = guard.as_mut().ok_or(TransferError::Closed)?;

        arm_timeout(device.as_mut(), timeout)?;
        let deadline = Instant::now() + timeout;
        let mut written = 0usize;

        while written < data.len() {
            match device.write_bytes(&data[written..]) {
                Ok(0) => {
                    return Err(TransferError::Io {
                        bytes: written,
                        source: io::Error::new(
                            io::ErrorKind::WriteZero,
                            "device accepted no bytes",
                        ),
                    })
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if is_timeout_kind(e.kind()) => {
                    return Err(TransferError::TimedOut {
                        bytes: written,
                        timeout,
                    })
                }
                Err(e) => {
                    return Err(TransferError::Io {
                        bytes: written,
                        source: e,
                    })
                }
            }

            if written < data.len() && Instant::now() >= deadline {
                return Err(TransferError::TimedOut {
                    bytes: written,
                    timeout,
                });
            }
        }

        Ok(written)
    }

    /// Write the text's UTF-8 bytes. No terminator is appended; include
    /// your own line ending if one is desired.
    pub fn write_str(&self, text: &str) -> Result<usize, TransferError> {
        self.write(text.as_bytes())
    }

    /// Read into `buffer`, blocking until at least one byte arrives or the
    /// timeout elapses. Bytes previously read past a line terminator are
    /// served first.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize, TransferError> {
        self.shared.read_into(buffer)
    }

    /// Read one line, appending to `out`.
    ///
    /// Blocks until a `\n` is consumed from the stream or the timeout
    /// elapses. The terminator — and a `\r` immediately preceding it — is
    /// consumed but excluded from `out`; the returned count is the number
    /// of bytes consumed from the stream by this call, terminator
    /// included.
    ///
    /// On timeout the partial line is retained in `out` (the error carries
    /// its length), so calling again with the same buffer resumes the same
    /// line.
    pub fn read_line(&self, out: &mut Vec<u8>) -> Result<usize, TransferError> {
        self.shared.read_line_into(out)
    }

    /// Create a builder for a background listener bound to this port.
    ///
    /// May be called any number of times; fails with `Closed` once the
    /// port has been closed.
    pub fn create_listener_builder(&self) -> Result<ListenerBuilder, PortError> {
        if !self.shared.is_open() {
            return Err(PortError::Closed);
        }
        Ok(ListenerBuilder::new(Arc::clone(&self.shared)))
    }

    /// Release the device handles. Idempotent: closing an already-closed
    /// port is a no-op. Subsequent operations fail with `Closed`; a
    /// running listener observes the closure as a terminal condition
    /// within one timeout interval.
    pub fn close(&self) {
        self.shared.close();
    }

    fn with_writer<F>(&self, f: F) -> Result<(), PortError>
    where
        F: FnOnce(&mut Box<dyn DeviceAdapter>) -> Result<(), PortError>,
    {
        let mut guard = self.shared.writer.lock();
        let device = guard.as_mut().ok_or(PortError::Closed)?;
        f(device)
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("path", &self.shared.path)
            .field("baud_rate", &self.shared.baud_rate)
            .field("timeout", &self.shared.timeout())
            .field("open", &self.is_open())
            .finish()
    }
}
