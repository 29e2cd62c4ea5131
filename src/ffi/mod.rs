//! C-callable facade over the engine.
//!
//! Everything here is `extern "C"` with flat status codes: synchronous
//! operations return a status (plus a byte count where partial progress is
//! meaningful) and never unwind across the boundary. Handles are opaque
//! boxed pointers; each `sb_*_free` function releases one, and passing
//! null to a free function is a no-op.
//!
//! # Callback contract
//!
//! A read callback receives the opaque `user_data` pointer it was
//! registered with, a pointer to the delivered bytes, and the byte count.
//! The buffer is valid only for the duration of the call and is a bounded
//! byte span, not a C string — raw serial data may contain embedded zero
//! bytes and there is no NUL terminator. Callbacks run on the listener's
//! background thread and must not block indefinitely; a blocked callback
//! stalls every later delivery on that listener.

pub mod buffer;

pub use buffer::{
    sb_buffer_clear, sb_buffer_data, sb_buffer_free, sb_buffer_len, sb_buffer_new, ByteBuffer,
};

use crate::device::{DataBits, Parity, StopBits};
use crate::error::{ListenerError, PortError, TransferError};
use crate::listener::{Listener, ListenerBuilder, ListenerState};
use crate::port::Port;
use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::slice;

/// Status of a facade operation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbStatus {
    /// The operation fully succeeded.
    NoErr = 0,
    /// The timeout elapsed first; any partial byte count is preserved.
    TimedOut = 1,
    /// The device reported a fault.
    IoError = 2,
    /// A caller-supplied parameter violates a precondition.
    InvalidArgument = 3,
    /// The path did not resolve to a device.
    NotFound = 4,
    /// Access to the device was refused.
    PermissionDenied = 5,
    /// Another owner holds the device exclusively.
    AlreadyInUse = 6,
    /// The port has been closed.
    PortClosed = 7,
}

/// Outcome of a read or write: a status plus the bytes transferred.
///
/// Always check `status` before trusting `bytes`; a `TimedOut` with a
/// nonzero count is an expected partial transfer, not a failure.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SbIoResult {
    pub status: SbStatus,
    pub bytes: usize,
}

/// Listener lifecycle state, mirrored for the facade.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbListenerState {
    Created = 0,
    Running = 1,
    Stopped = 2,
}

/// Character size, mirrored for the facade.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbDataBits {
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
}

/// Parity checking mode, mirrored for the facade.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbParity {
    None = 0,
    Odd = 1,
    Even = 2,
}

impl From<SbDataBits> for DataBits {
    fn from(bits: SbDataBits) -> Self {
        match bits {
            SbDataBits::Five => DataBits::Five,
            SbDataBits::Six => DataBits::Six,
            SbDataBits::Seven => DataBits::Seven,
            SbDataBits::Eight => DataBits::Eight,
        }
    }
}

impl From<SbParity> for Parity {
    fn from(parity: SbParity) -> Self {
        match parity {
            SbParity::None => Parity::None,
            SbParity::Odd => Parity::Odd,
            SbParity::Even => Parity::Even,
        }
    }
}

/// Read callback: `(user_data, data, len)`.
pub type SbReadCallback =
    unsafe extern "C" fn(user_data: *mut c_void, data: *const u8, len: usize);

/// Opaque user pointer carried into the listener thread.
///
/// The caller asserts the pointer is safe to use from that thread; the
/// engine only round-trips it.
#[derive(Clone, Copy)]
struct UserData(*mut c_void);

unsafe impl Send for UserData {}

impl From<&PortError> for SbStatus {
    fn from(err: &PortError) -> Self {
        match err {
            PortError::NotFound(_) => SbStatus::NotFound,
            PortError::PermissionDenied(_) => SbStatus::PermissionDenied,
            PortError::AlreadyInUse(_) => SbStatus::AlreadyInUse,
            PortError::InvalidArgument(_) => SbStatus::InvalidArgument,
            PortError::Closed => SbStatus::PortClosed,
            PortError::Io(_) | PortError::Serial(_) => SbStatus::IoError,
        }
    }
}

impl From<&TransferError> for SbStatus {
    fn from(err: &TransferError) -> Self {
        match err {
            TransferError::TimedOut { .. } => SbStatus::TimedOut,
            TransferError::Io { .. } => SbStatus::IoError,
            TransferError::Closed => SbStatus::PortClosed,
        }
    }
}

fn io_result(result: Result<usize, TransferError>) -> SbIoResult {
    match result {
        Ok(bytes) => SbIoResult {
            status: SbStatus::NoErr,
            bytes,
        },
        Err(err) => SbIoResult {
            status: (&err).into(),
            bytes: err.bytes_transferred(),
        },
    }
}

const INVALID_IO: SbIoResult = SbIoResult {
    status: SbStatus::InvalidArgument,
    bytes: 0,
};

/// Open the serial device at `path` with 8N1 settings at `baud`.
///
/// On success writes the new port handle to `out_port` and returns
/// `NoErr`; on failure `out_port` is set to null and the status classifies
/// the failure. Release the handle with [`sb_port_free`].
///
/// # Safety
/// `path` must be a NUL-terminated string and `out_port` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn sb_open_port(
    path: *const c_char,
    baud: u32,
    out_port: *mut *mut Port,
) -> SbStatus {
    if path.is_null() || out_port.is_null() {
        return SbStatus::InvalidArgument;
    }
    *out_port = ptr::null_mut();

    let path = match CStr::from_ptr(path).to_str() {
        Ok(path) => path,
        Err(_) => return SbStatus::InvalidArgument,
    };

    match Port::open(path, baud) {
        Ok(port) => {
            *out_port = Box::into_raw(Box::new(port));
            SbStatus::NoErr
        }
        Err(err) => (&err).into(),
    }
}

/// Set the timeout, in seconds, for subsequent operations on the port.
/// Zero means non-blocking; negative values are rejected.
///
/// # Safety
/// `port` must be a live handle from [`sb_open_port`].
#[no_mangle]
pub unsafe extern "C" fn sb_port_set_timeout(port: *const Port, seconds: f32) -> SbStatus {
    let port = match port.as_ref() {
        Some(port) => port,
        None => return SbStatus::InvalidArgument,
    };
    match port.set_timeout(seconds) {
        Ok(()) => SbStatus::NoErr,
        Err(err) => (&err).into(),
    }
}

/// Set the character size.
///
/// # Safety
/// `port` must be a live handle from [`sb_open_port`].
#[no_mangle]
pub unsafe extern "C" fn sb_port_set_data_bits(port: *const Port, bits: SbDataBits) -> SbStatus {
    match port.as_ref() {
        Some(port) => match port.set_data_bits(bits.into()) {
            Ok(()) => SbStatus::NoErr,
            Err(err) => (&err).into(),
        },
        None => SbStatus::InvalidArgument,
    }
}

/// Set the parity checking mode.
///
/// # Safety
/// `port` must be a live handle from [`sb_open_port`].
#[no_mangle]
pub unsafe extern "C" fn sb_port_set_parity(port: *const Port, parity: SbParity) -> SbStatus {
    match port.as_ref() {
        Some(port) => match port.set_parity(parity.into()) {
            Ok(()) => SbStatus::NoErr,
            Err(err) => (&err).into(),
        },
        None => SbStatus::InvalidArgument,
    }
}

/// Set the number of stop bits. True selects two stop bits, false one.
///
/// # Safety
/// `port` must be a live handle from [`sb_open_port`].
#[no_mangle]
pub unsafe extern "C" fn sb_port_set_stop_bits(port: *const Port, two_bits: bool) -> SbStatus {
    let bits = if two_bits { StopBits::Two } else { StopBits::One };
    match port.as_ref() {
        Some(port) => match port.set_stop_bits(bits) {
            Ok(()) => SbStatus::NoErr,
            Err(err) => (&err).into(),
        },
        None => SbStatus::InvalidArgument,
    }
}

/// Write `len` bytes from `data`. Partial counts are reported on timeout
/// or fault.
///
/// # Safety
/// `port` must be a live handle; `data` must point to `len` readable
/// bytes.
#[no_mangle]
pub unsafe extern "C" fn sb_port_write(
    port: *const Port,
    data: *const u8,
    len: usize,
) -> SbIoResult {
    let port = match port.as_ref() {
        Some(port) => port,
        None => return INVALID_IO,
    };
    if len == 0 {
        return io_result(port.write(&[]));
    }
    if data.is_null() {
        return INVALID_IO;
    }
    io_result(port.write(slice::from_raw_parts(data, len)))
}

/// Write a NUL-terminated string's bytes (the NUL itself is not written,
/// and no line terminator is appended).
///
/// # Safety
/// `port` must be a live handle; `text` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn sb_port_write_str(port: *const Port, text: *const c_char) -> SbIoResult {
    let port = match port.as_ref() {
        Some(port) => port,
        None => return INVALID_IO,
    };
    if text.is_null() {
        return INVALID_IO;
    }
    io_result(port.write(CStr::from_ptr(text).to_bytes()))
}

/// Read up to `capacity` bytes into `buffer`, blocking until at least one
/// byte arrives or the timeout elapses.
///
/// # Safety
/// `port` must be a live handle; `buffer` must point to `capacity`
/// writable bytes.
#[no_mangle]
pub unsafe extern "C" fn sb_port_read(
    port: *const Port,
    buffer: *mut u8,
    capacity: usize,
) -> SbIoResult {
    let port = match port.as_ref() {
        Some(port) => port,
        None => return INVALID_IO,
    };
    if capacity == 0 {
        // Still reports PortClosed on a closed port.
        return io_result(port.read(&mut []));
    }
    if buffer.is_null() {
        return INVALID_IO;
    }
    io_result(port.read(slice::from_raw_parts_mut(buffer, capacity)))
}

/// Read one line, appending to `out`.
///
/// The `\n` terminator (and a `\r` immediately before it) is consumed from
/// the stream but excluded from the buffer; the returned byte count is the
/// raw bytes consumed, terminator included. On timeout the partial line
/// stays in the buffer and the count reflects it; call again with the same
/// buffer to resume the line. Clear the buffer between lines with
/// [`sb_buffer_clear`].
///
/// # Safety
/// `port` must be a live handle; `out` a live buffer from
/// [`sb_buffer_new`].
#[no_mangle]
pub unsafe extern "C" fn sb_port_read_line(port: *const Port, out: *mut ByteBuffer) -> SbIoResult {
    let port = match port.as_ref() {
        Some(port) => port,
        None => return INVALID_IO,
    };
    let out = match out.as_mut() {
        Some(out) => out,
        None => return INVALID_IO,
    };
    io_result(port.read_line(&mut out.data))
}

/// Close the port. Idempotent; subsequent operations fail with
/// `PortClosed`, and a running listener on this port stops within one
/// timeout interval.
///
/// # Safety
/// `port` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn sb_port_close(port: *const Port) -> SbStatus {
    match port.as_ref() {
        Some(port) => {
            port.close();
            SbStatus::NoErr
        }
        None => SbStatus::InvalidArgument,
    }
}

/// Release a port handle, closing it first. Passing null is a no-op.
///
/// # Safety
/// `port` must be null or a handle from [`sb_open_port`] that has not
/// already been freed.
#[no_mangle]
pub unsafe extern "C" fn sb_port_free(port: *mut Port) {
    if !port.is_null() {
        drop(Box::from_raw(port));
    }
}

/// Create a listener builder bound to the port.
///
/// Release the builder either by building it or with
/// [`sb_builder_free`].
///
/// # Safety
/// `port` must be a live handle and `out_builder` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn sb_port_listener_builder(
    port: *const Port,
    out_builder: *mut *mut ListenerBuilder,
) -> SbStatus {
    if out_builder.is_null() {
        return SbStatus::InvalidArgument;
    }
    *out_builder = ptr::null_mut();
    let port = match port.as_ref() {
        Some(port) => port,
        None => return SbStatus::InvalidArgument,
    };
    match port.create_listener_builder() {
        Ok(builder) => {
            *out_builder = Box::into_raw(Box::new(builder));
            SbStatus::NoErr
        }
        Err(err) => (&err).into(),
    }
}

/// Register a read callback on the builder.
///
/// `user_data` is round-tripped untouched into every invocation and may be
/// null; the caller guarantees it is safe to use from the listener thread.
/// Returns false when `builder` or `callback` is null.
///
/// # Safety
/// `builder` must be a live handle from [`sb_port_listener_builder`].
#[no_mangle]
pub unsafe extern "C" fn sb_builder_add_read_callback(
    builder: *mut ListenerBuilder,
    user_data: *mut c_void,
    callback: Option<SbReadCallback>,
) -> bool {
    let builder = match builder.as_mut() {
        Some(builder) => builder,
        None => return false,
    };
    let callback = match callback {
        Some(callback) => callback,
        None => return false,
    };

    let user_data = UserData(user_data);
    builder.add_read_callback(move |bytes: &[u8]| {
        // Force capture of the whole `UserData` wrapper (which is `Send`)
        // rather than the bare `*mut c_void` field under 2021 disjoint capture.
        let user_data = user_data;
        // The engine guarantees `bytes` only for this call; the callback
        // must copy anything it keeps.
        unsafe { callback(user_data.0, bytes.as_ptr(), bytes.len()) }
    });
    true
}

/// Consume the builder, freezing its callbacks into a listener in the
/// not-yet-running state.
///
/// The builder pointer is invalidated by this call whether or not it
/// succeeds with a listener; do not use or free it afterwards. Building
/// with zero callbacks is valid.
///
/// # Safety
/// `builder` must be a live handle from [`sb_port_listener_builder`];
/// `out_listener` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn sb_builder_build(
    builder: *mut ListenerBuilder,
    out_listener: *mut *mut Listener,
) -> SbStatus {
    if out_listener.is_null() {
        return SbStatus::InvalidArgument;
    }
    *out_listener = ptr::null_mut();
    if builder.is_null() {
        return SbStatus::InvalidArgument;
    }

    let listener = Box::from_raw(builder).build();
    *out_listener = Box::into_raw(Box::new(listener));
    SbStatus::NoErr
}

/// Release a builder that will not be built. Passing null is a no-op.
///
/// # Safety
/// `builder` must be null or a live handle that has not been built.
#[no_mangle]
pub unsafe extern "C" fn sb_builder_free(builder: *mut ListenerBuilder) {
    if !builder.is_null() {
        drop(Box::from_raw(builder));
    }
}

/// Start the listener's delivery thread.
///
/// Fails with `InvalidArgument` if the listener is already running or has
/// been stopped (it never spawns a second thread), and with `IoError` if
/// the thread cannot be spawned.
///
/// # Safety
/// `listener` must be a live handle from [`sb_builder_build`].
#[no_mangle]
pub unsafe extern "C" fn sb_listener_listen(listener: *const Listener) -> SbStatus {
    let listener = match listener.as_ref() {
        Some(listener) => listener,
        None => return SbStatus::InvalidArgument,
    };
    match listener.listen() {
        Ok(()) => SbStatus::NoErr,
        Err(ListenerError::Spawn(_)) => SbStatus::IoError,
        Err(_) => SbStatus::InvalidArgument,
    }
}

/// Stop the listener and block until its thread has exited. After this
/// returns, no further callback will be invoked. Idempotent.
///
/// # Safety
/// `listener` must be a live handle from [`sb_builder_build`].
#[no_mangle]
pub unsafe extern "C" fn sb_listener_stop(listener: *const Listener) -> SbStatus {
    match listener.as_ref() {
        Some(listener) => {
            listener.stop();
            SbStatus::NoErr
        }
        None => SbStatus::InvalidArgument,
    }
}

/// Current lifecycle state of the listener. A listener whose loop was
/// killed by a device fault reports `Stopped`; null reports `Stopped`.
///
/// # Safety
/// `listener` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn sb_listener_state(listener: *const Listener) -> SbListenerState {
    match listener.as_ref() {
        Some(listener) => match listener.state() {
            ListenerState::Created => SbListenerState::Created,
            ListenerState::Running => SbListenerState::Running,
            ListenerState::Stopped => SbListenerState::Stopped,
        },
        None => SbListenerState::Stopped,
    }
}

/// Whether the listener's loop was terminated by a device fault rather
/// than an explicit stop. Lets owners distinguish silent listener death
/// from a requested shutdown.
///
/// # Safety
/// `listener` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn sb_listener_has_fault(listener: *const Listener) -> bool {
    match listener.as_ref() {
        Some(listener) => listener.has_fault(),
        None => false,
    }
}

/// Release a listener handle, stopping it first (the call blocks until the
/// delivery thread has exited). Passing null is a no-op.
///
/// # Safety
/// `listener` must be null or a handle from [`sb_builder_build`] that has
/// not already been freed.
#[no_mangle]
pub unsafe extern "C" fn sb_listener_free(listener: *mut Listener) {
    if !listener.is_null() {
        drop(Box::from_raw(listener));
    }
}
