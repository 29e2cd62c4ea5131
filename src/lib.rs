//! serialbridge — a serial-port communication engine.
//!
//! The engine opens OS-level serial devices (including the pseudo-terminal
//! pairs used for testing), performs timeout-bounded reads and writes with
//! line framing, and runs background listeners that deliver each received
//! line to registered callbacks. A C-callable facade exposes the whole
//! surface to host applications in other languages.
//!
//! # Modules
//!
//! - `device`: the device-handle layer — an adapter trait over the
//!   `serialport` crate plus a mock for tests
//! - `port`: the port abstraction — open/configure/read/write/close with
//!   timeout and line-framing semantics
//! - `listener`: builder-produced background listeners with exactly-once
//!   line delivery
//! - `error`: port, transfer, and listener error types
//! - `ffi`: the `extern "C"` facade and the callback invocation boundary
//!
//! # Example
//! ```no_run
//! use serialbridge::Port;
//!
//! let port = Port::open("/dev/ttyUSB0", 115_200)?;
//! port.set_timeout(2.5)?;
//!
//! let mut builder = port.create_listener_builder()?;
//! builder.add_read_callback(|line| {
//!     println!("received: {}", String::from_utf8_lossy(line));
//! });
//! let listener = builder.build();
//! listener.listen()?;
//!
//! port.write_str("hello\n")?;
//! // ... the listener delivers incoming lines on its own thread ...
//! listener.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod ffi;
pub mod listener;
pub mod port;

// Re-export commonly used types for convenience
pub use device::{DataBits, DeviceAdapter, MockDevice, NativeDevice, Parity, PortSettings, StopBits};
pub use error::{ListenerError, PortError, TransferError};
pub use listener::{Listener, ListenerBuilder, ListenerState};
pub use port::Port;
