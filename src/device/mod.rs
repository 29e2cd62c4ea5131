//! Device handle layer.
//!
//! Defines the `DeviceAdapter` trait that abstracts one open OS serial
//! device, so the port and listener logic can run against both real
//! hardware (`NativeDevice`) and an in-memory mock (`MockDevice`).

pub mod mock;
pub mod native;

pub use mock::MockDevice;
pub use native::NativeDevice;

use crate::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout applied at open time: effectively unbounded until the
/// caller configures one via `Port::set_timeout`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(99_999);

/// Open-time settings for a serial port.
///
/// Baud rate is fixed at open; the remaining line parameters can also be
/// adjusted later through the `Port` mutators. Flow control is deliberately
/// absent from this surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSettings {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits per character.
    pub data_bits: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Initial read/write timeout.
    pub timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PortSettings {
    /// Default settings (8N1) at the given baud rate.
    pub fn with_baud(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Trait for one open serial device handle.
///
/// Read and write speak `std::io` so timeout and interruption kinds reach
/// the framing layer unchanged; control operations return `PortError`.
/// `try_clone_device` yields a second handle onto the same underlying
/// device, which is how the port keeps its read and write paths
/// independent.
pub trait DeviceAdapter: Send + std::fmt::Debug {
    /// Read bytes into the buffer, blocking up to the configured timeout.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> std::io::Result<usize>;

    /// Write bytes from the buffer, blocking up to the configured timeout.
    ///
    /// Returns the number of bytes actually accepted by the device.
    fn write_bytes(&mut self, data: &[u8]) -> std::io::Result<usize>;

    /// Set the timeout governing subsequent reads and writes on this handle.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Set the character size.
    fn set_data_bits(&mut self, bits: DataBits) -> Result<(), PortError>;

    /// Set the parity checking mode.
    fn set_parity(&mut self, parity: Parity) -> Result<(), PortError>;

    /// Set the number of stop bits.
    fn set_stop_bits(&mut self, bits: StopBits) -> Result<(), PortError>;

    /// Clone this handle onto the same underlying device.
    fn try_clone_device(&self) -> Result<Box<dyn DeviceAdapter>, PortError>;

    /// The device path or identifier this handle was opened from.
    fn name(&self) -> &str;

    /// Bytes currently available to read, if the device can report it.
    fn bytes_to_read(&self) -> Option<usize> {
        None
    }
}
