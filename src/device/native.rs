//! Native serial device handle backed by the `serialport` crate.

use super::{DataBits, DeviceAdapter, Parity, PortSettings, StopBits};
use crate::error::PortError;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// An open OS serial device.
///
/// Wraps `serialport::SerialPort` behind the `DeviceAdapter` trait. Cloning
/// via `try_clone_device` duplicates the OS handle, so a cloned reader and
/// the original writer address the same device independently.
pub struct NativeDevice {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl NativeDevice {
    /// Open the serial device at `path` with the given settings.
    ///
    /// Open-time failures are mapped onto the crate's taxonomy: a missing
    /// device yields `NotFound`, refused access `PermissionDenied`, an
    /// exclusively-held device `AlreadyInUse`, and a rejected parameter
    /// `InvalidArgument`.
    pub fn open(path: &str, settings: &PortSettings) -> Result<Self, PortError> {
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(settings.data_bits.into())
            .parity(settings.parity.into())
            .stop_bits(settings.stop_bits.into())
            .timeout(settings.timeout)
            .open()
            .map_err(|e| map_open_error(path, e))?;

        debug!(path, baud = settings.baud_rate, "serial device opened");

        Ok(Self {
            port,
            name: path.to_string(),
        })
    }

    /// Wrap an already-open `serialport` handle.
    ///
    /// Used to build ports over devices opened elsewhere, such as the ends
    /// of a pseudo-terminal pair in tests.
    pub fn from_raw(port: Box<dyn serialport::SerialPort>, name: impl Into<String>) -> Self {
        Self {
            port,
            name: name.into(),
        }
    }
}

/// Classify an open-time `serialport` error.
///
/// EBUSY surfaces from the driver as an uncategorized I/O error, so the
/// exclusively-held case is matched on the description.
fn map_open_error(path: &str, err: serialport::Error) -> PortError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => PortError::not_found(path),
        serialport::ErrorKind::InvalidInput => PortError::invalid_argument(err.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => PortError::not_found(path),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            PortError::PermissionDenied(path.to_string())
        }
        _ if err.to_string().to_ascii_lowercase().contains("busy") => {
            PortError::AlreadyInUse(path.to_string())
        }
        _ => PortError::Serial(err),
    }
}

impl DeviceAdapter for NativeDevice {
    fn read_bytes(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buffer)
    }

    fn write_bytes(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.port.write(data)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port.set_timeout(timeout).map_err(PortError::Serial)
    }

    fn set_data_bits(&mut self, bits: DataBits) -> Result<(), PortError> {
        self.port
            .set_data_bits(bits.into())
            .map_err(PortError::Serial)
    }

    fn set_parity(&mut self, parity: Parity) -> Result<(), PortError> {
        self.port
            .set_parity(parity.into())
            .map_err(PortError::Serial)
    }

    fn set_stop_bits(&mut self, bits: StopBits) -> Result<(), PortError> {
        self.port
            .set_stop_bits(bits.into())
            .map_err(PortError::Serial)
    }

    fn try_clone_device(&self) -> Result<Box<dyn DeviceAdapter>, PortError> {
        let cloned = self.port.try_clone().map_err(PortError::Serial)?;
        Ok(Box::new(Self {
            port: cloned,
            name: self.name.clone(),
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&self) -> Option<usize> {
        self.port.bytes_to_read().ok().map(|n| n as usize)
    }
}

impl std::fmt::Debug for NativeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeDevice")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}
