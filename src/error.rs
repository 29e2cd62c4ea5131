//! Error types for port lifecycle and transfer operations.
//!
//! Two families are kept separate on purpose: `PortError` covers open-time
//! and configuration failures where there is no partial progress to report,
//! while `TransferError` covers read/write outcomes where the number of
//! bytes moved before the failure is meaningful to the caller.

use std::time::Duration;
use thiserror::Error;

/// Errors from opening, configuring, or using a serial port.
#[derive(Debug, Error)]
pub enum PortError {
    /// The path did not resolve to a serial device.
    #[error("serial device not found: {0}")]
    NotFound(String),

    /// Access to the device was refused.
    #[error("permission denied opening serial device: {0}")]
    PermissionDenied(String),

    /// Another owner holds the device exclusively.
    #[error("serial device already in use: {0}")]
    AlreadyInUse(String),

    /// A caller-supplied parameter violates a precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The port has been closed; the operation was rejected.
    #[error("port is closed")]
    Closed,

    /// An I/O error occurred during a port operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A driver-level error from the underlying serial stack.
    #[error("serial driver error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a `NotFound` error from a device path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an `InvalidArgument` error from a message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Errors from a single read or write operation.
///
/// Partial progress is preserved: `TimedOut` and `Io` report how many bytes
/// were transferred before the failure, so callers can resume rather than
/// restart. Check the variant before trusting the count; a timeout with a
/// nonzero count is an expected outcome, not a fault.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The timeout elapsed before the operation completed.
    #[error("operation timed out after {timeout:?} ({bytes} bytes transferred)")]
    TimedOut {
        /// Bytes transferred before the deadline.
        bytes: usize,
        /// The timeout that governed the operation.
        timeout: Duration,
    },

    /// The device reported a fault (disconnection, hardware error).
    #[error("device fault after {bytes} bytes: {source}")]
    Io {
        /// Bytes transferred before the fault.
        bytes: usize,
        #[source]
        source: std::io::Error,
    },

    /// The port has been closed; nothing was transferred.
    #[error("port is closed")]
    Closed,
}

impl TransferError {
    /// Bytes transferred before the operation failed.
    pub fn bytes_transferred(&self) -> usize {
        match self {
            Self::TimedOut { bytes, .. } | Self::Io { bytes, .. } => *bytes,
            Self::Closed => 0,
        }
    }

    /// Whether this is a timeout (retryable) rather than a terminal fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Errors from starting a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// `listen()` was called while the background thread is already running.
    #[error("listener is already running")]
    AlreadyRunning,

    /// The listener has been stopped; build a new one to listen again.
    #[error("listener has been stopped and cannot be restarted")]
    Stopped,

    /// The background thread could not be spawned.
    #[error("failed to spawn listener thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_error_display() {
        let err = PortError::not_found("/dev/ttyUSB0");
        assert_eq!(err.to_string(), "serial device not found: /dev/ttyUSB0");

        let err = PortError::invalid_argument("timeout must be non-negative");
        assert_eq!(
            err.to_string(),
            "invalid argument: timeout must be non-negative"
        );

        let err = PortError::Closed;
        assert_eq!(err.to_string(), "port is closed");
    }

    #[test]
    fn test_transfer_error_preserves_partial_counts() {
        let err = TransferError::TimedOut {
            bytes: 12,
            timeout: Duration::from_millis(500),
        };
        assert_eq!(err.bytes_transferred(), 12);
        assert!(err.is_timeout());
        assert!(err.to_string().contains("500ms"));
        assert!(err.to_string().contains("12 bytes"));
    }

    #[test]
    fn test_transfer_error_closed_transfers_nothing() {
        let err = TransferError::Closed;
        assert_eq!(err.bytes_transferred(), 0);
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_io_transfer_error_keeps_source() {
        let source = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err = TransferError::Io { bytes: 3, source };
        assert_eq!(err.bytes_transferred(), 3);
        assert!(err.to_string().contains("3 bytes"));
    }
}
