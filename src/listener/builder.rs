//! Builder for [`Listener`]s.

use super::{Listener, ReadCallback};
use crate::port::Shared;
use std::sync::Arc;

/// Accumulates read callbacks before producing a [`Listener`].
///
/// Obtained from `Port::create_listener_builder`. Callbacks are invoked in
/// registration order for every delivered line. `build` consumes the
/// builder and freezes the callback list — registering after build is a
/// compile error, not a silent loss.
///
/// # Example
/// ```
/// use serialbridge::device::MockDevice;
/// use serialbridge::Port;
/// use std::time::Duration;
///
/// let device = MockDevice::new("MOCK0");
/// let port = Port::from_device(Box::new(device), 9600, Duration::from_millis(50))?;
///
/// let mut builder = port.create_listener_builder()?;
/// builder.add_read_callback(|line| println!("got {} bytes", line.len()));
/// let listener = builder.build();
/// listener.listen()?;
/// # listener.stop();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ListenerBuilder {
    port: Arc<Shared>,
    callbacks: Vec<ReadCallback>,
}

impl ListenerBuilder {
    pub(crate) fn new(port: Arc<Shared>) -> Self {
        Self {
            port,
            callbacks: Vec::new(),
        }
    }

    /// Register a callback, invoked on the listener thread with each
    /// delivered line (terminator excluded).
    ///
    /// Any number of callbacks may be registered; all of them run, in
    /// registration order, for every line. The byte slice is valid only
    /// for the duration of the call.
    pub fn add_read_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Number of callbacks registered so far.
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Freeze the callback list into a [`Listener`] in the not-yet-running
    /// state. Building with zero callbacks is valid: the listener will
    /// read and discard.
    pub fn build(self) -> Listener {
        Listener::new(self.port, self.callbacks)
    }
}

impl std::fmt::Debug for ListenerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerBuilder")
            .field("port", &self.port.path())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDevice;
    use crate::port::Port;
    use std::time::Duration;

    #[test]
    fn test_builder_counts_registrations() {
        let device = MockDevice::new("MOCK0");
        let port =
            Port::from_device(Box::new(device), 9600, Duration::from_millis(50)).expect("port");

        let mut builder = port.create_listener_builder().unwrap();
        assert_eq!(builder.callback_count(), 0);
        builder.add_read_callback(|_| {});
        builder.add_read_callback(|_| {});
        assert_eq!(builder.callback_count(), 2);
    }

    #[test]
    fn test_multiple_builders_from_one_port() {
        let device = MockDevice::new("MOCK0");
        let port =
            Port::from_device(Box::new(device), 9600, Duration::from_millis(50)).expect("port");

        let a = port.create_listener_builder().unwrap();
        let b = port.create_listener_builder().unwrap();
        drop((a, b));
    }
}
