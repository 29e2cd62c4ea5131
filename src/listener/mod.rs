//! Background listener: a dedicated thread that reads lines from a port
//! and delivers each one to every registered callback.
//!
//! A listener moves through `Created → Running → Stopped` exactly once.
//! `listen()` spawns the delivery thread; `stop()` (or drop) requests exit
//! and joins, so no callback runs after `stop()` returns. `Stopped` is
//! terminal — build a fresh listener from a new builder to listen again.

pub mod builder;

pub use builder::ListenerBuilder;

use crate::error::{ListenerError, TransferError};
use crate::port::Shared;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked with each delivered line (terminator excluded). The
/// slice is valid only for the duration of the call; copy the bytes if
/// they are needed afterwards.
pub type ReadCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

const STATE_CREATED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Lifecycle state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Built but not yet listening.
    Created,
    /// Background thread is delivering lines.
    Running,
    /// Terminal: stopped explicitly, dropped, or killed by a device fault.
    Stopped,
}

/// State shared with the delivery thread.
struct Inner {
    port: Arc<Shared>,
    state: AtomicU8,
    stop_requested: AtomicBool,
    /// Terminal fault that killed the loop, if any. Queryable by the owner
    /// so a listener never dies silently.
    fault: Mutex<Option<TransferError>>,
}

/// A line-oriented background reader over one port.
///
/// Callbacks run on the listener's thread, in registration order, exactly
/// once per received line, in the order lines arrived. A callback that
/// blocks stalls every subsequent delivery on this listener.
pub struct Listener {
    inner: Arc<Inner>,
    /// Callback list frozen at build time; handed to the thread by
    /// `listen()`.
    callbacks: Mutex<Option<Vec<ReadCallback>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    pub(crate) fn new(port: Arc<Shared>, callbacks: Vec<ReadCallback>) -> Self {
        Self {
            inner: Arc::new(Inner {
                port,
                state: AtomicU8::new(STATE_CREATED),
                stop_requested: AtomicBool::new(false),
                fault: Mutex::new(None),
            }),
            callbacks: Mutex::new(Some(callbacks)),
            thread: Mutex::new(None),
        }
    }

    /// Start the delivery thread.
    ///
    /// The loop performs a line-oriented read bounded by the port's
    /// currently configured timeout; a timeout simply retries (partial
    /// lines accumulate until complete), while a device fault or port
    /// closure ends the loop and leaves the fault queryable via
    /// [`Listener::take_fault`]. Starting an already-running or stopped
    /// listener fails; it never spawns a second thread.
    pub fn listen(&self) -> Result<(), ListenerError> {
        match self.inner.state.compare_exchange(
            STATE_CREATED,
            STATE_RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STATE_RUNNING) => return Err(ListenerError::AlreadyRunning),
            Err(_) => return Err(ListenerError::Stopped),
        }

        // Hold the thread slot across the spawn so a concurrent stop()
        // cannot miss the handle and return before the thread is joined.
        let mut thread_slot = self.thread.lock();
        let callbacks = self.callbacks.lock().take().unwrap_or_default();
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("serialbridge-listener".to_string())
            .spawn(move || delivery_loop(&inner, callbacks))
            .map_err(|e| {
                self.inner.state.store(STATE_STOPPED, Ordering::Release);
                ListenerError::Spawn(e)
            })?;

        *thread_slot = Some(handle);
        Ok(())
    }

    /// Request the delivery thread to exit and block until it has.
    ///
    /// After `stop()` returns no further callback will be invoked and the
    /// port's read path is free again. Idempotent; stopping a listener
    /// that never ran just marks it terminal.
    pub fn stop(&self) {
        self.inner.stop_requested.store(true, Ordering::Release);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("listener thread panicked before exiting");
            }
        }
        self.inner.state.store(STATE_STOPPED, Ordering::Release);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_CREATED => ListenerState::Created,
            STATE_RUNNING => ListenerState::Running,
            _ => ListenerState::Stopped,
        }
    }

    /// Whether the delivery loop was terminated by a device fault rather
    /// than an explicit stop.
    pub fn has_fault(&self) -> bool {
        self.inner.fault.lock().is_some()
    }

    /// Take the terminal fault, if the loop died on one.
    pub fn take_fault(&self) -> Option<TransferError> {
        self.inner.fault.lock().take()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("port", &self.inner.port.path())
            .field("state", &self.state())
            .field("faulted", &self.has_fault())
            .finish()
    }
}

/// The delivery loop. One iteration is at most one bounded read, so a stop
/// request is noticed within one timeout interval.
fn delivery_loop(inner: &Inner, mut callbacks: Vec<ReadCallback>) {
    debug!(port = %inner.port.path(), "listener started");
    let mut line: Vec<u8> = Vec::with_capacity(256);

    while !inner.stop_requested.load(Ordering::Acquire) {
        match inner.port.read_line_into(&mut line) {
            Ok(_) => {
                for callback in callbacks.iter_mut() {
                    callback(&line);
                }
                line.clear();
            }
            // Partial lines stay in `line` and complete on a later
            // iteration; a line in flight when a fault hits is lost.
            Err(TransferError::TimedOut { .. }) => {}
            Err(err) => {
                warn!(port = %inner.port.path(), error = %err, "listener terminated by device fault");
                *inner.fault.lock() = Some(err);
                break;
            }
        }
    }

    inner.state.store(STATE_STOPPED, Ordering::Release);
    debug!(port = %inner.port.path(), "listener exited");
}
