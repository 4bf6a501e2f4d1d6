//! Shutdown signals shared by the scan pipeline
//!
//! Two independent signals exist:
//!
//! - [`ShutdownCoordinator`]: a cooperative, monotonic "stopping" flag plus an
//!   in-flight work counter. Setting the flag prevents new units of work from
//!   starting but lets in-flight work finish. [`ShutdownCoordinator::wait`]
//!   drains the counter with a hard upper bound.
//! - [`CancelToken`]: a hard cancellation signal. Every blocking queue
//!   operation and per-file deadline wait races against it, so a cancelled
//!   run unblocks promptly.
//!
//! Both are read lock-free from any number of threads.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on how long [`ShutdownCoordinator::wait`] may block
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Tracks in-flight work and the cooperative shutdown flag
#[derive(Debug)]
pub struct ShutdownCoordinator {
    /// Upper bound for the final drain
    timeout: Duration,

    /// Set once, never cleared
    stopping: AtomicBool,

    /// Units of work currently registered
    in_flight: Mutex<usize>,

    /// Notified whenever the counter reaches zero
    drained: Condvar,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state with no work in flight
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            stopping: AtomicBool::new(false),
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    /// Configured drain timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            debug!("Shutdown requested");
        }
    }

    /// True once [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Register `n` units of work
    pub fn add(&self, n: usize) {
        *self.in_flight.lock() += n;
    }

    /// Deregister one unit of work
    pub fn done(&self) {
        let mut count = self.in_flight.lock();
        match count.checked_sub(1) {
            Some(remaining) => {
                *count = remaining;
                if remaining == 0 {
                    self.drained.notify_all();
                }
            }
            None => warn!("done() called with no work in flight"),
        }
    }

    /// Number of units of work currently registered
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Register one unit of work, deregistered when the guard drops
    pub fn track(&self) -> InFlightGuard<'_> {
        InFlightGuard::new(self)
    }

    /// Block until in-flight work drains or the configured timeout elapses.
    ///
    /// Returns `true` if the counter reached zero.
    pub fn wait(&self) -> bool {
        self.wait_timeout(self.timeout)
    }

    /// Block until in-flight work drains or `timeout` elapses.
    ///
    /// Returns immediately when nothing is in flight. Never blocks longer
    /// than `timeout`, even if `add`/`done` calls are unbalanced.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.in_flight.lock();
        if *count == 0 {
            return true;
        }

        let result = self
            .drained
            .wait_while_for(&mut count, |remaining| *remaining > 0, timeout);

        if result.timed_out() && *count > 0 {
            warn!(
                in_flight = *count,
                timeout_ms = timeout.as_millis() as u64,
                "Shutdown timeout elapsed with work still in flight"
            );
            return false;
        }

        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

/// RAII guard for one unit of in-flight work
pub struct InFlightGuard<'a> {
    coordinator: &'a ShutdownCoordinator,
}

impl<'a> InFlightGuard<'a> {
    /// Create a new guard (registers one unit of work)
    pub fn new(coordinator: &'a ShutdownCoordinator) -> Self {
        coordinator.add(1);
        Self { coordinator }
    }
}

impl<'a> Drop for InFlightGuard<'a> {
    fn drop(&mut self) {
        self.coordinator.done();
    }
}

/// Hard cancellation signal
///
/// Cancelling drops the only sender of an internal channel, which makes
/// [`signal`](Self::signal) permanently ready. Blocking operations include it
/// as one arm of a `crossbeam_channel::select!`.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Cancel. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.trigger.lock().take();
            debug!("Cancellation triggered");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) once cancelled
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
