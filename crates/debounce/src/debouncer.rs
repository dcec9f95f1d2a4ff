//! Debouncer: only the last request of a burst runs
//!
//! Every request cancels the pending call (if any) and schedules a new one.
//! The callback runs once the delay elapses without another request.

use crate::config::DebounceConfig;
use parking_lot::{Mutex, ReentrantMutex};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use timer::Timer;
use tracing::{debug, error, trace, warn};

/// Delay used when a request passes no delay (or a zero delay)
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

type Callback = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Create a debouncer on `timer` with the default 500ms delay
pub fn debounce<T: Timer>(timer: T) -> Debouncer<T> {
    Debouncer::new(timer)
}

/// Collapses bursts of requests into a single delayed call
///
/// Clones share the same pending slot. Dropping the last clone cancels
/// whatever is still pending.
pub struct Debouncer<T: Timer> {
    shared: Arc<Shared<T>>,
}

struct Shared<T: Timer> {
    timer: T,
    default_delay: Duration,
    slot: Mutex<Slot<T::Handle>>,
    /// Held while a callback runs so firings of one instance never overlap;
    /// reentrant so a callback may flush its own debouncer
    running: ReentrantMutex<()>,
    counters: Counters,
}

/// At most one pending call per debouncer
struct Slot<H> {
    /// Bumped on every request; a firing timer whose generation is stale
    /// was superseded and must not run anything
    generation: u64,
    pending: Option<Pending<H>>,
}

struct Pending<H> {
    handle: H,
    callback: Callback,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    superseded: AtomicU64,
    cancelled: AtomicU64,
    fired: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of a debouncer's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceStats {
    /// Calls to `schedule` / `schedule_fallible`
    pub requests: u64,
    /// Pending calls replaced by a newer request
    pub superseded: u64,
    /// Pending calls dropped through `cancel`
    pub cancelled: u64,
    /// Callbacks that ran (timer expiry or flush)
    pub fired: u64,
    /// Callbacks that panicked or returned an error
    pub failed: u64,
}

impl<T: Timer> Debouncer<T> {
    /// Create a debouncer with the default 500ms delay
    pub fn new(timer: T) -> Self {
        Self::with_default_delay(timer, DEFAULT_DELAY)
    }

    /// Create a debouncer with a custom default delay
    ///
    /// A zero delay falls back to `DEFAULT_DELAY`.
    pub fn with_default_delay(timer: T, default_delay: Duration) -> Self {
        let default_delay = if default_delay.is_zero() {
            DEFAULT_DELAY
        } else {
            default_delay
        };

        Self {
            shared: Arc::new(Shared {
                timer,
                default_delay,
                slot: Mutex::new(Slot {
                    generation: 0,
                    pending: None,
                }),
                running: ReentrantMutex::new(()),
                counters: Counters::default(),
            }),
        }
    }

    /// Create a debouncer whose default delay comes from configuration
    pub fn with_config(timer: T, config: &DebounceConfig) -> Self {
        Self::with_default_delay(timer, config.delay())
    }

    /// Schedule `callback` to run once `delay` passes with no newer request
    ///
    /// Any call still pending on this debouncer is cancelled first. `None`
    /// or a zero delay uses the debouncer's default delay.
    pub fn schedule<F>(&self, callback: F, delay: Option<Duration>)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_fallible(
            move || {
                callback();
                Ok(())
            },
            delay,
        );
    }

    /// Like `schedule`, for callbacks that can fail
    ///
    /// An error returned by the callback is logged and counted, never
    /// propagated.
    pub fn schedule_fallible<F>(&self, callback: F, delay: Option<Duration>)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let delay = self.effective_delay(delay);
        let shared = &self.shared;
        shared.counters.requests.fetch_add(1, Ordering::Relaxed);

        let superseded = {
            let mut slot = shared.slot.lock();
            slot.generation = slot.generation.wrapping_add(1);
            let generation = slot.generation;

            let superseded = slot.pending.take();
            if superseded.is_some() {
                trace!("Request {} supersedes pending call", generation);
            }

            let weak: Weak<Shared<T>> = Arc::downgrade(shared);
            let handle = shared.timer.schedule(
                delay,
                Box::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.fire(generation);
                    }
                }),
            );

            slot.pending = Some(Pending {
                handle,
                callback: Box::new(callback),
            });
            superseded
        };

        // Old callback is dropped outside the lock
        if let Some(previous) = superseded {
            shared.timer.cancel(previous.handle);
            shared.counters.superseded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop the pending call without running it
    ///
    /// Returns whether a call was pending.
    pub fn cancel(&self) -> bool {
        let pending = self.shared.slot.lock().pending.take();
        match pending {
            Some(pending) => {
                self.shared.timer.cancel(pending.handle);
                self.shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!("Cancelled pending debounced call");
                true
            }
            None => false,
        }
    }

    /// Run the pending call immediately on the calling thread
    ///
    /// Returns whether a call was pending.
    pub fn flush(&self) -> bool {
        let pending = self.shared.slot.lock().pending.take();
        match pending {
            Some(pending) => {
                self.shared.timer.cancel(pending.handle);
                self.shared.run(pending.callback);
                true
            }
            None => false,
        }
    }

    /// Whether a call is waiting for its delay to elapse
    pub fn is_pending(&self) -> bool {
        self.shared.slot.lock().pending.is_some()
    }

    /// Delay used when a request passes none
    pub fn default_delay(&self) -> Duration {
        self.shared.default_delay
    }

    /// Snapshot of this debouncer's counters (shared by all clones)
    pub fn stats(&self) -> DebounceStats {
        let c = &self.shared.counters;
        DebounceStats {
            requests: c.requests.load(Ordering::Relaxed),
            superseded: c.superseded.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            fired: c.fired.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Run `f` while no callback of this debouncer is running
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _running = self.shared.running.lock();
        f()
    }

    fn effective_delay(&self, delay: Option<Duration>) -> Duration {
        match delay {
            Some(delay) if !delay.is_zero() => delay,
            _ => self.shared.default_delay,
        }
    }
}

impl<T: Timer> Shared<T> {
    /// Timer expiry for the request numbered `generation`
    fn fire(&self, generation: u64) {
        let callback = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                trace!("Ignoring stale timer (generation {})", generation);
                return;
            }
            match slot.pending.take() {
                Some(pending) => pending.callback,
                None => return,
            }
        };

        self.run(callback);
    }

    /// Run a callback with the slot unlocked, containing panics and errors
    fn run(&self, callback: Callback) {
        let _running = self.running.lock();
        self.counters.fired.fetch_add(1, Ordering::Relaxed);

        match panic::catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(())) => {
                trace!("Debounced callback completed");
            }
            Ok(Err(e)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Debounced callback failed: {:#}", e);
            }
            Err(payload) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("Debounced callback panicked: {}", panic_message(payload.as_ref()));
            }
        }
    }
}

impl<T: Timer> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.slot.get_mut().pending.take() {
            self.timer.cancel(pending.handle);
            debug!("Debouncer dropped, pending call cancelled");
        }
    }
}

impl<T: Timer> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Timer> fmt::Debug for Debouncer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("default_delay", &self.shared.default_delay)
            .field("pending", &self.is_pending())
            .field("stats", &self.stats())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
