//! Event coalescing
//!
//! Events pushed during a burst are buffered and handed to a sink as one
//! batch once the burst goes quiet, or earlier when the batch is full.

use crate::config::DebounceConfig;
use crate::debouncer::Debouncer;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use timer::Timer;
use tracing::debug;

type Sink<E> = Box<dyn Fn(Vec<E>) + Send + Sync + 'static>;

/// Collects events and delivers each quiet burst as one ordered batch
pub struct Coalescer<E, T: Timer> {
    debouncer: Debouncer<T>,
    delay: Duration,
    max_batch: Option<usize>,
    batch: Arc<Batch<E>>,
}

struct Batch<E> {
    buffer: Mutex<Vec<E>>,
    sink: Sink<E>,
}

impl<E, T> Coalescer<E, T>
where
    E: Send + 'static,
    T: Timer,
{
    /// Create a coalescer delivering to `sink` after `delay` of quiet
    ///
    /// A zero delay uses the 500ms default.
    pub fn new<S>(timer: T, delay: Duration, sink: S) -> Self
    where
        S: Fn(Vec<E>) + Send + Sync + 'static,
    {
        Self {
            debouncer: Debouncer::with_default_delay(timer, delay),
            delay,
            max_batch: None,
            batch: Arc::new(Batch {
                buffer: Mutex::new(Vec::new()),
                sink: Box::new(sink),
            }),
        }
    }

    /// Create a coalescer with delay and batch limit from configuration
    pub fn with_config<S>(timer: T, config: &DebounceConfig, sink: S) -> Self
    where
        S: Fn(Vec<E>) + Send + Sync + 'static,
    {
        let coalescer = Self::new(timer, config.delay(), sink);
        match config.max_batch {
            Some(max) => coalescer.with_max_batch(max),
            None => coalescer,
        }
    }

    /// Deliver immediately once `max` events are buffered (minimum 1)
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = Some(max.max(1));
        self
    }

    /// Buffer an event and push back delivery of the current burst
    ///
    /// If the buffer reaches the batch limit it is delivered on the calling
    /// thread before `push` returns.
    pub fn push(&self, event: E) {
        let full = {
            let mut buffer = self.batch.buffer.lock();
            buffer.push(event);
            self.max_batch.is_some_and(|max| buffer.len() >= max)
        };

        if full {
            let delivered = self.debouncer.exclusive(|| {
                self.debouncer.cancel();
                self.batch.deliver()
            });
            debug!("Batch limit reached, delivered {} events", delivered);
            return;
        }

        let batch = Arc::clone(&self.batch);
        self.debouncer.schedule(
            move || {
                batch.deliver();
            },
            Some(self.delay),
        );
    }

    /// Deliver whatever is buffered now; returns the batch size
    ///
    /// Waits for a delivery already running on another thread, so the sink
    /// never sees two batches at once.
    pub fn flush(&self) -> usize {
        self.debouncer.exclusive(|| {
            self.debouncer.cancel();
            self.batch.deliver()
        })
    }

    /// Number of events waiting for delivery
    pub fn buffered(&self) -> usize {
        self.batch.buffer.lock().len()
    }

    /// Counters of the underlying debouncer
    pub fn stats(&self) -> crate::DebounceStats {
        self.debouncer.stats()
    }
}

impl<E> Batch<E> {
    fn deliver(&self) -> usize {
        let events = std::mem::take(&mut *self.buffer.lock());
        if events.is_empty() {
            return 0;
        }
        let count = events.len();
        (self.sink)(events);
        count
    }
}

impl<E, T: Timer> fmt::Debug for Coalescer<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coalescer")
            .field("delay", &self.delay)
            .field("max_batch", &self.max_batch)
            .field("buffered", &self.batch.buffer.lock().len())
            .finish()
    }
}
