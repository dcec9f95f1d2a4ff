//! Per-key debouncing
//!
//! Each key (a file path, a record id, ...) gets its own debouncer, so a
//! burst on one key never cancels pending work on another.

use crate::config::DebounceConfig;
use crate::debouncer::{Debouncer, DEFAULT_DELAY};
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;
use timer::Timer;
use tracing::debug;

/// Independent debouncers keyed by `K`, all sharing one timer
pub struct KeyedDebouncer<K, T>
where
    K: Eq + Hash,
    T: Timer + Clone,
{
    timer: T,
    default_delay: Duration,
    entries: DashMap<K, Debouncer<T>>,
}

impl<K, T> KeyedDebouncer<K, T>
where
    K: Eq + Hash + Clone,
    T: Timer + Clone,
{
    /// Create a keyed debouncer with the default 500ms delay
    pub fn new(timer: T) -> Self {
        Self::with_default_delay(timer, DEFAULT_DELAY)
    }

    /// Create a keyed debouncer with a custom default delay
    pub fn with_default_delay(timer: T, default_delay: Duration) -> Self {
        Self {
            timer,
            default_delay,
            entries: DashMap::new(),
        }
    }

    /// Create a keyed debouncer whose default delay comes from configuration
    pub fn with_config(timer: T, config: &DebounceConfig) -> Self {
        Self::with_default_delay(timer, config.delay())
    }

    /// Schedule `callback` for `key`, superseding only that key's pending call
    pub fn schedule<F>(&self, key: K, callback: F, delay: Option<Duration>)
    where
        F: FnOnce() + Send + 'static,
    {
        // Scheduling never runs the callback, so the entry lock can be held
        self.entries
            .entry(key)
            .or_insert_with(|| Debouncer::with_default_delay(self.timer.clone(), self.default_delay))
            .schedule(callback, delay);
    }

    /// Drop `key`'s pending call; returns whether one was pending
    pub fn cancel(&self, key: &K) -> bool {
        self.get(key).is_some_and(|debouncer| debouncer.cancel())
    }

    /// Run `key`'s pending call now; returns whether one was pending
    pub fn flush(&self, key: &K) -> bool {
        self.get(key).is_some_and(|debouncer| debouncer.flush())
    }

    /// Run every pending call now; returns how many ran
    pub fn flush_all(&self) -> usize {
        let debouncers: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        debouncers.iter().filter(|debouncer| debouncer.flush()).count()
    }

    /// Whether `key` has a pending call
    pub fn is_pending(&self, key: &K) -> bool {
        self.get(key).is_some_and(|debouncer| debouncer.is_pending())
    }

    /// Keys with a pending call
    pub fn pending_keys(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|e| e.value().is_pending())
            .map(|e| e.key().clone())
            .collect()
    }

    /// Number of tracked keys (pending or idle)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget keys with nothing pending; returns how many were removed
    pub fn prune(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, debouncer| debouncer.is_pending());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Pruned {} idle debounce keys", removed);
        }
        removed
    }

    // Cloned out so callbacks run without a map lock held
    fn get(&self, key: &K) -> Option<Debouncer<T>> {
        self.entries.get(key).map(|e| e.value().clone())
    }
}

impl<K, T> fmt::Debug for KeyedDebouncer<K, T>
where
    K: Eq + Hash,
    T: Timer + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedDebouncer")
            .field("default_delay", &self.default_delay)
            .field("keys", &self.entries.len())
            .finish()
    }
}
