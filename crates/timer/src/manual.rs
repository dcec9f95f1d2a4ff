//! Manually driven fake clock
//!
//! Time only moves when `advance`, `advance_to` or `run_until_idle` is
//! called, and due actions run on the calling thread. Used by tests and
//! benches that need exact control over when debounced work fires.

use crate::{Action, Timer};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Fake clock implementing `Timer`
///
/// Clones share the same clock and queue.
#[derive(Clone, Default)]
pub struct ManualTimer {
    clock: Arc<Mutex<Clock>>,
}

/// Handle to an action scheduled on a `ManualTimer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualHandle {
    deadline: Duration,
    seq: u64,
}

#[derive(Default)]
struct Clock {
    /// Time elapsed since the clock was created
    now: Duration,
    /// Tie-breaker so equal deadlines fire in scheduling order
    next_seq: u64,
    queue: BTreeMap<(Duration, u64), Action>,
}

impl ManualTimer {
    /// Create a clock at time zero with nothing scheduled
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clock time (elapsed since creation)
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Number of scheduled actions that have not fired or been cancelled
    pub fn pending(&self) -> usize {
        self.clock.lock().queue.len()
    }

    /// Deadline of the next action to fire
    pub fn next_deadline(&self) -> Option<Duration> {
        self.clock.lock().queue.keys().next().map(|&(deadline, _)| deadline)
    }

    /// Move the clock forward by `by`, running every action that comes due
    ///
    /// Returns the number of actions run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now().checked_add(by).unwrap_or(Duration::MAX);
        self.advance_to(target)
    }

    /// Move the clock forward to `target`, running every action that comes due
    ///
    /// Actions scheduled by other actions also run if they come due before
    /// `target`. The clock never moves backwards.
    pub fn advance_to(&self, target: Duration) -> usize {
        let mut fired = 0;

        loop {
            let action = {
                let mut clock = self.clock.lock();
                match clock.queue.keys().next().copied() {
                    Some(key) if key.0 <= target => {
                        clock.now = key.0;
                        clock.queue.remove(&key)
                    }
                    _ => {
                        clock.now = clock.now.max(target);
                        None
                    }
                }
            };

            // Lock released: the action may schedule or cancel
            match action {
                Some(action) => {
                    action();
                    fired += 1;
                }
                None => break,
            }
        }

        trace!("Manual clock at {:?}, ran {} actions", self.now(), fired);
        fired
    }

    /// Run actions in deadline order until the queue is empty
    ///
    /// Does not return if actions keep rescheduling themselves.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        while let Some(deadline) = self.next_deadline() {
            fired += self.advance_to(deadline);
        }
        fired
    }
}

impl Timer for ManualTimer {
    type Handle = ManualHandle;

    fn schedule(&self, delay: Duration, action: Action) -> ManualHandle {
        let mut clock = self.clock.lock();
        let handle = ManualHandle {
            deadline: clock.now.checked_add(delay).unwrap_or(Duration::MAX),
            seq: clock.next_seq,
        };
        clock.next_seq += 1;
        clock.queue.insert((handle.deadline, handle.seq), action);
        handle
    }

    fn cancel(&self, handle: ManualHandle) {
        let action = self.clock.lock().queue.remove(&(handle.deadline, handle.seq));
        // Dropped unlocked: captured state may touch this timer on drop
        drop(action);
    }
}

impl fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.lock();
        f.debug_struct("ManualTimer")
            .field("now", &clock.now)
            .field("pending", &clock.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Action) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&log);
        let make = move |name: &'static str| -> Action {
            let log = Arc::clone(&shared);
            Box::new(move || log.lock().push(name))
        };
        (log, make)
    }

    #[test]
    fn test_actions_fire_in_deadline_order() {
        let timer = ManualTimer::new();
        let (log, action) = recorder();

        timer.schedule(Duration::from_millis(30), action("late"));
        timer.schedule(Duration::from_millis(10), action("early"));
        timer.schedule(Duration::from_millis(10), action("early-second"));

        assert_eq!(timer.advance(Duration::from_millis(9)), 0);
        assert_eq!(timer.advance(Duration::from_millis(1)), 2);
        assert_eq!(timer.now(), Duration::from_millis(10));
        assert_eq!(timer.advance(Duration::from_millis(100)), 1);
        assert_eq!(timer.now(), Duration::from_millis(110));

        assert_eq!(*log.lock(), vec!["early", "early-second", "late"]);
    }

    #[test]
    fn test_cancel_removes_action() {
        let timer = ManualTimer::new();
        let (log, action) = recorder();

        let handle = timer.schedule(Duration::from_millis(5), action("cancelled"));
        timer.schedule(Duration::from_millis(5), action("kept"));
        timer.cancel(handle);
        assert_eq!(timer.pending(), 1);

        timer.advance(Duration::from_millis(5));
        assert_eq!(*log.lock(), vec!["kept"]);

        // Cancelling again after the fact is harmless
        timer.cancel(handle);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn test_actions_scheduled_by_actions_run_in_same_advance() {
        let timer = ManualTimer::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_timer = timer.clone();
        let inner_log = Arc::clone(&log);
        timer.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner_log.lock().push(10u64);
                let log = Arc::clone(&inner_log);
                inner_timer.schedule(Duration::from_millis(10), Box::new(move || log.lock().push(20)));
            }),
        );

        assert_eq!(timer.advance(Duration::from_millis(25)), 2);
        assert_eq!(*log.lock(), vec![10, 20]);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn test_run_until_idle_and_clock_never_goes_back() {
        let timer = ManualTimer::new();
        let (log, action) = recorder();

        timer.schedule(Duration::from_secs(3), action("a"));
        timer.schedule(Duration::from_secs(1), action("b"));

        assert_eq!(timer.next_deadline(), Some(Duration::from_secs(1)));
        assert_eq!(timer.run_until_idle(), 2);
        assert_eq!(timer.now(), Duration::from_secs(3));
        assert_eq!(*log.lock(), vec!["b", "a"]);

        timer.advance_to(Duration::from_secs(1));
        assert_eq!(timer.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_cancelled_action_dropped_without_lock() {
        struct Reschedule {
            timer: ManualTimer,
            action: Option<Action>,
        }

        impl Drop for Reschedule {
            fn drop(&mut self) {
                if let Some(action) = self.action.take() {
                    self.timer.schedule(Duration::from_millis(1), action);
                }
            }
        }

        let timer = ManualTimer::new();
        let (log, action) = recorder();
        let guard = Reschedule {
            timer: timer.clone(),
            action: Some(action("rescheduled")),
        };
        let handle = timer.schedule(
            Duration::from_millis(5),
            Box::new(move || drop(guard)),
        );

        timer.cancel(handle);
        assert_eq!(timer.pending(), 1);

        timer.run_until_idle();
        assert_eq!(*log.lock(), vec!["rescheduled"]);
    }

    #[test]
    fn test_huge_delays_saturate() {
        let timer = ManualTimer::new();
        let (log, action) = recorder();

        timer.advance(Duration::from_secs(1));
        timer.schedule(Duration::MAX, action("never"));
        assert_eq!(timer.next_deadline(), Some(Duration::MAX));

        assert_eq!(timer.advance(Duration::MAX), 1);
        assert_eq!(timer.now(), Duration::MAX);
        assert_eq!(*log.lock(), vec!["never"]);
    }
}
