//! Tokio-backed timer
//!
//! Every scheduled action gets its own task that sleeps for the delay and
//! then runs the action. Cancelling aborts the task.

use crate::{Action, Timer, TimerError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::trace;

/// Timer that runs actions on a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioTimer {
    runtime: Handle,
}

/// Handle to an action scheduled on a `TokioTimer`
#[derive(Debug)]
pub struct TokioHandle(AbortHandle);

impl TokioTimer {
    /// Create a timer on an explicit runtime
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Create a timer on the runtime driving the current thread
    pub fn try_current() -> Result<Self, TimerError> {
        let runtime = Handle::try_current().map_err(TimerError::NoRuntime)?;
        Ok(Self::new(runtime))
    }
}

impl Timer for TokioTimer {
    type Handle = TokioHandle;

    fn schedule(&self, delay: Duration, action: Action) -> TokioHandle {
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        trace!("Scheduled timer task after {:?}", delay);
        TokioHandle(task.abort_handle())
    }

    fn cancel(&self, handle: TokioHandle) {
        // Aborting a finished task does nothing
        handle.0.abort();
    }
}
