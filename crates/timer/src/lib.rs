//! Timer capability for debouncing
//!
//! This crate provides:
//! - The `Timer` trait (schedule an action after a delay, cancel it)
//! - `TokioTimer`, backed by a tokio runtime
//! - `ManualTimer`, a fake clock that only moves when told to

pub mod manual;
pub mod runtime;

// Re-exports
pub use manual::{ManualHandle, ManualTimer};
pub use runtime::{TokioHandle, TokioTimer};

use std::time::Duration;

/// A zero-argument action run by a timer once its delay elapses
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run an action after a delay
///
/// Implementations must never run the action inline from `schedule`:
/// callers may hold their own locks while scheduling.
pub trait Timer: Send + Sync + 'static {
    /// Opaque reference to a scheduled action
    type Handle: Send + 'static;

    /// Schedule `action` to run once after `delay`
    fn schedule(&self, delay: Duration, action: Action) -> Self::Handle;

    /// Cancel a scheduled action
    ///
    /// No-op if the action already fired or was already cancelled.
    fn cancel(&self, handle: Self::Handle);
}

/// Timer construction errors
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// `TokioTimer::try_current` was called outside a tokio runtime
    #[error("no tokio runtime is running on this thread")]
    NoRuntime(#[source] tokio::runtime::TryCurrentError),
}
