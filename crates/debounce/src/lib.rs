//! Debounced scheduling
//!
//! This crate provides:
//! - `Debouncer`: collapses a burst of requests into one delayed call
//! - `KeyedDebouncer`: one independent debouncer per key (e.g. per path)
//! - `Coalescer`: collects a burst of events and delivers them as one batch
//! - `DebounceConfig`: TOML configuration for delays and batch limits
//!
//! Timers are injected through the `timer::Timer` trait, so the same code
//! runs on tokio in production and on a `ManualTimer` in tests.

pub mod coalesce;
pub mod config;
pub mod debouncer;
pub mod keyed;

// Re-exports
pub use coalesce::Coalescer;
pub use config::{ConfigError, DebounceConfig};
pub use debouncer::{debounce, DebounceStats, Debouncer, DEFAULT_DELAY};
pub use keyed::KeyedDebouncer;
pub use timer::{ManualTimer, Timer, TokioTimer};
