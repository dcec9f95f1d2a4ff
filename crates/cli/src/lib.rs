//! Library half of the `dbn` command
//!
//! Split out of the binary so the pipeline can be tested without
//! spawning a process.

pub mod pipeline;
pub mod settings;

pub use pipeline::{run, LineSink, Summary};
pub use settings::{Mode, Settings};
