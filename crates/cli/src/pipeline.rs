//! Line pipeline: read lines, debounce them, write what survives

use crate::settings::{Mode, Settings};
use anyhow::{Context, Result};
use debounce::{Coalescer, Debouncer, KeyedDebouncer, TokioTimer};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub lines_read: usize,
    pub lines_written: usize,
}

/// Shared, counted output
pub struct LineSink<W> {
    output: Arc<Mutex<W>>,
    written: Arc<AtomicUsize>,
}

impl<W: Write> LineSink<W> {
    pub fn new(output: Arc<Mutex<W>>) -> Self {
        Self {
            output,
            written: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Write one line and flush it
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut output = self.output.lock();
        writeln!(output, "{}", line).context("Failed to write output")?;
        output.flush().context("Failed to flush output")?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}

impl<W> Clone for LineSink<W> {
    fn clone(&self) -> Self {
        Self {
            output: Arc::clone(&self.output),
            written: Arc::clone(&self.written),
        }
    }
}

/// Keyed mode drops idle keys after this many lines
const PRUNE_EVERY: usize = 256;

enum Strategy {
    Latest(Debouncer<TokioTimer>),
    Keyed {
        keyed: KeyedDebouncer<String, TokioTimer>,
        prune_every: usize,
        since_prune: usize,
    },
    Batch(Coalescer<String, TokioTimer>),
}

impl Strategy {
    fn new<W>(settings: &Settings, timer: TokioTimer, sink: &LineSink<W>) -> Self
    where
        W: Write + Send + 'static,
    {
        match settings.mode {
            Mode::Latest => Strategy::Latest(Debouncer::with_config(timer, &settings.config)),
            Mode::Keyed => Strategy::Keyed {
                keyed: KeyedDebouncer::with_config(timer, &settings.config),
                prune_every: PRUNE_EVERY,
                since_prune: 0,
            },
            Mode::Batch => {
                let sink = sink.clone();
                let separator = settings.separator.clone();
                Strategy::Batch(Coalescer::with_config(
                    timer,
                    &settings.config,
                    move |batch: Vec<String>| {
                        if let Err(e) = sink.write_line(&batch.join(&separator)) {
                            warn!("Dropped batch of {} lines: {:#}", batch.len(), e);
                        }
                    },
                ))
            }
        }
    }

    fn push<W>(&mut self, line: String, sink: &LineSink<W>)
    where
        W: Write + Send + 'static,
    {
        match self {
            Strategy::Latest(debouncer) => {
                let sink = sink.clone();
                debouncer.schedule_fallible(move || sink.write_line(&line), None);
            }
            Strategy::Keyed {
                keyed,
                prune_every,
                since_prune,
            } => {
                *since_prune += 1;
                if *since_prune >= *prune_every {
                    *since_prune = 0;
                    keyed.prune();
                }

                let key = line.split_whitespace().next().unwrap_or_default().to_string();
                let sink = sink.clone();
                keyed.schedule(
                    key,
                    move || {
                        if let Err(e) = sink.write_line(&line) {
                            warn!("Dropped line: {:#}", e);
                        }
                    },
                    None,
                );
            }
            Strategy::Batch(coalescer) => coalescer.push(line),
        }
    }

    /// Deliver everything still pending
    fn finish(&self) {
        let flushed = match self {
            Strategy::Latest(debouncer) => usize::from(debouncer.flush()),
            Strategy::Keyed { keyed, .. } => keyed.flush_all(),
            Strategy::Batch(coalescer) => usize::from(coalescer.flush() > 0),
        };
        debug!("Flushed {} pending deliveries at end of input", flushed);
    }
}

/// Debounce `input` line by line into `output` until end of input
///
/// Must run inside a tokio runtime. Everything still pending when the
/// input ends is flushed before returning.
pub async fn run<R, W>(input: R, output: Arc<Mutex<W>>, settings: &Settings) -> Result<Summary>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send + 'static,
{
    let timer = TokioTimer::try_current().context("Debouncing requires a tokio runtime")?;
    let sink = LineSink::new(output);
    let mut strategy = Strategy::new(settings, timer, &sink);

    info!(
        "Debouncing input ({:?}, delay {}ms)",
        settings.mode, settings.config.delay_ms
    );

    let mut lines = input.lines();
    let mut lines_read = 0;
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        lines_read += 1;
        strategy.push(line, &sink);
    }

    strategy.finish();

    Ok(Summary {
        lines_read,
        lines_written: sink.written(),
    })
}
