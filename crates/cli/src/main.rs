//! dbn - debounce lines read from stdin

use anyhow::{Context, Result};
use clap::Parser;
use cli_lib::{Mode, Settings};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Echo only the last line of every burst of input
#[derive(Parser)]
#[command(name = "dbn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Quiet period in milliseconds (default: 500, or the config file value)
    #[arg(short, long)]
    delay_ms: Option<u64>,

    /// TOML config file (delay_ms, max_batch)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debounce each key (first whitespace-separated token) independently
    #[arg(long, conflicts_with = "batch")]
    keyed: bool,

    /// Print each burst as a single line instead of its last line
    #[arg(long)]
    batch: bool,

    /// Separator between the lines of a batch
    #[arg(long, default_value = ",")]
    separator: String,

    /// Deliver a batch early once it holds this many lines
    #[arg(long, requires = "batch")]
    max_batch: Option<usize>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Guard must outlive the run so buffered log lines get written
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    let mode = if cli.keyed {
        Mode::Keyed
    } else if cli.batch {
        Mode::Batch
    } else {
        Mode::Latest
    };

    let settings = Settings::resolve(
        cli.config.as_deref(),
        cli.delay_ms,
        cli.max_batch,
        mode,
        cli.separator,
    )?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = Arc::new(Mutex::new(std::io::stdout()));
    let summary = cli_lib::run(stdin, stdout, &settings).await?;

    info!(
        "Read {} lines, wrote {}",
        summary.lines_read, summary.lines_written
    );
    Ok(())
}

/// Log to stderr, or to `log_file` through a background writer
fn init_tracing(
    log_file: Option<&std::path::Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .context("Log file path has no file name")?;
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_writer(std::io::stderr).init();
            Ok(None)
        }
    }
}
