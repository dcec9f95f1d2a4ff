//! Helpers for running the `dbn` binary with piped stdin

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// `dbn` invocation builder
pub struct DbnCommand {
    working_dir: PathBuf,
    args: Vec<String>,
    stdin_data: String,
    hold_stdin_open: bool,
    timeout: Duration,
}

impl DbnCommand {
    /// Create a new command in the given working directory
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            args: Vec::new(),
            stdin_data: String::new(),
            hold_stdin_open: false,
            timeout: Duration::from_secs(30),
        }
    }

    /// Add command arguments
    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Data written to stdin before it is closed
    pub fn stdin(&mut self, data: &str) -> &mut Self {
        self.stdin_data = data.to_string();
        self
    }

    /// Keep stdin open after writing, so input never ends
    pub fn hold_stdin_open(&mut self) -> &mut Self {
        self.hold_stdin_open = true;
        self
    }

    /// Set command timeout
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Execute command and return result with timing
    ///
    /// The process is killed if it outlives the timeout.
    pub fn execute(&self) -> Result<CommandResult> {
        let start = Instant::now();

        let mut child = Command::new(env!("CARGO_BIN_EXE_dbn"))
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn dbn")?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // Dropping stdin closes it, which ends the input
        let mut stdin = child.stdin.take();
        if let Some(pipe) = stdin.as_mut() {
            pipe.write_all(self.stdin_data.as_bytes())?;
        }
        if !self.hold_stdin_open {
            drop(stdin.take());
        }

        let status = loop {
            if let Some(status) = child.try_wait().context("Failed to wait for dbn")? {
                break status;
            }
            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                anyhow::bail!("dbn timed out after {:?}\nArgs: {:?}", self.timeout, self.args);
            }
            thread::sleep(Duration::from_millis(10));
        };
        drop(stdin);

        Ok(CommandResult {
            stdout: join_output(stdout)?,
            stderr: join_output(stderr)?,
            exit_code: status.code().unwrap_or(-1),
            duration: start.elapsed(),
        })
    }

    /// Execute and assert success
    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }

        Ok(result)
    }

    /// Execute and expect failure
    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }

        Ok(result)
    }
}

/// Read a pipe to the end on its own thread
fn drain(pipe: Option<impl Read + Send + 'static>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn join_output(reader: thread::JoinHandle<Vec<u8>>) -> Result<String> {
    let bytes = reader
        .join()
        .map_err(|_| anyhow::anyhow!("Output reader panicked"))?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Command execution result with timing
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty stdout lines
    pub fn lines(&self) -> Vec<&str> {
        self.stdout.lines().filter(|l| !l.is_empty()).collect()
    }
}
