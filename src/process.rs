//! External process execution with deadlines.
//!
//! [`run_with_deadline`] is the one-shot runner used on the standard path;
//! [`ProgressMonitor`] supervises a long-running engine on the large-file
//! path, emitting synthetic progress events while the engine is silent. In
//! both cases a process that exceeds its deadline is killed before the
//! timeout failure is returned; a timed-out process is never left running.

use crate::config::{try_emit, ProgressEvent};
use crate::error::{ConversionError, Result};
use async_process::{Child, Command, Stdio};
use futures::io::BufReader;
use futures::stream;
use futures::{AsyncBufReadExt, StreamExt};
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Lines of combined output kept for failure classification. Verbose engines
/// can emit megabytes; only the tail is diagnostic.
const OUTPUT_TAIL_LINES: usize = 200;

/// Captured outcome of one external process invocation.
#[derive(Debug)]
pub struct CapturedOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Combined stdout and stderr text (tail-capped on the monitored path).
    pub output: String,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

fn map_spawn_error(program: &Path, err: io::Error) -> ConversionError {
    if err.kind() == io::ErrorKind::NotFound {
        ConversionError::EngineNotFound(program.display().to_string())
    } else {
        ConversionError::Io(err)
    }
}

/// Run a command to completion under a deadline, capturing its output.
///
/// On timeout the child is torn down (kill-on-drop) and
/// [`ConversionError::Timeout`] is returned.
pub async fn run_with_deadline(
    program: &Path,
    args: &[String],
    deadline: Duration,
) -> Result<CapturedOutput> {
    debug!(program = %program.display(), ?deadline, "running external command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(deadline, cmd.output()).await {
        Ok(result) => result.map_err(|e| map_spawn_error(program, e))?,
        // Dropping the abandoned future drops the child, which kills it.
        Err(_) => {
            warn!(program = %program.display(), "external command exceeded deadline, killed");
            return Err(ConversionError::Timeout {
                program: program.display().to_string(),
                timeout_secs: deadline.as_secs(),
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(CapturedOutput {
        status: output.status,
        output: format!("{}\n{}", stdout.trim_end(), stderr.trim_end())
            .trim()
            .to_string(),
    })
}

/// Spawn a command with piped output for supervision by [`ProgressMonitor`].
pub fn spawn_piped(program: &Path, args: &[String]) -> Result<Child> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.spawn().map_err(|e| map_spawn_error(program, e))
}

/// Supervises a running engine: polls its output with a short per-read
/// timeout, emits a synthetic progress event on a fixed cadence even when
/// the engine produces nothing, and enforces the overall deadline
/// independently of the per-read timeout.
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    read_timeout: Duration,
    cadence: Duration,
}

impl ProgressMonitor {
    pub fn new(read_timeout: Duration, cadence: Duration) -> Self {
        Self {
            read_timeout,
            cadence,
        }
    }

    /// Drive the child to completion or deadline.
    ///
    /// Returns the exit status plus the tail of the combined output. The
    /// caller never goes silent for longer than the cadence interval: if no
    /// output line arrives, an "elapsed" event is pushed to the sink.
    pub async fn supervise(
        &self,
        mut child: Child,
        program: &str,
        deadline: Duration,
        sink: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<CapturedOutput> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr not piped"))?;

        let mut lines = stream::select(
            BufReader::new(stdout).lines(),
            BufReader::new(stderr).lines(),
        );

        let start = Instant::now();
        let mut last_update = start;
        let mut tail: VecDeque<String> = VecDeque::with_capacity(OUTPUT_TAIL_LINES);

        loop {
            if start.elapsed() >= deadline {
                return self.kill_and_fail(child, program, deadline).await;
            }

            match timeout(self.read_timeout, lines.next()).await {
                // Both output streams ended; the engine is wrapping up.
                Ok(None) => break,
                Ok(Some(Ok(line))) => {
                    if tail.len() == OUTPUT_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Ok(Some(Err(e))) => {
                    warn!(program, "error reading engine output: {e}");
                    break;
                }
                // No output for a whole read interval; the engine may just
                // be busy. The cadence check below keeps the caller informed.
                Err(_) => {}
            }

            if last_update.elapsed() >= self.cadence {
                let minutes = start.elapsed().as_secs_f64() / 60.0;
                try_emit(
                    sink,
                    format!("Conversion still running (elapsed {minutes:.1} minutes)"),
                );
                last_update = Instant::now();
            }
        }

        let remaining = deadline.saturating_sub(start.elapsed());
        let status = match timeout(remaining, child.status()).await {
            Ok(status) => status?,
            Err(_) => return self.kill_and_fail(child, program, deadline).await,
        };

        debug!(
            program,
            elapsed_secs = start.elapsed().as_secs(),
            code = status.code().unwrap_or(-1),
            "engine exited"
        );

        Ok(CapturedOutput {
            status,
            output: tail.into_iter().collect::<Vec<_>>().join("\n"),
        })
    }

    async fn kill_and_fail(
        &self,
        mut child: Child,
        program: &str,
        deadline: Duration,
    ) -> Result<CapturedOutput> {
        warn!(program, ?deadline, "engine exceeded deadline, killing");
        if let Err(e) = child.kill() {
            warn!(program, "failed to kill timed-out engine: {e}");
        }
        // Reap so no zombie outlives the request.
        let _ = child.status().await;
        Err(ConversionError::Timeout {
            program: program.to_string(),
            timeout_secs: deadline.as_secs(),
        })
    }
}
