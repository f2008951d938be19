//! Builder for executing external tool commands with timeout, cancellation
//! and log capture.
//!
//! Every child is started in its own process group. Once the leader exits,
//! or on timeout or cancellation, the whole group receives `SIGKILL` and the
//! child is reaped before the call returns, so trainers that fork data-loader
//! workers do not leave orphans holding the GPU. Draining the output pipes is
//! bounded by the same deadline.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sf_core::{Error, Result};

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Lines of output kept in a failure's `log_tail`.
pub const LOG_TAIL_LINES: usize = 200;

/// Upper bound on bytes scanned from the end of a log for the tail.
const LOG_TAIL_MAX_BYTES: u64 = 1024 * 1024;

/// Environment applied to every child so GUI-capable libraries stay headless.
/// Caller-supplied variables override these.
const HEADLESS_ENV: &[(&str, &str)] = &[
    ("QT_QPA_PLATFORM", "offscreen"),
    ("MPLBACKEND", "Agg"),
    ("PYOPENGL_PLATFORM", "egl"),
];

/// Where a child's stdout and stderr go.
#[derive(Debug, Clone, Default)]
pub enum Capture {
    /// Collect both streams in memory. Suitable for short, chatty-but-small
    /// tools such as ffprobe.
    #[default]
    Buffered,
    /// Append both streams to a log file. Nothing is held in memory.
    Streamed(PathBuf),
}

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8). Empty when streamed.
    pub stdout: String,
    /// Captured standard error (lossy UTF-8). Empty when streamed.
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use sf_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> sf_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "quiet", "-print_format", "json", "-show_format"])
///     .arg("/path/to/video.mp4")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
    capture: Capture,
    cancel: Option<CancellationToken>,
    label: Option<String>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            capture: Capture::Buffered,
            cancel: None,
            label: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable, overriding the headless defaults.
    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = Some(d);
        self
    }

    /// Let the process run for as long as it likes.
    pub fn no_timeout(&mut self) -> &mut Self {
        self.timeout = None;
        self
    }

    pub fn capture(&mut self, capture: Capture) -> &mut Self {
        self.capture = capture;
        self
    }

    /// Kill the process when `token` is cancelled.
    pub fn cancel_on(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    /// Name used in errors and logs instead of the program's file name.
    pub fn label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = Some(label.into());
        self
    }

    fn tool_name(&self) -> String {
        if let Some(ref label) = self.label {
            return label.clone();
        }
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command.
    ///
    /// # Errors
    ///
    /// - [`Error::Tool`] if the process cannot be spawned or its log opened.
    /// - [`Error::ProcessExit`] on a non-zero exit, with the last
    ///   [`LOG_TAIL_LINES`] lines of output.
    /// - [`Error::ProcessTimeout`] if the timeout elapsed. The process group
    ///   has been killed and reaped.
    /// - [`Error::Cancelled`] if the cancellation token fired.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let tool = self.tool_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in HEADLESS_ENV {
            cmd.env(k, v);
        }
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        match self.capture {
            Capture::Buffered => {
                cmd.stdout(Stdio::piped());
                cmd.stderr(Stdio::piped());
            }
            Capture::Streamed(ref log_path) => {
                let log = open_log(log_path).map_err(|e| {
                    Error::tool(&tool, format!("failed to open log {}: {e}", log_path.display()))
                })?;
                let log_err = log.try_clone().map_err(|e| {
                    Error::tool(&tool, format!("failed to open log {}: {e}", log_path.display()))
                })?;
                cmd.stdout(Stdio::from(log));
                cmd.stderr(Stdio::from(log_err));
            }
        }

        tracing::debug!(tool = %tool, args = ?self.args, "Spawning process");

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::tool(&tool, format!("failed to spawn: {e}")))?;
        let guard = GroupGuard::new(child.id());

        let stdout_task = child.stdout.take().map(|mut s| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = s.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr_task = child.stderr.take().map(|mut s| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = s.read_to_end(&mut buf).await;
                buf
            })
        });

        let timeout = self.timeout;
        let deadline = timeout.map(|d| Instant::now() + d);
        let cancel = self.cancel.clone();

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = until(deadline) => Outcome::TimedOut,
            _ = cancelled(cancel.as_ref()) => Outcome::Cancelled,
        };

        let status = match outcome {
            Outcome::Exited(status) => {
                // Workers forked by the leader share its group; none may
                // outlive the call.
                guard.kill();
                status.map_err(|e| Error::tool(&tool, format!("I/O error waiting for process: {e}")))?
            }
            stopped => {
                guard.kill();
                let _ = child.start_kill();
                let _ = child.wait().await;
                abort(stdout_task);
                abort(stderr_task);
                return Err(stopped.into_error(tool, timeout));
            }
        };

        // A process that left the group can still hold the pipes open, so the
        // drain is bounded by the same deadline and token.
        let readers: Vec<_> = [&stdout_task, &stderr_task]
            .into_iter()
            .flatten()
            .map(JoinHandle::abort_handle)
            .collect();
        let drained = tokio::select! {
            out = async { (collect(stdout_task).await, collect(stderr_task).await) } => Some(out),
            _ = until(deadline) => None,
            _ = cancelled(cancel.as_ref()) => None,
        };
        let Some((stdout, stderr)) = drained else {
            readers.iter().for_each(|r| r.abort());
            let stopped = if cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                Outcome::Cancelled
            } else {
                Outcome::TimedOut
            };
            return Err(stopped.into_error(tool, timeout));
        };

        if !status.success() {
            let log_tail = match self.capture {
                Capture::Buffered => {
                    let source = if stderr.trim().is_empty() { &stdout } else { &stderr };
                    tail_lines(source, LOG_TAIL_LINES)
                }
                Capture::Streamed(ref path) => log_tail(path, LOG_TAIL_LINES),
            };
            tracing::debug!(tool = %tool, code = ?status.code(), "Process failed");
            return Err(Error::ProcessExit {
                tool,
                code: status.code(),
                log_tail,
            });
        }

        Ok(ToolOutput {
            status,
            stdout,
            stderr,
        })
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl Outcome {
    fn into_error(self, tool: String, timeout: Option<Duration>) -> Error {
        match self {
            Outcome::Cancelled => {
                tracing::info!(tool = %tool, "Process cancelled; killed process group");
                Error::Cancelled(tool)
            }
            _ => {
                let timeout = timeout.unwrap_or_default();
                tracing::warn!(tool = %tool, timeout_secs = timeout.as_secs(), "Process timed out; killed process group");
                Error::ProcessTimeout { tool, timeout }
            }
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

fn open_log(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(handle) => match handle.await {
            Ok(buf) => String::from_utf8_lossy(&buf).to_string(),
            Err(_) => String::new(),
        },
        None => String::new(),
    }
}

fn abort(task: Option<JoinHandle<Vec<u8>>>) {
    if let Some(handle) = task {
        handle.abort();
    }
}

/// Kills the child's process group when dropped. Covers the case where the
/// `execute` future itself is dropped by an outer timeout.
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn kill(mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process_group(pid);
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process_group(pid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions. The group id is
    // the child's pid because it was spawned with process_group(0).
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::trace!(pgid, "killpg: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Last `max_lines` lines of `text`.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let mut tail: VecDeque<&str> = VecDeque::with_capacity(max_lines.min(1024));
    for line in text.lines() {
        if tail.len() == max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Last `max_lines` lines of the file at `path`.
///
/// Reads backwards from the end in chunks and never scans more than 1 MiB,
/// so a multi-gigabyte training log costs the same as a small one. Returns
/// an empty string if the file cannot be read.
pub fn log_tail(path: &Path, max_lines: usize) -> String {
    match read_tail(path, max_lines) {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(path = %path.display(), "Could not read log tail: {e}");
            String::new()
        }
    }
}

fn read_tail(path: &Path, max_lines: usize) -> std::io::Result<String> {
    const CHUNK: u64 = 8 * 1024;

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let floor = len.saturating_sub(LOG_TAIL_MAX_BYTES);

    let mut pos = len;
    let mut buf: Vec<u8> = Vec::new();
    while pos > floor {
        let start = pos.saturating_sub(CHUNK).max(floor);
        let mut chunk = vec![0u8; (pos - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
        pos = start;

        // One extra newline so a trailing partial line does not count.
        if buf.iter().filter(|&&b| b == b'\n').count() > max_lines {
            break;
        }
    }

    Ok(tail_lines(&String::from_utf8_lossy(&buf), max_lines))
}
