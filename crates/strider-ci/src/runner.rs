//! Subprocess execution with live output streaming.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use strider_core::{Result, StriderError, PLATFORM_ENV_VAR, PLATFORM_NAME};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

use crate::output::OutputBuffers;
use crate::reporter::StatusReporter;

const READ_CHUNK: usize = 8 * 1024;

/// What to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Working directory.
    pub cwd: PathBuf,

    /// Executable.
    pub program: String,

    pub args: Vec<String>,

    /// Per-call environment overrides (applied after the job's overrides).
    pub env: BTreeMap<String, String>,
}

impl ProcessSpec {
    pub fn new(cwd: impl Into<PathBuf>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            cwd: cwd.into(),
            program: program.into(),
            args,
            env: BTreeMap::new(),
        }
    }

    /// Run `command` through `sh -c`.
    pub fn shell(cwd: impl Into<PathBuf>, command: &str) -> Self {
        let (program, args) = shell_wrap(command);
        Self::new(cwd, program, args)
    }

    /// Split a command line on whitespace; the first word is the program.
    ///
    /// No quoting rules apply. Returns `None` for a blank line.
    pub fn from_command_line(cwd: impl Into<PathBuf>, line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self::new(cwd, program, words.collect()))
    }

    /// Add one environment override.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Wrap a shell command for execution: `("sh", ["-c", command])`.
pub fn shell_wrap(command: &str) -> (String, Vec<String>) {
    ("sh".to_string(), vec!["-c".to_string(), command.to_string()])
}

/// Result of one process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `128 + signal` when killed by a signal.
    pub exit_code: i32,

    /// Everything this process wrote.
    pub output: OutputBuffers,
}

impl ProcessOutput {
    /// True when the process exited 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawns processes for one job and streams their output to its reporter.
#[derive(Clone)]
pub struct ProcessRunner {
    reporter: Arc<StatusReporter>,
    job_env: Arc<BTreeMap<String, String>>,
}

impl ProcessRunner {
    /// A runner reporting to `reporter` with the job's environment overrides.
    pub fn new(reporter: Arc<StatusReporter>, job_env: BTreeMap<String, String>) -> Self {
        Self {
            reporter,
            job_env: Arc::new(job_env),
        }
    }

    /// Spawn a process and wait for it to exit.
    ///
    /// The worker's own environment is inherited, then the job overrides,
    /// then the call overrides, then the platform marker. Every chunk read
    /// from stdout or stderr is emitted as a `job_update` as it arrives.
    pub async fn spawn(&self, spec: ProcessSpec) -> Result<ProcessOutput> {
        debug!(program = %spec.program, cwd = %spec.cwd.display(), "spawning process");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(self.job_env.iter())
            .envs(spec.env.iter())
            .env(PLATFORM_ENV_VAR, PLATFORM_NAME)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| StriderError::Spawn {
            program: spec.program.clone(),
            cwd: spec.cwd.clone(),
            source,
        })?;
        let mut group = ProcessGroup::new(child.id());

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out_buf = vec![0u8; READ_CHUNK];
        let mut err_buf = vec![0u8; READ_CHUNK];
        let mut out_text = Utf8Stream::default();
        let mut err_text = Utf8Stream::default();
        let mut output = OutputBuffers::new();

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                read = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => {
                    let chunk = match read {
                        Ok(n) if n > 0 => out_text.decode(&out_buf[..n]),
                        _ => {
                            stdout = None;
                            out_text.finish()
                        }
                    };
                    if !chunk.is_empty() {
                        output.push_stdout(&chunk);
                        self.reporter.stdout(chunk).await;
                    }
                }
                read = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => {
                    let chunk = match read {
                        Ok(n) if n > 0 => err_text.decode(&err_buf[..n]),
                        _ => {
                            stderr = None;
                            err_text.finish()
                        }
                    };
                    if !chunk.is_empty() {
                        output.push_stderr(&chunk);
                        self.reporter.stderr(chunk).await;
                    }
                }
            }
        }

        let status = child.wait().await?;
        group.release();
        let exit_code = exit_code(status);
        info!(program = %spec.program, exit_code = exit_code, "process exited");

        Ok(ProcessOutput { exit_code, output })
    }

    /// Run a shell command in `cwd`.
    pub async fn shell(&self, cwd: &Path, command: &str) -> Result<ProcessOutput> {
        self.spawn(ProcessSpec::shell(cwd, command)).await
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => Ok(0),
    }
}

/// Incremental UTF-8 decoding for one output stream.
///
/// A multibyte character split across reads is held back until its
/// remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Stream {
    pending: Vec<u8>,
}

impl Utf8Stream {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let consumed = self.pending.len() - rest.len();
        self.pending.drain(..consumed);
        text
    }

    /// Flush whatever is left at EOF.
    fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }
}

/// Kills the child's whole process group unless released after a normal exit.
///
/// Hooks that are cut off (deadline or cancellation) drop the spawn future;
/// this takes grandchildren down with the shell so nothing keeps writing to
/// the working copy.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn release(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let Ok(raw) = i32::try_from(pgid) else {
                return;
            };
            match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
                Ok(()) => debug!(pgid = pgid, "killed process group"),
                Err(e) => debug!(pgid = pgid, error = %e, "process group already gone"),
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
