//! Constrained command-execution layer shared by every tool adapter.
//!
//! All adapters return the same outcome shape: `{success, output, error,
//! logs}`. Faults (timeouts, missing commands, path escapes) are data, not
//! panics or propagated errors. Every external command runs with an explicit
//! or default timeout and its captured output is bounded.

pub mod git;
pub mod repo;
pub mod shell;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for a single external command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured stdout/stderr are cut at this many bytes, with a marker appended.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

const TRUNCATION_MARKER: &str = "\n... [output truncated]";

// ---------------------------------------------------------------------------
// ToolFault / FaultKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Timeout,
    CommandNotFound,
    CommandFailed,
    PathEscape,
    TooLarge,
    Io,
    Parse,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolFault {
    pub kind: FaultKind,
    pub message: String,
}

impl ToolFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ---------------------------------------------------------------------------
// ToolOutcome
// ---------------------------------------------------------------------------

/// Uniform result of one tool call. `success` is false exactly when `error`
/// is set; `logs` is a snapshot of the adapter's operation log at call time.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome<T> {
    pub success: bool,
    pub output: Option<T>,
    pub error: Option<ToolFault>,
    pub logs: Vec<String>,
}

impl<T> ToolOutcome<T> {
    pub fn ok(output: T, logs: Vec<String>) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            logs,
        }
    }

    pub fn fail(fault: ToolFault, logs: Vec<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(fault),
            logs,
        }
    }

    /// Failure that still carries partial output (e.g. a non-zero exit with
    /// captured stderr).
    pub fn fail_with_output(output: T, fault: ToolFault, logs: Vec<String>) -> Self {
        Self {
            success: false,
            output: Some(output),
            error: Some(fault),
            logs,
        }
    }

    pub fn fault_kind(&self) -> Option<FaultKind> {
        self.error.as_ref().map(|f| f.kind)
    }
}

// ---------------------------------------------------------------------------
// CommandRecord
// ---------------------------------------------------------------------------

/// Immutable record of one executed command, appended to the owning
/// adapter's history. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    pub command: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Subprocess runner
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum ExecOutcome {
    Completed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        truncated: bool,
    },
    TimedOut,
    SpawnFailed(std::io::Error),
}

/// Run one external command with piped output and a hard timeout. On timeout
/// the child is killed (`kill_on_drop`) and `TimedOut` is returned; the call
/// never hangs past the deadline.
pub(crate) async fn exec(
    program: &str,
    args: &[String],
    cwd: &Path,
    envs: &[(String, String)],
    timeout: Duration,
) -> ExecOutcome {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    for (k, v) in envs {
        cmd.env(k, v);
    }

    let child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return ExecOutcome::SpawnFailed(e),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let (stdout, out_cut) = bound_output(output.stdout);
            let (stderr, err_cut) = bound_output(output.stderr);
            ExecOutcome::Completed {
                exit_code: output.status.code(),
                stdout,
                stderr,
                truncated: out_cut || err_cut,
            }
        }
        Ok(Err(e)) => ExecOutcome::SpawnFailed(e),
        // Dropping the in-flight future kills the child.
        Err(_) => ExecOutcome::TimedOut,
    }
}

/// Lossy-decode and cap captured output at [`MAX_CAPTURE_BYTES`].
pub(crate) fn bound_output(bytes: Vec<u8>) -> (String, bool) {
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if text.len() <= MAX_CAPTURE_BYTES {
        return (text, false);
    }
    let mut cut = MAX_CAPTURE_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    (text, true)
}

/// Render a program + args as a single loggable command line.
pub(crate) fn render_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
