use super::{
    exec, render_command, CommandRecord, ExecOutcome, FaultKind, ToolFault, ToolOutcome,
    DEFAULT_TIMEOUT,
};
use crate::work::TestCounts;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default ceiling for a full test-suite run.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Output records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestCommand {
    pub framework: String,
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub framework: String,
    pub command: String,
    pub exit_code: Option<i32>,
    pub counts: TestCounts,
    pub passed: bool,
}

// ---------------------------------------------------------------------------
// ShellTool
// ---------------------------------------------------------------------------

/// Command execution scoped to one sandbox. One instance per worker; the
/// operation log and command history are private to the instance and
/// append-only.
pub struct ShellTool {
    working_dir: PathBuf,
    default_timeout: Duration,
    logs: Vec<String>,
    history: Vec<CommandRecord>,
}

impl ShellTool {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self::with_timeout(working_dir, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(working_dir: impl Into<PathBuf>, default_timeout: Duration) -> Self {
        Self {
            working_dir: working_dir.into(),
            default_timeout,
            logs: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn history(&self) -> &[CommandRecord] {
        &self.history
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.logs.push(message);
    }

    /// Execute a command in the working directory with a hard timeout.
    pub async fn run(
        &mut self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        timeout: Option<Duration>,
    ) -> ToolOutcome<CommandOutput> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let command = render_command(program, args);
        self.log(format!("shell.run: {command}"));

        let outcome = exec(program, args, &self.working_dir, envs, timeout).await;
        match outcome {
            ExecOutcome::Completed {
                exit_code,
                stdout,
                stderr,
                truncated,
            } => {
                self.history.push(CommandRecord {
                    command: command.clone(),
                    working_dir: self.working_dir.clone(),
                    timeout,
                    exit_code,
                    stdout: stdout.clone(),
                    stderr: stderr.clone(),
                    truncated,
                });
                self.log(format!("shell.run: exit_code={exit_code:?}"));

                let output = CommandOutput {
                    command,
                    exit_code,
                    stdout,
                    stderr,
                    truncated,
                };
                if exit_code == Some(0) {
                    ToolOutcome::ok(output, self.logs.clone())
                } else {
                    let fault = ToolFault::new(
                        FaultKind::CommandFailed,
                        format!("command exited with {exit_code:?}: {}", output.stderr.trim()),
                    );
                    ToolOutcome::fail_with_output(output, fault, self.logs.clone())
                }
            }
            ExecOutcome::TimedOut => {
                self.history.push(CommandRecord {
                    command: command.clone(),
                    working_dir: self.working_dir.clone(),
                    timeout,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    truncated: false,
                });
                let message = format!("command timed out after {}s: {command}", timeout.as_secs());
                self.log(format!("shell.run: {message}"));
                ToolOutcome::fail(ToolFault::new(FaultKind::Timeout, message), self.logs.clone())
            }
            ExecOutcome::SpawnFailed(e) => {
                self.history.push(CommandRecord {
                    command: command.clone(),
                    working_dir: self.working_dir.clone(),
                    timeout,
                    exit_code: Some(127),
                    stdout: String::new(),
                    stderr: e.to_string(),
                    truncated: false,
                });
                let (kind, message) = if e.kind() == std::io::ErrorKind::NotFound {
                    (
                        FaultKind::CommandNotFound,
                        format!("command not found: {program}"),
                    )
                } else {
                    (FaultKind::Io, format!("failed to spawn {program}: {e}"))
                };
                self.log(format!("shell.run: {message}"));
                ToolOutcome::fail(ToolFault::new(kind, message), self.logs.clone())
            }
        }
    }

    /// Locate a command on the effective `PATH`.
    pub fn which(&mut self, program: &str) -> ToolOutcome<PathBuf> {
        self.log(format!("shell.which: {program}"));
        match which::which_in(program, std::env::var_os("PATH"), &self.working_dir) {
            Ok(path) => {
                self.log(format!("shell.which: found {}", path.display()));
                ToolOutcome::ok(path, self.logs.clone())
            }
            Err(_) => {
                self.log(format!("shell.which: not found: {program}"));
                ToolOutcome::fail(
                    ToolFault::new(
                        FaultKind::CommandNotFound,
                        format!("command not found: {program}"),
                    ),
                    self.logs.clone(),
                )
            }
        }
    }

    /// Inspect workspace marker files and pick a test invocation. Later
    /// detections override earlier ones; no marker means "no framework
    /// detected", never a guess.
    pub fn detect_test_command(&mut self) -> ToolOutcome<TestCommand> {
        self.log("shell.detect_test_command".to_string());
        let dir = self.working_dir.clone();
        let mut detected: Option<TestCommand> = None;

        let has = |name: &str| dir.join(name).exists();

        if (has("pytest.ini") || has("pyproject.toml") || has("setup.py"))
            && self.which("pytest").success
        {
            detected = Some(TestCommand {
                framework: "pytest".into(),
                program: "pytest".into(),
                args: vec!["-v".into()],
            });
        }

        if has("package.json") {
            if let Ok(raw) = std::fs::read_to_string(dir.join("package.json")) {
                if let Ok(pkg) = serde_json::from_str::<serde_json::Value>(&raw) {
                    if let Some(scripts) = pkg.get("scripts").and_then(|s| s.as_object()) {
                        if scripts.contains_key("test") {
                            detected = Some(TestCommand {
                                framework: "npm".into(),
                                program: "npm".into(),
                                args: vec!["test".into()],
                            });
                        }
                        if scripts
                            .values()
                            .any(|v| v.as_str().is_some_and(|s| s.contains("playwright")))
                        {
                            detected = Some(TestCommand {
                                framework: "playwright".into(),
                                program: "npx".into(),
                                args: vec!["playwright".into(), "test".into()],
                            });
                        }
                    }
                }
            }
        }

        if has("go.mod") {
            detected = Some(TestCommand {
                framework: "go".into(),
                program: "go".into(),
                args: vec!["test".into(), "./...".into()],
            });
        }

        if has("Cargo.toml") {
            detected = Some(TestCommand {
                framework: "cargo".into(),
                program: "cargo".into(),
                args: vec!["test".into()],
            });
        }

        match detected {
            Some(cmd) => {
                self.log(format!("shell.detect_test_command: {}", cmd.framework));
                ToolOutcome::ok(cmd, self.logs.clone())
            }
            None => {
                self.log("shell.detect_test_command: no framework detected".to_string());
                ToolOutcome::fail(
                    ToolFault::new(FaultKind::CommandNotFound, "no test framework detected"),
                    self.logs.clone(),
                )
            }
        }
    }

    /// Detect and run the workspace's test suite, parsing pass/fail counts
    /// out of the runner's output.
    pub async fn run_tests(&mut self, timeout: Option<Duration>) -> ToolOutcome<TestReport> {
        let detection = self.detect_test_command();
        let Some(cmd) = detection.output else {
            return ToolOutcome::fail(
                detection
                    .error
                    .unwrap_or_else(|| ToolFault::new(FaultKind::CommandNotFound, "no test framework detected")),
                self.logs.clone(),
            );
        };

        let timeout = timeout.unwrap_or(TEST_TIMEOUT);
        let run = self
            .run(&cmd.program, &cmd.args, &[], Some(timeout))
            .await;

        match run.output {
            Some(output) => {
                let mut combined = output.stdout.clone();
                combined.push('\n');
                combined.push_str(&output.stderr);
                let counts = parse_test_counts(&combined);
                let report = TestReport {
                    framework: cmd.framework,
                    command: output.command.clone(),
                    exit_code: output.exit_code,
                    counts,
                    passed: output.exit_code == Some(0),
                };
                if report.passed {
                    ToolOutcome::ok(report, self.logs.clone())
                } else {
                    let fault = run.error.unwrap_or_else(|| {
                        ToolFault::new(FaultKind::CommandFailed, "test run failed")
                    });
                    ToolOutcome::fail_with_output(report, fault, self.logs.clone())
                }
            }
            None => ToolOutcome::fail(
                run.error
                    .unwrap_or_else(|| ToolFault::new(FaultKind::Io, "test run produced no output")),
                self.logs.clone(),
            ),
        }
    }
}

/// Pull `N passed` / `N failed` / `N skipped` (or cargo's `N ignored`)
/// counts out of test-runner output.
pub fn parse_test_counts(output: &str) -> TestCounts {
    let grab = |pattern: &str| -> u32 {
        regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .ok()
            .and_then(|re| re.captures(output))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let passed = grab(r"(\d+) passed");
    let failed = grab(r"(\d+) failed");
    let skipped = grab(r"(\d+) skipped").max(grab(r"(\d+) ignored"));
    TestCounts {
        total: passed + failed + skipped,
        passed,
        failed,
        skipped,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
