use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use wavefront_core::manifest::RunManifest;
use wavefront_core::sandbox::{SandboxHandle, EXCLUDED_DIRS};
use wavefront_core::ticket::Ticket;
use wavefront_core::tools::shell::ShellTool;
use wavefront_core::tools::FaultKind;
use wavefront_core::work::{WorkResult, Worker};

/// The execution collaborator backing `wavefront run`: runs a ticket's
/// `command` payload through the shell adapter inside the sandbox, marks
/// acceptance criteria on success, captures a unified diff of the sandbox
/// against the source tree, and runs whatever test suite the workspace
/// declares.
pub struct CommandWorker {
    source_root: PathBuf,
    commands: HashMap<String, String>,
    timeout: Duration,
}

impl CommandWorker {
    pub fn new(source_root: impl Into<PathBuf>, manifest: &RunManifest, timeout: Duration) -> Self {
        let commands = manifest
            .tickets
            .iter()
            .filter_map(|spec| {
                spec.command
                    .as_ref()
                    .map(|cmd| (spec.id.clone(), cmd.clone()))
            })
            .collect();
        Self {
            source_root: source_root.into(),
            commands,
            timeout,
        }
    }
}

impl Worker for CommandWorker {
    fn execute(
        &self,
        mut ticket: Ticket,
        sandbox: SandboxHandle,
    ) -> BoxFuture<'static, wavefront_core::Result<(Ticket, WorkResult)>> {
        let command = self.commands.get(&ticket.id).cloned();
        let source = self.source_root.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let started = Instant::now();
            let mut logs = vec![
                format!("{} picked up {}", sandbox.worker_id, ticket.id),
                format!("ticket: {}", ticket.title),
            ];
            let mut shell = ShellTool::with_timeout(&sandbox.root, timeout);
            let mut success = true;
            let mut error = None;

            match command {
                Some(cmd) => {
                    logs.push(format!("running: {cmd}"));
                    let out = shell.run("sh", &["-c".into(), cmd], &[], None).await;
                    if let Some(output) = &out.output {
                        let trimmed = output.stdout.trim_end();
                        if !trimmed.is_empty() {
                            logs.push(trimmed.to_string());
                        }
                    }
                    if !out.success {
                        success = false;
                        error = out.error.map(|f| f.message);
                    }
                }
                None => logs.push("no command payload; nothing to execute".to_string()),
            }

            if success {
                for criterion in &mut ticket.acceptance_criteria {
                    criterion.met = true;
                    criterion.evidence =
                        Some(format!("verified in sandbox by {}", sandbox.worker_id));
                }
            }
            ticket.assigned_worker = Some(sandbox.worker_id.clone());

            let mut test_counts = None;
            let tests = shell.run_tests(None).await;
            match tests.output {
                Some(report) => {
                    logs.push(format!(
                        "tests ({}): {}/{} passed",
                        report.framework, report.counts.passed, report.counts.total
                    ));
                    test_counts = Some(report.counts);
                }
                None => {
                    if let Some(fault) = &tests.error {
                        if fault.kind == FaultKind::CommandNotFound {
                            logs.push(fault.message.clone());
                        } else {
                            logs.push(format!("test run failed: {}", fault.message));
                        }
                    }
                }
            }

            let diff = capture_diff(&mut shell, &source, &sandbox).await;

            let result = WorkResult {
                ticket_id: ticket.id.clone(),
                success,
                diff,
                logs,
                test_counts,
                error,
                execution_time: started.elapsed(),
            };
            Ok((ticket, result))
        })
    }
}

/// Unified diff of the sandbox against the source tree. `diff` exits 1 when
/// the trees differ, so only the captured text matters here.
async fn capture_diff(shell: &mut ShellTool, source: &PathBuf, sandbox: &SandboxHandle) -> String {
    let mut args = vec!["-ruN".to_string()];
    for dir in EXCLUDED_DIRS {
        args.push("-x".to_string());
        args.push(dir.to_string());
    }
    args.push("-x".to_string());
    args.push(".*".to_string());
    args.push(source.display().to_string());
    args.push(sandbox.root.display().to_string());

    let out = shell.run("diff", &args, &[], None).await;
    out.output.map(|o| o.stdout).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
