use super::{
    exec, render_command, CommandRecord, ExecOutcome, FaultKind, ToolFault, ToolOutcome,
    DEFAULT_TIMEOUT,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Author identity used for commits made on behalf of the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Structured status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
    Unmerged,
}

impl ChangeKind {
    fn from_code(code: char) -> Option<ChangeKind> {
        match code {
            'M' => Some(ChangeKind::Modified),
            'A' => Some(ChangeKind::Added),
            'D' => Some(ChangeKind::Deleted),
            'R' => Some(ChangeKind::Renamed),
            'C' => Some(ChangeKind::Copied),
            'T' => Some(ChangeKind::TypeChanged),
            'U' => Some(ChangeKind::Unmerged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub change: ChangeKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoStatus {
    pub branch: Option<String>,
    pub staged: Vec<FileEntry>,
    pub unstaged: Vec<FileEntry>,
    pub untracked: Vec<String>,
    pub raw: String,
}

impl RepoStatus {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty() && self.untracked.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Structured diff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub additions: usize,
    pub deletions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub files: Vec<FileDiff>,
    pub additions: usize,
    pub deletions: usize,
    pub raw: String,
}

// ---------------------------------------------------------------------------
// GitTool
// ---------------------------------------------------------------------------

/// Version-control operations against one working copy. Commands run through
/// the shared timeout-bound runner; structured records are parsed on top of
/// the raw output so callers never re-parse.
pub struct GitTool {
    repo_root: PathBuf,
    default_timeout: Duration,
    logs: Vec<String>,
    history: Vec<CommandRecord>,
}

impl GitTool {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self::with_timeout(repo_root, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(repo_root: impl Into<PathBuf>, default_timeout: Duration) -> Self {
        let repo_root = repo_root.into();
        if !repo_root.join(".git").exists() {
            tracing::warn!(root = %repo_root.display(), "not a git repository");
        }
        Self {
            repo_root,
            default_timeout,
            logs: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
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

    /// Run `git <args>` with a hard timeout, recording the command.
    async fn run_git(&mut self, args: &[String], timeout: Option<Duration>) -> ToolOutcome<String> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let command = render_command("git", args);
        self.log(format!("git: {command}"));

        let outcome = exec("git", args, &self.repo_root, &[], timeout).await;
        match outcome {
            ExecOutcome::Completed {
                exit_code,
                stdout,
                stderr,
                truncated,
            } => {
                self.history.push(CommandRecord {
                    command,
                    working_dir: self.repo_root.clone(),
                    timeout,
                    exit_code,
                    stdout: stdout.clone(),
                    stderr: stderr.clone(),
                    truncated,
                });
                if exit_code == Some(0) {
                    ToolOutcome::ok(stdout, self.logs.clone())
                } else {
                    ToolOutcome::fail_with_output(
                        stdout,
                        ToolFault::new(FaultKind::CommandFailed, stderr.trim().to_string()),
                        self.logs.clone(),
                    )
                }
            }
            ExecOutcome::TimedOut => {
                let message = format!("git command timed out after {}s", timeout.as_secs());
                self.log(message.clone());
                ToolOutcome::fail(ToolFault::new(FaultKind::Timeout, message), self.logs.clone())
            }
            ExecOutcome::SpawnFailed(e) => {
                let (kind, message) = if e.kind() == std::io::ErrorKind::NotFound {
                    (
                        FaultKind::CommandNotFound,
                        "git is not installed or not on PATH".to_string(),
                    )
                } else {
                    (FaultKind::Io, format!("failed to spawn git: {e}"))
                };
                self.log(message.clone());
                ToolOutcome::fail(ToolFault::new(kind, message), self.logs.clone())
            }
        }
    }

    /// Repository status with per-file staged/unstaged/untracked state.
    pub async fn status(&mut self) -> ToolOutcome<RepoStatus> {
        let args = vec![
            "status".to_string(),
            "--porcelain".to_string(),
            "--branch".to_string(),
        ];
        let out = self.run_git(&args, None).await;
        match out.output {
            Some(raw) if out.success => {
                let status = parse_status(&raw);
                ToolOutcome::ok(status, self.logs.clone())
            }
            _ => ToolOutcome::fail(
                out.error
                    .unwrap_or_else(|| ToolFault::new(FaultKind::Io, "git status failed")),
                self.logs.clone(),
            ),
        }
    }

    /// Working-tree diff with per-file added/removed counts.
    pub async fn diff(&mut self, staged: bool) -> ToolOutcome<DiffReport> {
        let mut args = vec!["diff".to_string()];
        if staged {
            args.push("--cached".to_string());
        }
        let out = self.run_git(&args, None).await;
        match out.output {
            Some(raw) if out.success => ToolOutcome::ok(parse_diff(&raw), self.logs.clone()),
            _ => ToolOutcome::fail(
                out.error
                    .unwrap_or_else(|| ToolFault::new(FaultKind::Io, "git diff failed")),
                self.logs.clone(),
            ),
        }
    }

    pub async fn create_branch(
        &mut self,
        name: &str,
        start_point: Option<&str>,
    ) -> ToolOutcome<String> {
        let mut args = vec!["branch".to_string(), name.to_string()];
        if let Some(start) = start_point {
            args.push(start.to_string());
        }
        self.run_git(&args, None).await
    }

    pub async fn checkout(&mut self, target: &str, create: bool) -> ToolOutcome<String> {
        let mut args = vec!["checkout".to_string()];
        if create {
            args.push("-b".to_string());
        }
        args.push(target.to_string());
        self.run_git(&args, None).await
    }

    pub async fn merge(
        &mut self,
        branch: &str,
        no_ff: bool,
        message: Option<&str>,
    ) -> ToolOutcome<String> {
        let mut args = vec!["merge".to_string()];
        if no_ff {
            args.push("--no-ff".to_string());
        }
        if let Some(m) = message {
            args.push("-m".to_string());
            args.push(m.to_string());
        }
        args.push(branch.to_string());
        self.run_git(&args, None).await
    }

    /// Stage everything and commit with the supplied author identity.
    pub async fn commit_all(&mut self, message: &str, author: &Identity) -> ToolOutcome<String> {
        let add = self
            .run_git(&["add".to_string(), "-A".to_string()], None)
            .await;
        if !add.success {
            return add;
        }
        let args = vec![
            "-c".to_string(),
            format!("user.name={}", author.name),
            "-c".to_string(),
            format!("user.email={}", author.email),
            "commit".to_string(),
            "-m".to_string(),
            message.to_string(),
        ];
        self.run_git(&args, None).await
    }
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

fn parse_status(raw: &str) -> RepoStatus {
    let mut status = RepoStatus {
        branch: None,
        staged: Vec::new(),
        unstaged: Vec::new(),
        untracked: Vec::new(),
        raw: raw.to_string(),
    };

    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            let name = rest.split("...").next().unwrap_or(rest);
            status.branch = Some(name.to_string());
            continue;
        }
        if line.len() < 3 {
            continue;
        }
        let mut chars = line.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');
        let path_field = line[2..].trim_start();
        // Renames are reported as "old -> new"; record the new path.
        let path = path_field
            .rsplit(" -> ")
            .next()
            .unwrap_or(path_field)
            .to_string();

        if x == '?' {
            status.untracked.push(path);
            continue;
        }
        if let Some(change) = ChangeKind::from_code(x) {
            status.staged.push(FileEntry {
                path: path.clone(),
                change,
            });
        }
        if let Some(change) = ChangeKind::from_code(y) {
            status.unstaged.push(FileEntry { path, change });
        }
    }
    status
}

fn parse_diff(raw: &str) -> DiffReport {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;

    for line in raw.lines() {
        if line.starts_with("diff --git") {
            if let Some(fd) = current.take() {
                files.push(fd);
            }
            let path = line
                .rsplit(" b/")
                .next()
                .unwrap_or_default()
                .to_string();
            current = Some(FileDiff {
                path,
                additions: 0,
                deletions: 0,
            });
        } else if line.starts_with('+') && !line.starts_with("+++") {
            if let Some(fd) = current.as_mut() {
                fd.additions += 1;
            }
        } else if line.starts_with('-') && !line.starts_with("---") {
            if let Some(fd) = current.as_mut() {
                fd.deletions += 1;
            }
        }
    }
    if let Some(fd) = current.take() {
        files.push(fd);
    }

    let additions = files.iter().map(|f| f.additions).sum();
    let deletions = files.iter().map(|f| f.deletions).sum();
    DiffReport {
        files,
        additions,
        deletions,
        raw: raw.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STATUS_SAMPLE: &str = "\
## main...origin/main
M  staged.rs
 M unstaged.rs
A  brand_new.rs
R  old.rs -> renamed.rs
?? junk.txt
";

    #[test]
    fn parse_status_sections() {
        let status = parse_status(STATUS_SAMPLE);
        assert_eq!(status.branch.as_deref(), Some("main"));
        assert_eq!(status.staged.len(), 3);
        assert_eq!(status.staged[0].path, "staged.rs");
        assert_eq!(status.staged[0].change, ChangeKind::Modified);
        assert_eq!(status.staged[1].change, ChangeKind::Added);
        assert_eq!(status.staged[2].path, "renamed.rs");
        assert_eq!(status.staged[2].change, ChangeKind::Renamed);
        assert_eq!(status.unstaged.len(), 1);
        assert_eq!(status.unstaged[0].path, "unstaged.rs");
        assert_eq!(status.untracked, vec!["junk.txt"]);
        assert!(!status.is_clean());
    }

    #[test]
    fn parse_status_clean_tree() {
        let status = parse_status("## main\n");
        assert!(status.is_clean());
    }

    #[test]
    fn parse_diff_counts_per_file() {
        let raw = "\
diff --git a/one.rs b/one.rs
index 111..222 100644
--- a/one.rs
+++ b/one.rs
@@ -1,2 +1,3 @@
 fn keep() {}
-fn old() {}
+fn new() {}
+fn extra() {}
diff --git a/two.rs b/two.rs
--- a/two.rs
+++ b/two.rs
@@ -1,1 +1,1 @@
-gone
+here
";
        let report = parse_diff(raw);
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files[0].path, "one.rs");
        assert_eq!(report.files[0].additions, 2);
        assert_eq!(report.files[0].deletions, 1);
        assert_eq!(report.files[1].path, "two.rs");
        assert_eq!(report.additions, 3);
        assert_eq!(report.deletions, 2);
    }

    #[test]
    fn parse_diff_empty() {
        let report = parse_diff("");
        assert!(report.files.is_empty());
        assert_eq!(report.additions, 0);
    }

    async fn init_repo(dir: &TempDir) -> GitTool {
        let mut git = GitTool::new(dir.path());
        git.run_git(&["init".to_string(), "-q".to_string()], None)
            .await;
        git
    }

    #[tokio::test]
    async fn status_and_commit_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut git = init_repo(&dir).await;

        std::fs::write(dir.path().join("hello.txt"), "hi\n").unwrap();
        let status = git.status().await;
        assert!(status.success);
        assert_eq!(status.output.unwrap().untracked, vec!["hello.txt"]);

        let author = Identity::new("wavefront", "wavefront@localhost");
        let commit = git.commit_all("add hello", &author).await;
        assert!(commit.success, "commit failed: {:?}", commit.error);

        let status = git.status().await.output.unwrap();
        assert!(status.is_clean());
    }

    #[tokio::test]
    async fn diff_reports_modified_lines() {
        let dir = TempDir::new().unwrap();
        let mut git = init_repo(&dir).await;
        std::fs::write(dir.path().join("file.txt"), "one\ntwo\n").unwrap();
        let author = Identity::new("wavefront", "wavefront@localhost");
        git.commit_all("base", &author).await;

        std::fs::write(dir.path().join("file.txt"), "one\nTWO\nthree\n").unwrap();
        let report = git.diff(false).await;
        assert!(report.success);
        let report = report.output.unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].path, "file.txt");
        assert_eq!(report.additions, 2);
        assert_eq!(report.deletions, 1);
    }

    #[tokio::test]
    async fn commit_in_non_repo_fails_gracefully() {
        let dir = TempDir::new().unwrap();
        let mut git = GitTool::new(dir.path());
        let author = Identity::new("wavefront", "wavefront@localhost");
        let out = git.commit_all("nothing", &author).await;
        assert!(!out.success);
        assert!(out.error.is_some());
    }
}
