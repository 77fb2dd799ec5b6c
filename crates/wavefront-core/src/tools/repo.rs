use super::{FaultKind, ToolFault, ToolOutcome, MAX_CAPTURE_BYTES};
use crate::error::Result;
use crate::patch;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

// ---------------------------------------------------------------------------
// Output records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchAction {
    Applied,
    WouldApply,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchedFile {
    pub path: String,
    pub hunks: usize,
    pub action: PatchAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    pub files: Vec<PatchedFile>,
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// RepoTool
// ---------------------------------------------------------------------------

/// File operations confined to one sandbox root. Every path argument is
/// resolved and checked against the root before any I/O happens.
pub struct RepoTool {
    root: PathBuf,
    logs: Vec<String>,
}

impl RepoTool {
    /// The root must exist; it is canonicalized once so later containment
    /// checks compare like with like.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let root = root
            .canonicalize()
            .map_err(|_| crate::error::WavefrontError::InvalidRoot(root.clone()))?;
        Ok(Self {
            root,
            logs: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.logs.push(message);
    }

    /// Resolve `path` and require it to stay inside the root. `..` segments
    /// are normalized lexically and existing paths are canonicalized, so
    /// both dot-dot traversal and symlink escapes are rejected before I/O.
    fn contain(&self, path: &str) -> std::result::Result<PathBuf, ToolFault> {
        let escape = || {
            ToolFault::new(
                FaultKind::PathEscape,
                format!("path {path:?} is outside the sandbox root"),
            )
        };

        let joined = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.root.join(path)
        };

        let mut normal = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normal.pop() {
                        return Err(escape());
                    }
                }
                Component::CurDir => {}
                other => normal.push(other.as_os_str()),
            }
        }

        let checked = if normal.exists() {
            normal
                .canonicalize()
                .map_err(|e| ToolFault::new(FaultKind::Io, e.to_string()))?
        } else {
            normal
        };

        if checked.starts_with(&self.root) {
            Ok(checked)
        } else {
            Err(escape())
        }
    }

    /// Read a file inside the root, bounded at 1 MiB.
    pub fn read(&mut self, path: &str) -> ToolOutcome<FileContent> {
        self.log(format!("repo.read: {path}"));
        let resolved = match self.contain(path) {
            Ok(p) => p,
            Err(fault) => return ToolOutcome::fail(fault, self.logs.clone()),
        };

        let metadata = match std::fs::metadata(&resolved) {
            Ok(m) => m,
            Err(e) => {
                return ToolOutcome::fail(
                    ToolFault::new(FaultKind::Io, format!("cannot read {path}: {e}")),
                    self.logs.clone(),
                )
            }
        };
        if !metadata.is_file() {
            return ToolOutcome::fail(
                ToolFault::new(FaultKind::Io, format!("not a file: {path}")),
                self.logs.clone(),
            );
        }
        if metadata.len() > MAX_CAPTURE_BYTES as u64 {
            return ToolOutcome::fail(
                ToolFault::new(
                    FaultKind::TooLarge,
                    format!(
                        "file too large: {} bytes (max {MAX_CAPTURE_BYTES})",
                        metadata.len()
                    ),
                ),
                self.logs.clone(),
            );
        }

        match std::fs::read_to_string(&resolved) {
            Ok(content) => {
                let lines = content.lines().count();
                ToolOutcome::ok(
                    FileContent {
                        path: path.to_string(),
                        content,
                        lines,
                    },
                    self.logs.clone(),
                )
            }
            Err(e) => ToolOutcome::fail(
                ToolFault::new(FaultKind::Io, format!("cannot read {path}: {e}")),
                self.logs.clone(),
            ),
        }
    }

    /// Parse and apply a unified-diff blob against files under the root.
    ///
    /// All file patches are validated in memory first; nothing is written
    /// unless every hunk of every file applies cleanly. With `dry_run` the
    /// validated file/hunk counts are reported and no file is touched.
    pub fn apply_patch(&mut self, patch_text: &str, dry_run: bool) -> ToolOutcome<PatchReport> {
        self.log(format!("repo.apply_patch: dry_run={dry_run}"));

        let file_patches = match patch::parse(patch_text) {
            Ok(fps) => fps,
            Err(e) => {
                return ToolOutcome::fail(
                    ToolFault::new(FaultKind::Parse, e.to_string()),
                    self.logs.clone(),
                )
            }
        };
        if file_patches.is_empty() {
            return ToolOutcome::fail(
                ToolFault::new(FaultKind::Parse, "no file sections found in patch"),
                self.logs.clone(),
            );
        }

        let mut staged: Vec<(PathBuf, String, &patch::FilePatch)> = Vec::new();
        for fp in &file_patches {
            let resolved = match self.contain(&fp.path) {
                Ok(p) => p,
                Err(fault) => return ToolOutcome::fail(fault, self.logs.clone()),
            };
            let original = if resolved.exists() {
                match std::fs::read_to_string(&resolved) {
                    Ok(text) => text,
                    Err(e) => {
                        return ToolOutcome::fail(
                            ToolFault::new(FaultKind::Io, format!("cannot read {}: {e}", fp.path)),
                            self.logs.clone(),
                        )
                    }
                }
            } else {
                String::new()
            };
            let patched = match patch::apply(&original, fp) {
                Ok(text) => text,
                Err(e) => {
                    return ToolOutcome::fail(
                        ToolFault::new(FaultKind::Parse, e.to_string()),
                        self.logs.clone(),
                    )
                }
            };
            staged.push((resolved, patched, fp));
        }

        let mut files = Vec::with_capacity(staged.len());
        for (resolved, patched, fp) in staged {
            let action = if dry_run {
                PatchAction::WouldApply
            } else {
                if let Some(parent) = resolved.parent() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        return ToolOutcome::fail(
                            ToolFault::new(FaultKind::Io, e.to_string()),
                            self.logs.clone(),
                        );
                    }
                }
                if let Err(e) = std::fs::write(&resolved, patched) {
                    return ToolOutcome::fail(
                        ToolFault::new(FaultKind::Io, e.to_string()),
                        self.logs.clone(),
                    );
                }
                PatchAction::Applied
            };
            files.push(PatchedFile {
                path: fp.path.clone(),
                hunks: fp.hunks.len(),
                action,
            });
        }

        self.log(format!("repo.apply_patch: {} file(s)", files.len()));
        ToolOutcome::ok(PatchReport { files, dry_run }, self.logs.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo(dir: &TempDir) -> RepoTool {
        RepoTool::new(dir.path()).unwrap()
    }

    #[test]
    fn new_rejects_missing_root() {
        assert!(RepoTool::new("/nonexistent/sandbox/root").is_err());
    }

    #[test]
    fn read_inside_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        let out = repo(&dir).read("a.txt");
        assert!(out.success);
        let content = out.output.unwrap();
        assert_eq!(content.content, "one\ntwo\n");
        assert_eq!(content.lines, 2);
    }

    #[test]
    fn read_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let out = repo(&dir).read("../../etc/passwd");
        assert!(!out.success);
        assert_eq!(out.fault_kind(), Some(FaultKind::PathEscape));
    }

    #[test]
    fn read_rejects_absolute_path_outside_root() {
        let dir = TempDir::new().unwrap();
        let out = repo(&dir).read("/etc/passwd");
        assert!(!out.success);
        assert_eq!(out.fault_kind(), Some(FaultKind::PathEscape));
    }

    #[test]
    fn read_allows_interior_dotdot() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("top.txt"), "top\n").unwrap();
        let out = repo(&dir).read("sub/../top.txt");
        assert!(out.success);
    }

    #[test]
    fn read_rejects_oversized_file() {
        let dir = TempDir::new().unwrap();
        let big = vec![b'x'; MAX_CAPTURE_BYTES + 1];
        std::fs::write(dir.path().join("big.bin"), big).unwrap();
        let out = repo(&dir).read("big.bin");
        assert!(!out.success);
        assert_eq!(out.fault_kind(), Some(FaultKind::TooLarge));
    }

    const PATCH: &str = "\
--- a/hello.txt
+++ b/hello.txt
@@ -1,2 +1,2 @@
 hello
-old
+new
";

    #[test]
    fn apply_patch_rewrites_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello\nold\n").unwrap();
        let out = repo(&dir).apply_patch(PATCH, false);
        assert!(out.success, "patch failed: {:?}", out.error);
        let report = out.output.unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].action, PatchAction::Applied);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
            "hello\nnew\n"
        );
    }

    #[test]
    fn dry_run_reports_without_mutating() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello\nold\n").unwrap();
        let out = repo(&dir).apply_patch(PATCH, true);
        assert!(out.success);
        let report = out.output.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.files[0].action, PatchAction::WouldApply);
        assert_eq!(report.files[0].hunks, 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
            "hello\nold\n"
        );
    }

    #[test]
    fn apply_patch_creates_new_file() {
        let dir = TempDir::new().unwrap();
        let blob = "\
--- /dev/null
+++ b/fresh.txt
@@ -0,0 +1,1 @@
+content
";
        let out = repo(&dir).apply_patch(blob, false);
        assert!(out.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("fresh.txt")).unwrap(),
            "content\n"
        );
    }

    #[test]
    fn apply_patch_rejects_escaping_target() {
        let dir = TempDir::new().unwrap();
        let blob = "\
--- a/../outside.txt
+++ b/../outside.txt
@@ -0,0 +1,1 @@
+nope
";
        let out = repo(&dir).apply_patch(blob, false);
        assert!(!out.success);
        assert_eq!(out.fault_kind(), Some(FaultKind::PathEscape));
    }

    #[test]
    fn apply_patch_is_atomic_on_mismatch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello\nold\n").unwrap();
        std::fs::write(dir.path().join("other.txt"), "unexpected\n").unwrap();
        let blob = format!(
            "{PATCH}\
--- a/other.txt
+++ b/other.txt
@@ -1,1 +1,1 @@
-expected
+changed
"
        );
        let out = repo(&dir).apply_patch(&blob, false);
        assert!(!out.success);
        // First file must be untouched even though its own hunks were valid.
        assert_eq!(
            std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
            "hello\nold\n"
        );
    }

    #[test]
    fn apply_patch_rejects_empty_blob() {
        let dir = TempDir::new().unwrap();
        let out = repo(&dir).apply_patch("just some text\n", false);
        assert!(!out.success);
        assert_eq!(out.fault_kind(), Some(FaultKind::Parse));
    }
}
