//! Per-worker isolated working copies.
//!
//! A sandbox is a disposable copy of the reference workspace, created under a
//! uniquely named temp directory so concurrent provisioning never collides.
//! Version-control internals and generated-artifact directories are excluded;
//! a small set of dotfiles needed for correct tool behavior passes through.
//! Teardown is explicit and idempotent; `Drop` is only a backstop.

use crate::error::{Result, WavefrontError};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Directories never copied into a sandbox, at any depth.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    "venv",
    ".venv",
    "env",
];

/// Dotfiles copied despite the hidden-file rule.
pub const PASSTHROUGH_DOTFILES: &[&str] = &[".gitignore", ".gitattributes"];

// ---------------------------------------------------------------------------
// SandboxHandle
// ---------------------------------------------------------------------------

/// Cheap handle passed to a unit of work. The owning [`Sandbox`] stays with
/// the executor, which guarantees teardown on every exit path.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxHandle {
    pub worker_id: String,
    pub root: PathBuf,
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Sandbox {
    worker_id: String,
    root: PathBuf,
    removed: bool,
}

impl Sandbox {
    /// Copy `source` into a fresh isolated directory keyed by `worker_id`.
    pub fn provision(source: &Path, worker_id: &str) -> Result<Sandbox> {
        if !source.is_dir() {
            return Err(WavefrontError::InvalidRoot(source.to_path_buf()));
        }
        let root = tempfile::Builder::new()
            .prefix(&format!("wavefront-{worker_id}-"))
            .tempdir()?
            .into_path();

        tracing::debug!(worker = worker_id, sandbox = %root.display(), "provisioning sandbox");
        if let Err(e) = copy_tree(source, &root) {
            // Don't leak a half-built tree on copy failure.
            let _ = std::fs::remove_dir_all(&root);
            return Err(WavefrontError::Sandbox(format!(
                "failed to copy workspace: {e}"
            )));
        }
        Ok(Sandbox {
            worker_id: worker_id.to_string(),
            root,
            removed: false,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn handle(&self) -> SandboxHandle {
        SandboxHandle {
            worker_id: self.worker_id.clone(),
            root: self.root.clone(),
        }
    }

    /// Remove the entire isolated tree. Safe to call more than once.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        self.removed = true;
        tracing::debug!(worker = %self.worker_id, "sandbox removed");
        Ok(())
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if EXCLUDED_DIRS.contains(&name_str.as_ref()) || name_str.starts_with('.') {
                continue;
            }
            copy_tree(&entry.path(), &dst.join(&name))?;
        } else if file_type.is_file() {
            if name_str.starts_with('.') && !PASSTHROUGH_DOTFILES.contains(&name_str.as_ref()) {
                continue;
            }
            std::fs::copy(entry.path(), dst.join(&name))?;
        }
        // Symlinks are not carried into sandboxes.
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target\n").unwrap();
        std::fs::write(dir.path().join(".env"), "SECRET=1\n").unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        dir
    }

    #[test]
    fn provision_copies_sources_and_passthrough_dotfiles() {
        let ws = workspace();
        let mut sb = Sandbox::provision(ws.path(), "W1").unwrap();
        assert!(sb.root().join("main.rs").exists());
        assert!(sb.root().join("src/lib.rs").exists());
        assert!(sb.root().join(".gitignore").exists());
        sb.cleanup().unwrap();
    }

    #[test]
    fn provision_excludes_vcs_and_artifact_dirs() {
        let ws = workspace();
        let mut sb = Sandbox::provision(ws.path(), "W1").unwrap();
        assert!(!sb.root().join(".git").exists());
        assert!(!sb.root().join("node_modules").exists());
        assert!(!sb.root().join(".env").exists());
        sb.cleanup().unwrap();
    }

    #[test]
    fn concurrent_provisioning_gets_distinct_roots() {
        let ws = workspace();
        let mut a = Sandbox::provision(ws.path(), "W1").unwrap();
        let mut b = Sandbox::provision(ws.path(), "W1").unwrap();
        assert_ne!(a.root(), b.root());
        a.cleanup().unwrap();
        b.cleanup().unwrap();
    }

    #[test]
    fn cleanup_is_idempotent() {
        let ws = workspace();
        let mut sb = Sandbox::provision(ws.path(), "W2").unwrap();
        let root = sb.root().to_path_buf();
        sb.cleanup().unwrap();
        assert!(!root.exists());
        // Second call must not error.
        sb.cleanup().unwrap();
    }

    #[test]
    fn mutations_do_not_touch_the_source() {
        let ws = workspace();
        let mut sb = Sandbox::provision(ws.path(), "W3").unwrap();
        std::fs::write(sb.root().join("main.rs"), "fn main() { changed(); }\n").unwrap();
        let original = std::fs::read_to_string(ws.path().join("main.rs")).unwrap();
        assert_eq!(original, "fn main() {}\n");
        sb.cleanup().unwrap();
    }

    #[test]
    fn provision_rejects_missing_source() {
        let err = Sandbox::provision(Path::new("/nonexistent/workspace"), "W1").unwrap_err();
        assert!(matches!(err, WavefrontError::InvalidRoot(_)));
    }

    #[test]
    fn drop_removes_unclaimed_tree() {
        let ws = workspace();
        let root = {
            let sb = Sandbox::provision(ws.path(), "W4").unwrap();
            sb.root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
