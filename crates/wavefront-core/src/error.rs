use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavefrontError {
    #[error("invalid repository root: {0}")]
    InvalidRoot(PathBuf),

    #[error("ticket not found: {0}")]
    TicketNotFound(String),

    #[error("duplicate ticket id: {0}")]
    DuplicateTicket(String),

    #[error("ticket id must not be empty")]
    EmptyTicketId,

    #[error("invalid ticket status: {0}")]
    InvalidStatus(String),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("malformed patch at line {line}: {message}")]
    PatchParse { line: usize, message: String },

    #[error("patch does not apply to {path} at line {line}: expected {expected:?}, found {found:?}")]
    HunkMismatch {
        path: String,
        line: usize,
        expected: String,
        found: String,
    },

    #[error("worker fault: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WavefrontError>;
