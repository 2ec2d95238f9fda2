//! Engine error taxonomy
//!
//! Every failure the engine can surface maps to one `EngineError` variant.
//! `kind()` yields the stable string carried by `ProgressEvent::Error`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the history engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Not a git repository: {}", .0.display())]
    NotAGitRepository(PathBuf),

    #[error("Repository at {} is corrupted: {message}", .path.display())]
    Corrupted { path: PathBuf, message: String },

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Object {oid} could not be read: {message}")]
    CorruptedObject { oid: String, message: String },

    #[error("Diff failed for commit {oid}: {message}")]
    DiffFailure { oid: String, message: String },

    #[error("External tool exited with {}: {stderr}", describe_exit(.exit_code))]
    ExternalToolError {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Raised at a batch boundary once the cancellation token is set
    #[error("Session cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed or timed out)".to_string(),
    }
}

impl EngineError {
    /// Stable identifier used in `Error { kind, .. }` events.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::PathNotFound(_) => "PathNotFound",
            EngineError::NotAGitRepository(_) => "NotAGitRepository",
            EngineError::Corrupted { .. } => "Corrupted",
            EngineError::BranchNotFound(_) => "BranchNotFound",
            EngineError::CorruptedObject { .. } => "CorruptedObject",
            EngineError::DiffFailure { .. } => "DiffFailure",
            EngineError::ExternalToolError { .. } => "ExternalToolError",
            EngineError::Unsupported(_) => "Unsupported",
            EngineError::InvalidArgument(_) => "InvalidArgument",
            EngineError::Cancelled => "Cancelled",
            EngineError::TaskFailed(_) => "Internal",
            // libgit2 failures mid-walk mean an object could not be produced
            EngineError::Git(_) => "CorruptedObject",
            EngineError::Io(_) => "Io",
        }
    }

    /// Wrap a git2 error that occurred while reading a specific object.
    pub fn corrupted_object(oid: impl ToString, err: git2::Error) -> Self {
        EngineError::CorruptedObject {
            oid: oid.to_string(),
            message: err.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_taxonomy() {
        assert_eq!(EngineError::BranchNotFound("x".into()).kind(), "BranchNotFound");
        assert_eq!(
            EngineError::PathNotFound(PathBuf::from("/nope")).kind(),
            "PathNotFound"
        );
        assert_eq!(
            EngineError::ExternalToolError {
                exit_code: Some(1),
                stderr: String::new()
            }
            .kind(),
            "ExternalToolError"
        );
        assert_eq!(EngineError::Cancelled.kind(), "Cancelled");
    }

    #[test]
    fn test_external_tool_message_includes_status() {
        let err = EngineError::ExternalToolError {
            exit_code: Some(128),
            stderr: "fatal: bad revision".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("128"));
        assert!(msg.contains("bad revision"));
    }
}
