//! Core data models for gitpulse
//!
//! Commits and branches are re-derived from the object database on every
//! session and never written back. Field names serialize in camelCase since
//! the event stream is consumed by presentation layers outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::EngineError;
use crate::git::WalkOrder;

/// Line-level statistics for one commit against its primary parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub additions: usize,
    pub deletions: usize,
    pub files_count: usize,
}

/// How a file changed between two trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    TypeChanged,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            FileStatus::Added => "A",
            FileStatus::Deleted => "D",
            FileStatus::Modified => "M",
            FileStatus::Renamed => "R",
            FileStatus::Copied => "C",
            FileStatus::TypeChanged => "T",
        };
        write!(f, "{}", letter)
    }
}

/// A single changed file within a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    /// Previous path for renames and copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub status: FileStatus,
    pub additions: usize,
    pub deletions: usize,
    #[serde(default)]
    pub binary: bool,
}

/// A commit as read from the object database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    /// Full 40-character object id
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_at: DateTime<Utc>,
    /// First line of the message
    pub summary: String,
    /// Subject plus body, present only when a body exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Parent hashes in recorded order; parents[0] is the primary parent
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Ranked branch attribution, best candidate first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileChange>>,
}

impl Commit {
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(12)]
    }

    pub fn primary_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

/// A local or remote-tracking branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    /// Short name (`feature/x`, `origin/main`)
    pub name: String,
    pub is_current: bool,
    pub is_remote: bool,
    /// Hash of the commit the branch points at
    pub tip: String,
}

/// Parameters of one load operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub repo_path: PathBuf,
    /// Defaults to the branch HEAD resolves to
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub skip: usize,
    /// 0 = walk to the root
    #[serde(default)]
    pub limit: usize,
    /// Defaults to `[load] include_files`
    #[serde(default)]
    pub include_files: Option<bool>,
    #[serde(default)]
    pub include_branches: bool,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub order: Option<WalkOrder>,
}

impl LoadRequest {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            branch: None,
            skip: 0,
            limit: 0,
            include_files: None,
            include_branches: false,
            batch_size: None,
            order: None,
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn include_files(mut self, include: bool) -> Self {
        self.include_files = Some(include);
        self
    }

    pub fn include_branches(mut self, include: bool) -> Self {
        self.include_branches = include;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn order(mut self, order: WalkOrder) -> Self {
        self.order = Some(order);
        self
    }
}

/// Events streamed by a load session.
///
/// One session emits exactly one `Start`, any number of `Data`, then one of
/// `End` or `Error`. A cancelled session simply stops after its last `Data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        branches: Vec<Branch>,
        total_estimate: usize,
    },
    #[serde(rename_all = "camelCase")]
    Data {
        commits: Vec<Commit>,
        batch_index: usize,
        is_file_data_included: bool,
    },
    #[serde(rename_all = "camelCase")]
    End { total_loaded: usize },
    Error { kind: String, message: String },
}

impl ProgressEvent {
    pub fn error(err: &EngineError) -> Self {
        ProgressEvent::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::End { .. } | ProgressEvent::Error { .. })
    }
}
