//! Git object database access
//!
//! Reads history straight from the repository with libgit2; nothing in this
//! module shells out to a `git` binary.
//!
//! # Features
//!
//! - Open and validate repositories, shareable across threads
//! - Enumerate local and remote branches, resolve HEAD
//! - Walk commits in topological or date order with cheap skip/limit windows
//! - Diff each commit against its primary parent for line and file stats
//! - Rank which branch a commit most plausibly belongs to
//!
//! # Example
//!
//! ```no_run
//! use gitpulse::git::{CommitWalk, RepoHandle, WalkOrder};
//!
//! let handle = RepoHandle::open("/path/to/repo").unwrap();
//! let repo = handle.open_repo().unwrap();
//! for commit in CommitWalk::from_ref(&repo, "main", WalkOrder::Topological, 0, 20).unwrap() {
//!     println!("{}", commit.unwrap().summary);
//! }
//! ```

pub mod attribution;
pub mod branches;
pub mod diff;
pub mod repository;
pub mod tags;
pub mod walker;

pub use attribution::{
    attribute_branches, AttributionTier, BranchAttributor, BranchCandidate, DEFAULT_TRUNK_NAMES,
};
pub use branches::{default_branch, list_branches, resolve_branch, ResolvedRef, DETACHED_HEAD};
pub use diff::{annotate_commits, diff_commit, enrich_history, CommitDiff};
pub use repository::RepoHandle;
pub use tags::TagIndex;
pub use walker::{
    commit_info, estimate_commit_count, read_commit, resolve_commit, CommitWalk, WalkOrder,
};
