//! Tree-to-tree diff statistics
//!
//! Every commit is diffed against its primary parent (`parents[0]`); root
//! commits against the empty tree. Line counts come from libgit2 patches, not
//! from parsing textual diff output, so file content that looks like diff
//! markers is counted like any other line.

use git2::{Delta, DiffFindOptions, DiffOptions, Oid, Patch, Repository};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::git::repository::RepoHandle;
use crate::git::walker::{CommitWalk, WalkOrder};
use crate::models::{Commit, FileChange, FileStatus, Stats};

/// Commits diffed per rayon round in [`enrich_history`]
const ENRICH_CHUNK: usize = 256;

/// Result of diffing one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitDiff {
    pub stats: Stats,
    pub files: Vec<FileChange>,
}

/// Diff a commit against its primary parent.
///
/// Any failure is reported as [`EngineError::DiffFailure`] so callers can
/// isolate it to this commit.
pub fn diff_commit(repo: &Repository, oid: Oid) -> EngineResult<CommitDiff> {
    diff_commit_inner(repo, oid).map_err(|e| EngineError::DiffFailure {
        oid: oid.to_string(),
        message: e.message().to_string(),
    })
}

fn diff_commit_inner(repo: &Repository, oid: Oid) -> Result<CommitDiff, git2::Error> {
    let commit = repo.find_commit(oid)?;
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let mut opts = DiffOptions::new();
    opts.include_typechange(true);
    let mut diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

    let mut find = DiffFindOptions::new();
    find.renames(true);
    diff.find_similar(Some(&mut find))?;

    let mut result = CommitDiff::default();
    for idx in 0..diff.deltas().len() {
        let Some(delta) = diff.get_delta(idx) else {
            continue;
        };
        let Some(status) = map_status(delta.status()) else {
            continue;
        };

        let new_path = delta.new_file().path().map(|p| p.to_string_lossy().into_owned());
        let old_path = delta.old_file().path().map(|p| p.to_string_lossy().into_owned());
        let path = match status {
            FileStatus::Deleted => old_path.clone(),
            _ => new_path.clone(),
        }
        .unwrap_or_default();
        let old_path = match status {
            FileStatus::Renamed | FileStatus::Copied => old_path.filter(|old| *old != path),
            _ => None,
        };

        let (additions, deletions, binary) = match Patch::from_diff(&diff, idx)? {
            Some(patch) if patch.delta().flags().is_binary() => (0, 0, true),
            Some(patch) => {
                let (_context, additions, deletions) = patch.line_stats()?;
                (additions, deletions, false)
            }
            // libgit2 produces no patch for binary content; a pure rename has none either
            None => (0, 0, !matches!(status, FileStatus::Renamed | FileStatus::Copied)),
        };

        result.stats.additions += additions;
        result.stats.deletions += deletions;
        result.stats.files_count += 1;
        result.files.push(FileChange {
            path,
            old_path,
            status,
            additions,
            deletions,
            binary,
        });
    }

    Ok(result)
}

fn map_status(delta: Delta) -> Option<FileStatus> {
    match delta {
        Delta::Added => Some(FileStatus::Added),
        Delta::Deleted => Some(FileStatus::Deleted),
        Delta::Modified => Some(FileStatus::Modified),
        Delta::Renamed => Some(FileStatus::Renamed),
        Delta::Copied => Some(FileStatus::Copied),
        Delta::Typechange => Some(FileStatus::TypeChanged),
        // Unmodified, ignored, untracked and conflicted never appear tree-to-tree
        _ => None,
    }
}

/// Diff a batch of commits in parallel and attach the results in place.
///
/// Each rayon worker opens its own repository. A commit whose diff fails keeps
/// `stats = None` and is logged; the rest of the batch is unaffected. Returns
/// the number of failed commits.
pub fn annotate_commits(handle: &RepoHandle, commits: &mut [Commit], include_files: bool) -> usize {
    let results: Vec<EngineResult<CommitDiff>> = commits
        .par_iter()
        .map_init(
            || handle.open_repo(),
            |repo, commit| {
                let oid = Oid::from_str(&commit.hash).map_err(|e| EngineError::DiffFailure {
                    oid: commit.hash.clone(),
                    message: e.message().to_string(),
                })?;
                match repo {
                    Ok(repo) => diff_commit(repo, oid),
                    Err(e) => Err(EngineError::DiffFailure {
                        oid: commit.hash.clone(),
                        message: e.to_string(),
                    }),
                }
            },
        )
        .collect();

    let mut failures = 0;
    for (commit, result) in commits.iter_mut().zip(results) {
        match result {
            Ok(diff) => {
                commit.stats = Some(diff.stats);
                if include_files {
                    commit.files = Some(diff.files);
                }
            }
            Err(e) => {
                failures += 1;
                warn!("Skipping stats for {}: {}", commit.short_hash(), e);
            }
        }
    }
    failures
}

/// Walk `start_ref` and attach stats to every commit, without streaming.
///
/// `limit == 0` walks the whole history. Used for the background enrichment
/// pass that follows a fast, stats-free load.
pub fn enrich_history(
    handle: &RepoHandle,
    start_ref: &str,
    order: WalkOrder,
    limit: usize,
    include_files: bool,
) -> EngineResult<Vec<Commit>> {
    let repo = handle.open_repo()?;
    let mut walk = CommitWalk::from_ref(&repo, start_ref, order, 0, limit)?;

    let mut commits = Vec::new();
    let mut failures = 0;
    loop {
        let mut chunk = walk.next_batch(ENRICH_CHUNK)?;
        if chunk.is_empty() {
            break;
        }
        failures += annotate_commits(handle, &mut chunk, include_files);
        commits.extend(chunk);
    }

    debug!(
        "Enriched {} commits from {} ({} without stats)",
        commits.len(),
        start_ref,
        failures
    );
    Ok(commits)
}
