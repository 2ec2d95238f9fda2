//! Commit graph walker
//!
//! A `CommitWalk` is a lazy, finite, single-use iterator over the commits
//! reachable from a start point. Skipped commits only advance the revwalk's
//! oid stream; their objects are never loaded. The walker knows nothing about
//! sessions or cancellation so it can be reused for one-shot passes.

use chrono::{DateTime, TimeZone, Utc};
use git2::{Oid, Repository, Revwalk, Sort};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::Commit;

/// Order in which commits are produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkOrder {
    /// Children before parents, ties broken by commit time (newest first)
    #[default]
    Topological,
    /// Commit time only, newest first
    Date,
}

impl WalkOrder {
    fn sorting(self) -> Sort {
        match self {
            WalkOrder::Topological => Sort::TOPOLOGICAL | Sort::TIME,
            WalkOrder::Date => Sort::TIME,
        }
    }
}

impl std::str::FromStr for WalkOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topological" | "topo" => Ok(WalkOrder::Topological),
            "date" | "time" => Ok(WalkOrder::Date),
            other => Err(format!("unknown walk order '{}'", other)),
        }
    }
}

pub struct CommitWalk<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
    pending_skip: usize,
    /// `None` walks to the root
    remaining: Option<usize>,
    done: bool,
}

impl<'repo> CommitWalk<'repo> {
    /// Walk from `start`. `limit == 0` means no bound.
    pub fn new(
        repo: &'repo Repository,
        start: Oid,
        order: WalkOrder,
        skip: usize,
        limit: usize,
    ) -> EngineResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(order.sorting())?;
        revwalk
            .push(start)
            .map_err(|e| EngineError::corrupted_object(start, e))?;

        Ok(Self {
            repo,
            revwalk,
            pending_skip: skip,
            remaining: (limit > 0).then_some(limit),
            done: false,
        })
    }

    /// Walk from any revision expression (`main`, `origin/x`, a hash, `HEAD~3`).
    pub fn from_ref(
        repo: &'repo Repository,
        start_ref: &str,
        order: WalkOrder,
        skip: usize,
        limit: usize,
    ) -> EngineResult<Self> {
        let start = repo
            .revparse_single(start_ref)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| EngineError::BranchNotFound(start_ref.to_string()))?
            .id();
        Self::new(repo, start, order, skip, limit)
    }

    /// Pull up to `size` commits. An empty batch means the walk is exhausted.
    pub fn next_batch(&mut self, size: usize) -> EngineResult<Vec<Commit>> {
        let mut batch = Vec::with_capacity(size);
        while batch.len() < size {
            match self.next() {
                Some(commit) => batch.push(commit?),
                None => break,
            }
        }
        Ok(batch)
    }

    fn skip_prefix(&mut self) -> EngineResult<()> {
        while self.pending_skip > 0 {
            self.pending_skip -= 1;
            match self.revwalk.next() {
                Some(oid) => {
                    oid?;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        Ok(())
    }
}

impl Iterator for CommitWalk<'_> {
    type Item = EngineResult<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        if let Err(e) = self.skip_prefix() {
            self.done = true;
            return Some(Err(e));
        }
        if self.done {
            return None;
        }

        let oid = match self.revwalk.next()? {
            Ok(oid) => oid,
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        };
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }

        let commit = read_commit(self.repo, oid);
        if commit.is_err() {
            self.done = true;
        }
        Some(commit)
    }
}

/// Resolve a hash or revision expression to a commit id.
pub fn resolve_commit(repo: &Repository, rev: &str) -> EngineResult<Oid> {
    repo.revparse_single(rev)
        .and_then(|obj| obj.peel_to_commit())
        .map(|commit| commit.id())
        .map_err(|e| EngineError::CorruptedObject {
            oid: rev.to_string(),
            message: e.message().to_string(),
        })
}

/// Load one commit's metadata.
pub fn read_commit(repo: &Repository, oid: Oid) -> EngineResult<Commit> {
    let commit = repo
        .find_commit(oid)
        .map_err(|e| EngineError::corrupted_object(oid, e))?;
    Ok(commit_info(&commit))
}

/// Convert a git2 commit into the engine's model (no stats, tags or branches).
pub fn commit_info(commit: &git2::Commit) -> Commit {
    let author = commit.author();
    let raw = String::from_utf8_lossy(commit.message_bytes());
    let full = raw.trim_end();
    let summary = full.lines().next().unwrap_or("").trim().to_string();
    let has_body = full.lines().skip(1).any(|line| !line.trim().is_empty());

    Commit {
        hash: commit.id().to_string(),
        author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
        author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
        authored_at: git_time(&author.when()),
        summary,
        message: has_body.then(|| full.to_string()),
        parents: commit.parent_ids().map(|id| id.to_string()).collect(),
        tags: None,
        branches: None,
        stats: None,
        files: None,
    }
}

fn git_time(time: &git2::Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.seconds(), 0)
        .single()
        .unwrap_or_default()
}

/// Approximate history length below `start`, counting at most `cap` commits.
///
/// Only oids are touched and no sorting is requested, so this is far cheaper
/// than a real walk. A result equal to `cap` is a lower bound.
pub fn estimate_commit_count(repo: &Repository, start: Oid, cap: usize) -> EngineResult<usize> {
    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::NONE)?;
    revwalk.push(start)?;
    let limit = if cap == 0 { usize::MAX } else { cap };
    let mut count = 0;
    for oid in revwalk.take(limit) {
        oid?;
        count += 1;
    }
    Ok(count)
}
