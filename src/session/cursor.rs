//! Resume points for incremental loading
//!
//! After a session completes, its window (`skip`, `loaded`) is remembered per
//! repository and branch. A later request for a longer window of the same walk
//! only pulls the commits it has not seen yet.

use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use crate::git::WalkOrder;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorKey {
    /// Canonical `.git` directory, so `/repo` and `/repo/` share a cursor
    pub repo_path: PathBuf,
    pub branch: String,
}

/// Where a completed walk stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCursor {
    pub repo_path: PathBuf,
    pub branch: String,
    pub order: WalkOrder,
    /// `skip` of the load that opened this window
    pub skip: usize,
    /// Commits delivered so far, counted from `skip`
    pub loaded: usize,
    /// Branch tip the window was walked from
    pub tip: String,
}

impl LoadCursor {
    pub fn key(&self) -> CursorKey {
        CursorKey {
            repo_path: self.repo_path.clone(),
            branch: self.branch.clone(),
        }
    }

    /// Whether a request for `(order, skip, limit)` at `tip` can pick up here.
    ///
    /// `limit == 0` asks for everything and always extends the window.
    pub fn can_continue(&self, order: WalkOrder, skip: usize, limit: usize, tip: &str) -> bool {
        self.order == order
            && self.skip == skip
            && self.tip == tip
            && (limit == 0 || limit > self.loaded)
    }
}

/// How a session will produce its commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPlan {
    /// Walk the requested window from scratch
    Full,
    /// Skip past commits the cursor already delivered
    Continue(LoadCursor),
}

impl LoadPlan {
    /// Walker window `(skip, limit)` and the count already delivered.
    pub fn window(&self, skip: usize, limit: usize) -> (usize, usize, usize) {
        match self {
            LoadPlan::Full => (skip, limit, 0),
            LoadPlan::Continue(cursor) => {
                let remaining = if limit == 0 {
                    0
                } else {
                    limit.saturating_sub(cursor.loaded)
                };
                (cursor.skip + cursor.loaded, remaining, cursor.loaded)
            }
        }
    }
}

/// At most one cursor per (repository, branch).
///
/// A cursor is checked out by the session that plans with it and only comes
/// back if that session completes. Cursors for other branches are untouched.
#[derive(Debug, Default)]
pub struct CursorStore {
    cursors: DashMap<CursorKey, LoadCursor>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the cursor for `key` and decide how to serve the request.
    ///
    /// The stored cursor is removed either way: a continuing session owns it
    /// now, and one that cannot continue is stale.
    pub fn checkout(
        &self,
        key: &CursorKey,
        order: WalkOrder,
        skip: usize,
        limit: usize,
        tip: &str,
    ) -> LoadPlan {
        match self.cursors.remove(key) {
            Some((_, cursor)) if cursor.can_continue(order, skip, limit, tip) => {
                debug!(
                    "Continuing {} from {} loaded commits",
                    cursor.branch, cursor.loaded
                );
                LoadPlan::Continue(cursor)
            }
            Some((_, cursor)) => {
                debug!("Discarding cursor for {} (window changed)", cursor.branch);
                LoadPlan::Full
            }
            None => LoadPlan::Full,
        }
    }

    pub fn store(&self, cursor: LoadCursor) {
        self.cursors.insert(cursor.key(), cursor);
    }

    pub fn get(&self, key: &CursorKey) -> Option<LoadCursor> {
        self.cursors.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}
