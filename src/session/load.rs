//! One streaming load, driven as a state machine

use git2::Oid;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use super::cursor::{CursorKey, CursorStore, LoadCursor, LoadPlan};
use super::sink::EventSink;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::git::{
    annotate_commits, estimate_commit_count, list_branches, resolve_branch, BranchAttributor,
    CommitWalk, RepoHandle, TagIndex,
};
use crate::models::{Commit, LoadRequest, ProgressEvent};

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Emitting,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SessionOutcome {
    #[serde(rename_all = "camelCase")]
    Completed { total_loaded: usize },
    /// `emitted` counts commits delivered in `Data` events before stopping
    Cancelled { emitted: usize },
    Failed { kind: String, message: String },
}

pub struct LoadSession {
    id: SessionId,
    request: LoadRequest,
    config: EngineConfig,
    cursors: Arc<CursorStore>,
    token: CancellationToken,
    state: SessionState,
    emitted: usize,
}

impl LoadSession {
    pub fn new(
        id: impl Into<SessionId>,
        request: LoadRequest,
        config: &EngineConfig,
        cursors: Arc<CursorStore>,
        token: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            request,
            config: config.clone(),
            cursors,
            token,
            state: SessionState::Idle,
            emitted: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run the load to a terminal state, delivering events to `sink`.
    ///
    /// Events arrive as `Start, Data*` followed by `End` (completed), `Error`
    /// (failed) or nothing (cancelled). A session runs once; a second call
    /// returns `Failed` without touching the sink.
    pub fn run(&mut self, sink: &mut dyn EventSink) -> SessionOutcome {
        if self.state != SessionState::Idle {
            warn!("Session {} already ran ({:?})", self.id, self.state);
            return SessionOutcome::Failed {
                kind: "Internal".to_string(),
                message: format!("session already {:?}", self.state),
            };
        }

        self.transition(SessionState::Starting);
        match self.execute(sink) {
            Ok(outcome) => outcome,
            Err(EngineError::Cancelled) => {
                info!("Session {} cancelled after {} commits", self.id, self.emitted);
                self.transition(SessionState::Cancelled);
                SessionOutcome::Cancelled {
                    emitted: self.emitted,
                }
            }
            Err(e) => {
                warn!("Session {} failed: {}", self.id, e);
                self.transition(SessionState::Failed);
                sink.emit(ProgressEvent::error(&e));
                SessionOutcome::Failed {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    fn execute(&mut self, sink: &mut dyn EventSink) -> EngineResult<SessionOutcome> {
        let handle = RepoHandle::open(&self.request.repo_path)?;
        let repo = handle.open_repo()?;
        let branches = list_branches(&repo)?;
        let target = resolve_branch(&repo, self.request.branch.as_deref(), &branches)?;

        let order = self.request.order.unwrap_or(self.config.load.order);
        let batch_size = self
            .request
            .batch_size
            .filter(|size| *size > 0)
            .unwrap_or(self.config.load.batch_size)
            .max(1);
        let include_files = self
            .request
            .include_files
            .unwrap_or(self.config.load.include_files);
        let tip = target.tip.to_string();

        let key = CursorKey {
            repo_path: handle.git_dir().to_path_buf(),
            branch: target.name.clone(),
        };
        let plan = self.cursors.checkout(
            &key,
            order,
            self.request.skip,
            self.request.limit,
            &tip,
        );
        let (walk_skip, walk_limit, already_loaded) =
            plan.window(self.request.skip, self.request.limit);
        let window_skip = match &plan {
            LoadPlan::Full => self.request.skip,
            LoadPlan::Continue(cursor) => cursor.skip,
        };

        if self.token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let total_estimate = estimate_commit_count(&repo, target.tip, self.config.load.estimate_cap)?;
        let tags = TagIndex::build(&repo)?;
        let mut attributor = if self.request.include_branches {
            Some(BranchAttributor::new(
                &repo,
                &branches,
                &self.config.branches.trunk_names,
            )?)
        } else {
            None
        };

        info!(
            "Session {} loading {} ({:?}, skip {}, limit {}, resume at {})",
            self.id, target.name, order, walk_skip, walk_limit, already_loaded
        );
        if !sink.emit(ProgressEvent::Start {
            branches,
            total_estimate,
        }) {
            return Err(EngineError::Cancelled);
        }
        self.transition(SessionState::Emitting);

        let mut walk = CommitWalk::new(&repo, target.tip, order, walk_skip, walk_limit)?;
        let mut batch_index = 0;
        loop {
            if self.token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let mut batch = walk.next_batch(batch_size)?;
            if batch.is_empty() {
                break;
            }

            for commit in batch.iter_mut() {
                tags.decorate(commit);
                if let Some(attributor) = attributor.as_mut() {
                    decorate_branches(attributor, commit);
                }
            }
            if include_files {
                annotate_commits(&handle, &mut batch, true);
            }

            let count = batch.len();
            if !sink.emit(ProgressEvent::Data {
                commits: batch,
                batch_index,
                is_file_data_included: include_files,
            }) {
                return Err(EngineError::Cancelled);
            }
            self.emitted += count;
            batch_index += 1;
        }

        let total_loaded = already_loaded + self.emitted;
        self.cursors.store(LoadCursor {
            repo_path: key.repo_path,
            branch: key.branch,
            order,
            skip: window_skip,
            loaded: total_loaded,
            tip,
        });
        self.transition(SessionState::Completed);
        sink.emit(ProgressEvent::End { total_loaded });
        Ok(SessionOutcome::Completed { total_loaded })
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

fn decorate_branches(attributor: &mut BranchAttributor<'_>, commit: &mut Commit) {
    let ranked = Oid::from_str(&commit.hash)
        .map_err(EngineError::from)
        .and_then(|oid| attributor.attribute(oid));
    match ranked {
        Ok(names) => commit.branches = Some(names),
        Err(e) => warn!("Skipping branches for {}: {}", commit.short_hash(), e),
    }
}
