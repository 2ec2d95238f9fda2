//! Async front door for load sessions
//!
//! Every load runs on tokio's blocking pool so the caller's runtime stays free
//! to issue cancellations and side queries while a walk is in progress.

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::cancel::CancellationToken;
use super::cursor::CursorStore;
use super::load::{LoadSession, SessionId, SessionOutcome};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::git::{
    attribute_branches, diff_commit, list_branches, resolve_commit, BranchCandidate, CommitDiff,
    RepoHandle,
};
use crate::models::{Branch, LoadRequest, ProgressEvent};

/// A running load.
pub struct LoadHandle {
    pub id: SessionId,
    /// Bounded; a consumer that stops reading pauses the walk
    pub events: mpsc::Receiver<ProgressEvent>,
    pub outcome: JoinHandle<SessionOutcome>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: EngineConfig,
    cursors: Arc<CursorStore>,
    active: DashMap<SessionId, CancellationToken>,
}

/// Drops a session's token from the active table however the task ends.
struct ActiveGuard {
    inner: Arc<ManagerInner>,
    id: SessionId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.inner.active.remove(&self.id);
    }
}

impl SessionManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                cursors: Arc::new(CursorStore::new()),
                active: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.inner.cursors
    }

    /// Start a load. Must be called from within a tokio runtime.
    pub fn start_load(&self, request: LoadRequest) -> LoadHandle {
        let id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        self.inner.active.insert(id.clone(), token.clone());

        let (mut tx, rx) = mpsc::channel(self.inner.config.load.event_buffer.max(1));
        let mut session = LoadSession::new(
            id.clone(),
            request,
            &self.inner.config,
            Arc::clone(&self.inner.cursors),
            token,
        );
        let guard = ActiveGuard {
            inner: Arc::clone(&self.inner),
            id: id.clone(),
        };

        debug!("Spawning load session {}", id);
        let outcome = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            session.run(&mut tx)
        });

        LoadHandle {
            id,
            events: rx,
            outcome,
        }
    }

    /// Request cancellation. Returns `false` when no such session is running,
    /// including sessions that already finished.
    pub fn cancel(&self, id: &str) -> bool {
        match self.inner.active.get(id) {
            Some(token) => {
                token.cancel();
                debug!("Cancellation requested for session {}", id);
                true
            }
            None => false,
        }
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.inner.active.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub async fn list_branches(&self, repo_path: PathBuf) -> EngineResult<Vec<Branch>> {
        blocking(move || {
            let repo = RepoHandle::open(&repo_path)?.open_repo()?;
            list_branches(&repo)
        })
        .await
    }

    /// On-demand diff for one commit (hash or revision expression).
    pub async fn diff_commit(&self, repo_path: PathBuf, rev: String) -> EngineResult<CommitDiff> {
        blocking(move || {
            let repo = RepoHandle::open(&repo_path)?.open_repo()?;
            let oid = resolve_commit(&repo, &rev)?;
            diff_commit(&repo, oid)
        })
        .await
    }

    pub async fn attribute(
        &self,
        repo_path: PathBuf,
        rev: String,
    ) -> EngineResult<Vec<BranchCandidate>> {
        let trunk_names = self.inner.config.branches.trunk_names.clone();
        blocking(move || {
            let repo = RepoHandle::open(&repo_path)?.open_repo()?;
            let oid = resolve_commit(&repo, &rev)?;
            let branches = list_branches(&repo)?;
            attribute_branches(&repo, oid, &branches, &trunk_names)
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EngineError::TaskFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use anyhow::Result;

    fn repo_with(n: usize) -> Result<TestRepo> {
        let t = TestRepo::new()?;
        for i in 0..n {
            let name = format!("f{}.txt", i);
            t.commit("main", &[(name.as_str(), Some("x\n"))], &format!("c{}", i))?;
        }
        Ok(t)
    }

    async fn drain(handle: &mut LoadHandle) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_load_streams_and_retires() -> Result<()> {
        let t = repo_with(3)?;
        let manager = SessionManager::new(EngineConfig::default());

        let mut handle = manager.start_load(LoadRequest::new(t.path()).batch_size(1));
        let events = drain(&mut handle).await;
        let outcome = handle.outcome.await?;

        assert_eq!(outcome, SessionOutcome::Completed { total_loaded: 3 });
        assert_eq!(events.len(), 5);
        assert!(manager.active_sessions().is_empty());
        assert!(!manager.cancel(&handle.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_running_session() -> Result<()> {
        let t = repo_with(8)?;
        let mut config = EngineConfig::default();
        config.load.event_buffer = 1;
        let manager = SessionManager::new(config);

        let mut handle = manager.start_load(LoadRequest::new(t.path()).batch_size(1));
        let first = handle.events.recv().await;
        assert!(matches!(first, Some(ProgressEvent::Start { .. })));

        let acknowledged = manager.cancel(&handle.id);
        let rest = drain(&mut handle).await;
        let outcome = handle.outcome.await?;

        if acknowledged {
            assert!(matches!(outcome, SessionOutcome::Cancelled { .. }));
            assert!(!rest.iter().any(ProgressEvent::is_terminal));
        } else {
            // The walk finished before the cancel landed
            assert!(matches!(outcome, SessionOutcome::Completed { .. }));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_side_queries() -> Result<()> {
        let t = TestRepo::new()?;
        let c1 = t.commit("main", &[("a.txt", Some("1\n2\n3\n"))], "add a")?;
        let manager = SessionManager::new(EngineConfig::default());
        let path = t.path().to_path_buf();

        let branches = manager.list_branches(path.clone()).await?;
        assert_eq!(branches.len(), 1);

        let diff = manager.diff_commit(path.clone(), c1.to_string()).await?;
        assert_eq!(diff.stats.additions, 3);
        assert_eq!(diff.stats.files_count, 1);

        let ranked = manager.attribute(path, "main".to_string()).await?;
        assert_eq!(ranked[0].name, "main");
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_session_cancel_is_noop() {
        let manager = SessionManager::new(EngineConfig::default());
        assert!(!manager.cancel("nope"));
    }
}
