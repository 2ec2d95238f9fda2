//! Repository handle
//!
//! `RepoHandle` is a validated, cheaply clonable pointer to a repository on
//! disk. `git2::Repository` is `Send` but not `Sync`, so instead of sharing a
//! single instance every reader opens its own through [`RepoHandle::open_repo`].
//! Readers never block each other.

use git2::{ErrorCode, Repository, RepositoryOpenFlags};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct RepoHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    /// Path the caller asked for (used as the cursor key)
    requested: PathBuf,
    /// The `.git` directory (or the repository itself when bare)
    git_dir: PathBuf,
    workdir: Option<PathBuf>,
}

impl RepoHandle {
    /// Open and validate the repository at `path`.
    ///
    /// The path itself must be the repository (work tree or bare); parent
    /// directories are not searched, so a typo never silently picks up an
    /// enclosing repository.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::PathNotFound(path.to_path_buf()));
        }

        let repo = open_at(path)?;
        validate(&repo, path)?;

        let handle = Self {
            inner: Arc::new(HandleInner {
                requested: path.to_path_buf(),
                git_dir: repo.path().to_path_buf(),
                workdir: repo.workdir().map(Path::to_path_buf),
            }),
        };
        debug!("Opened git repository at {:?}", handle.git_dir());
        Ok(handle)
    }

    /// Check if a path is a git repository.
    pub fn is_git_repo(path: &Path) -> bool {
        Self::open(path).is_ok()
    }

    /// Open a fresh libgit2 repository for the calling thread.
    pub fn open_repo(&self) -> EngineResult<Repository> {
        Repository::open(&self.inner.git_dir).map_err(|e| EngineError::Corrupted {
            path: self.inner.git_dir.clone(),
            message: e.message().to_string(),
        })
    }

    /// Path as given to [`RepoHandle::open`]
    pub fn path(&self) -> &Path {
        &self.inner.requested
    }

    pub fn git_dir(&self) -> &Path {
        &self.inner.git_dir
    }

    /// Working tree, `None` for bare repositories
    pub fn workdir(&self) -> Option<&Path> {
        self.inner.workdir.as_deref()
    }

    /// Directory external tools should run in.
    pub fn command_dir(&self) -> &Path {
        self.workdir().unwrap_or_else(|| self.git_dir())
    }
}

fn open_at(path: &Path) -> EngineResult<Repository> {
    let flags = RepositoryOpenFlags::NO_SEARCH;
    Repository::open_ext(path, flags, std::iter::empty::<&OsStr>()).map_err(|e| {
        if e.code() == ErrorCode::NotFound {
            EngineError::NotAGitRepository(path.to_path_buf())
        } else {
            EngineError::Corrupted {
                path: path.to_path_buf(),
                message: e.message().to_string(),
            }
        }
    })
}

/// Confirm both the object database and the ref store are readable.
fn validate(repo: &Repository, path: &Path) -> EngineResult<()> {
    let corrupted = |e: git2::Error| EngineError::Corrupted {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    };

    repo.odb().map_err(corrupted)?;
    repo.references().map_err(corrupted)?;

    // An unborn HEAD is valid (fresh repository); anything else must resolve.
    match repo.head() {
        Ok(_) => Ok(()),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => Ok(()),
        Err(e) => Err(corrupted(e)),
    }
}
