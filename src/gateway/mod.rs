//! Operation gateway
//!
//! Every repository operation is served by a [`Capability`] backend picked
//! per operation, not per repository. Read-side queries run natively against
//! the object database; mutating and free-form operations are delegated to
//! an installed `git` binary. Moving an operation between backends is a
//! one-line change in [`OperationRouter::new`].
//!
//! ```no_run
//! use gitpulse::config::EngineConfig;
//! use gitpulse::gateway::{Operation, OperationRequest, OperationRouter};
//!
//! let router = OperationRouter::new(&EngineConfig::default());
//! let request = OperationRequest::new(Operation::CustomLog, "/path/to/repo")
//!     .args(["--format=%h %s", "-n", "5"]);
//! let output = router.invoke(&request).unwrap();
//! print!("{}", output.stdout);
//! ```

mod external;
mod native;

pub use external::{run_command, ExternalBackend};
pub use native::NativeBackend;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    ListBranches,
    Log,
    DiffCommit,
    AttributeBranches,
    /// Reword the most recent commit
    AmendMessage,
    CherryPick,
    Revert,
    /// `git log` with caller-supplied format arguments
    CustomLog,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::ListBranches,
        Operation::Log,
        Operation::DiffCommit,
        Operation::AttributeBranches,
        Operation::AmendMessage,
        Operation::CherryPick,
        Operation::Revert,
        Operation::CustomLog,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::ListBranches => "list-branches",
            Operation::Log => "log",
            Operation::DiffCommit => "diff-commit",
            Operation::AttributeBranches => "attribute-branches",
            Operation::AmendMessage => "amend-message",
            Operation::CherryPick => "cherry-pick",
            Operation::Revert => "revert",
            Operation::CustomLog => "custom-log",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown operation '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub operation: Operation,
    pub repo_path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl OperationRequest {
    pub fn new(operation: Operation, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            operation,
            repo_path: repo_path.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Raw result of an operation. Never parsed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// A backend able to serve some operations.
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, operation: Operation) -> bool;

    fn invoke(&self, request: &OperationRequest) -> EngineResult<OperationOutput>;
}

pub struct OperationRouter {
    routes: FxHashMap<Operation, Arc<dyn Capability>>,
}

impl OperationRouter {
    /// Default routing: queries native, mutations and custom logs external.
    pub fn new(config: &EngineConfig) -> Self {
        let native: Arc<dyn Capability> = Arc::new(NativeBackend::new(config));
        let external: Arc<dyn Capability> = Arc::new(ExternalBackend::new(config));

        let mut router = Self::empty();
        for op in Operation::ALL {
            let backend = if native.supports(op) {
                Arc::clone(&native)
            } else {
                Arc::clone(&external)
            };
            router.route(op, backend);
        }
        router
    }

    pub fn empty() -> Self {
        Self {
            routes: FxHashMap::default(),
        }
    }

    /// Send `operation` to `backend`, replacing any previous route.
    pub fn route(&mut self, operation: Operation, backend: Arc<dyn Capability>) -> &mut Self {
        self.routes.insert(operation, backend);
        self
    }

    pub fn backend_for(&self, operation: Operation) -> Option<&dyn Capability> {
        self.routes.get(&operation).map(|backend| backend.as_ref())
    }

    pub fn invoke(&self, request: &OperationRequest) -> EngineResult<OperationOutput> {
        let op = request.operation;
        let backend = self
            .backend_for(op)
            .filter(|backend| backend.supports(op))
            .ok_or_else(|| EngineError::Unsupported(op.name().to_string()))?;
        debug!("Routing {} to {} backend", op, backend.name());
        backend.invoke(request)
    }
}
