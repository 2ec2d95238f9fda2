//! Operations answered from the object database, rendered as JSON

use serde::Serialize;

use super::{Capability, Operation, OperationOutput, OperationRequest};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::git::{
    annotate_commits, attribute_branches, diff_commit, list_branches, resolve_branch,
    resolve_commit, CommitWalk, RepoHandle, TagIndex, WalkOrder,
};

pub struct NativeBackend {
    trunk_names: Vec<String>,
    default_order: WalkOrder,
}

impl NativeBackend {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            trunk_names: config.branches.trunk_names.clone(),
            default_order: config.load.order,
        }
    }

    fn log(&self, handle: &RepoHandle, args: &[String]) -> EngineResult<String> {
        let opts = LogArgs::parse(args, self.default_order)?;
        let repo = handle.open_repo()?;
        let branches = list_branches(&repo)?;
        let start = match opts.rev.as_deref() {
            Some(rev) => resolve_commit(&repo, rev)
                .map_err(|_| EngineError::BranchNotFound(rev.to_string()))?,
            None => resolve_branch(&repo, None, &branches)?.tip,
        };

        let mut commits = CommitWalk::new(&repo, start, opts.order, opts.skip, opts.limit)?
            .collect::<EngineResult<Vec<_>>>()?;
        let tags = TagIndex::build(&repo)?;
        for commit in commits.iter_mut() {
            tags.decorate(commit);
        }
        if opts.stats {
            annotate_commits(handle, &mut commits, false);
        }
        to_json(&commits)
    }
}

impl Capability for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn supports(&self, operation: Operation) -> bool {
        matches!(
            operation,
            Operation::ListBranches
                | Operation::Log
                | Operation::DiffCommit
                | Operation::AttributeBranches
        )
    }

    fn invoke(&self, request: &OperationRequest) -> EngineResult<OperationOutput> {
        let handle = RepoHandle::open(&request.repo_path)?;
        let stdout = match request.operation {
            Operation::ListBranches => to_json(&list_branches(&handle.open_repo()?)?)?,
            Operation::Log => self.log(&handle, &request.args)?,
            Operation::DiffCommit => {
                let repo = handle.open_repo()?;
                let oid = resolve_commit(&repo, required_rev(request)?)?;
                to_json(&diff_commit(&repo, oid)?)?
            }
            Operation::AttributeBranches => {
                let repo = handle.open_repo()?;
                let oid = resolve_commit(&repo, required_rev(request)?)?;
                let branches = list_branches(&repo)?;
                to_json(&attribute_branches(&repo, oid, &branches, &self.trunk_names)?)?
            }
            other => return Err(EngineError::Unsupported(other.name().to_string())),
        };

        Ok(OperationOutput {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        })
    }
}

fn required_rev(request: &OperationRequest) -> EngineResult<&str> {
    request.args.first().map(String::as_str).ok_or_else(|| {
        EngineError::InvalidArgument(format!("{} needs a commit", request.operation))
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> EngineResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::InvalidArgument(format!("unserializable output: {}", e)))
}

/// `[<rev>] [--skip N] [-n|--limit N] [--order topological|date] [--stats]`
#[derive(Debug, PartialEq)]
struct LogArgs {
    rev: Option<String>,
    skip: usize,
    limit: usize,
    order: WalkOrder,
    stats: bool,
}

impl LogArgs {
    fn parse(args: &[String], default_order: WalkOrder) -> EngineResult<Self> {
        let mut opts = LogArgs {
            rev: None,
            skip: 0,
            limit: 0,
            order: default_order,
            stats: false,
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--skip" => opts.skip = number(arg, iter.next())?,
                "-n" | "--limit" => opts.limit = number(arg, iter.next())?,
                "--order" => {
                    let value = iter.next().ok_or_else(|| missing(arg))?;
                    opts.order = value.parse().map_err(EngineError::InvalidArgument)?;
                }
                "--stats" => opts.stats = true,
                flag if flag.starts_with('-') => {
                    return Err(EngineError::InvalidArgument(format!("unknown log flag {}", flag)))
                }
                rev if opts.rev.is_none() => opts.rev = Some(rev.to_string()),
                extra => {
                    return Err(EngineError::InvalidArgument(format!(
                        "unexpected log argument {}",
                        extra
                    )))
                }
            }
        }
        Ok(opts)
    }
}

fn missing(flag: &str) -> EngineError {
    EngineError::InvalidArgument(format!("{} needs a value", flag))
}

fn number(flag: &str, value: Option<&String>) -> EngineResult<usize> {
    let value = value.ok_or_else(|| missing(flag))?;
    value
        .parse()
        .map_err(|_| EngineError::InvalidArgument(format!("{} expects a number, got {}", flag, value)))
}
