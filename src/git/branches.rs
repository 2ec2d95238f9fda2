//! Branch enumeration and HEAD resolution

use git2::{BranchType, ErrorCode, Oid, Repository};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::models::Branch;

/// Name used for the walk start when HEAD is detached and no local branch exists.
pub const DETACHED_HEAD: &str = "HEAD";

/// A branch name resolved to the commit a walk starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub name: String,
    pub tip: Oid,
    pub is_remote: bool,
}

/// List local branches (by name) followed by remote-tracking branches (by name).
///
/// Symbolic remote refs such as `origin/HEAD` are skipped. At most one local
/// branch is marked current: the one HEAD symbolically points at.
pub fn list_branches(repo: &Repository) -> EngineResult<Vec<Branch>> {
    let head_target = symbolic_head(repo)?;

    let mut locals = Vec::new();
    let mut remotes = Vec::new();
    for entry in repo.branches(None)? {
        let (branch, branch_type) = entry?;
        let reference = branch.get();
        // Symbolic refs (origin/HEAD) have no direct target
        let Some(tip) = reference.target() else {
            continue;
        };
        let Some(name) = branch.name()?.map(str::to_string) else {
            debug!("Skipping branch with non-UTF-8 name");
            continue;
        };

        let is_remote = branch_type == BranchType::Remote;
        let is_current = !is_remote
            && head_target
                .as_deref()
                .is_some_and(|target| reference.name() == Some(target));

        let branch = Branch {
            name,
            is_current,
            is_remote,
            tip: tip.to_string(),
        };
        if is_remote {
            remotes.push(branch);
        } else {
            locals.push(branch);
        }
    }

    locals.sort_by(|a, b| a.name.cmp(&b.name));
    remotes.sort_by(|a, b| a.name.cmp(&b.name));
    locals.extend(remotes);
    Ok(locals)
}

/// Full ref name HEAD points at, or `None` when HEAD is detached.
fn symbolic_head(repo: &Repository) -> EngineResult<Option<String>> {
    let head = match repo.find_reference("HEAD") {
        Ok(head) => head,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(head.symbolic_target().map(str::to_string))
}

/// Branch later walks default to.
///
/// The current branch when HEAD is attached; when detached, the local branch
/// whose tip commit is newest (ties broken by name).
pub fn default_branch(repo: &Repository, branches: &[Branch]) -> EngineResult<Option<String>> {
    if let Some(current) = branches.iter().find(|b| b.is_current) {
        return Ok(Some(current.name.clone()));
    }

    let mut best: Option<(i64, &str)> = None;
    for branch in branches.iter().filter(|b| !b.is_remote) {
        let oid = Oid::from_str(&branch.tip)?;
        let time = repo
            .find_commit(oid)
            .map_err(|e| EngineError::corrupted_object(oid, e))?
            .time()
            .seconds();
        let better = match best {
            None => true,
            Some((best_time, best_name)) => {
                time > best_time || (time == best_time && branch.name.as_str() < best_name)
            }
        };
        if better {
            best = Some((time, branch.name.as_str()));
        }
    }

    if let Some((_, name)) = best {
        debug!("HEAD is detached; defaulting to most recent local branch {}", name);
    }
    Ok(best.map(|(_, name)| name.to_string()))
}

/// Resolve the branch a load should walk.
///
/// An explicit name matches a local branch first, then a remote-tracking
/// branch (`origin/x`). With no name, the default branch is used, then a
/// detached HEAD commit.
pub fn resolve_branch(
    repo: &Repository,
    requested: Option<&str>,
    branches: &[Branch],
) -> EngineResult<ResolvedRef> {
    if let Some(name) = requested {
        let name = name
            .strip_prefix("refs/heads/")
            .or_else(|| name.strip_prefix("refs/remotes/"))
            .unwrap_or(name);
        let found = branches
            .iter()
            .find(|b| !b.is_remote && b.name == name)
            .or_else(|| branches.iter().find(|b| b.is_remote && b.name == name))
            .ok_or_else(|| EngineError::BranchNotFound(name.to_string()))?;
        return to_resolved(found);
    }

    if let Some(name) = default_branch(repo, branches)? {
        if let Some(found) = branches.iter().find(|b| !b.is_remote && b.name == name) {
            return to_resolved(found);
        }
    }

    if repo.head_detached().unwrap_or(false) {
        if let Some(tip) = repo.head()?.target() {
            return Ok(ResolvedRef {
                name: DETACHED_HEAD.to_string(),
                tip,
                is_remote: false,
            });
        }
    }

    Err(EngineError::BranchNotFound(DETACHED_HEAD.to_string()))
}

fn to_resolved(branch: &Branch) -> EngineResult<ResolvedRef> {
    Ok(ResolvedRef {
        name: branch.name.clone(),
        tip: Oid::from_str(&branch.tip)?,
        is_remote: branch.is_remote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use anyhow::Result;

    #[test]
    fn test_lists_locals_then_remotes() -> Result<()> {
        let t = TestRepo::new()?;
        let c1 = t.commit("main", &[("a.txt", Some("a"))], "one")?;
        t.branch_at("zeta", c1)?;
        t.branch_at("alpha", c1)?;
        t.remote_branch("origin/main", c1)?;

        let branches = list_branches(t.repo())?;
        let names: Vec<_> = branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "main", "zeta", "origin/main"]);

        let current: Vec<_> = branches.iter().filter(|b| b.is_current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].name, "main");
        assert!(branches[3].is_remote);
        Ok(())
    }

    #[test]
    fn test_detached_head_marks_nothing_current() -> Result<()> {
        let t = TestRepo::new()?;
        let c1 = t.commit("main", &[("a.txt", Some("a"))], "one")?;
        let c2 = t.commit("feature", &[("b.txt", Some("b"))], "two")?;
        t.detach_head(c1)?;

        let branches = list_branches(t.repo())?;
        assert!(branches.iter().all(|b| !b.is_current));

        // feature has the newest tip, so it becomes the effective default
        let default = default_branch(t.repo(), &branches)?;
        assert_eq!(default.as_deref(), Some("feature"));

        let resolved = resolve_branch(t.repo(), None, &branches)?;
        assert_eq!(resolved.name, "feature");
        assert_eq!(resolved.tip, c2);
        Ok(())
    }

    #[test]
    fn test_resolve_named_branch() -> Result<()> {
        let t = TestRepo::new()?;
        let c1 = t.commit("main", &[("a.txt", Some("a"))], "one")?;
        t.remote_branch("origin/release", c1)?;
        let branches = list_branches(t.repo())?;

        let local = resolve_branch(t.repo(), Some("main"), &branches)?;
        assert!(!local.is_remote);
        assert_eq!(local.tip, c1);

        let remote = resolve_branch(t.repo(), Some("origin/release"), &branches)?;
        assert!(remote.is_remote);

        let qualified = resolve_branch(t.repo(), Some("refs/heads/main"), &branches)?;
        assert_eq!(qualified.name, "main");
        Ok(())
    }

    #[test]
    fn test_unknown_branch() -> Result<()> {
        let t = TestRepo::new()?;
        t.commit("main", &[("a.txt", Some("a"))], "one")?;
        let branches = list_branches(t.repo())?;
        let err = resolve_branch(t.repo(), Some("does-not-exist"), &branches).unwrap_err();
        assert_eq!(err.kind(), "BranchNotFound");
        Ok(())
    }

    #[test]
    fn test_empty_repository_has_no_default() -> Result<()> {
        let t = TestRepo::new()?;
        let branches = list_branches(t.repo())?;
        assert!(branches.is_empty());
        let err = resolve_branch(t.repo(), None, &branches).unwrap_err();
        assert_eq!(err.kind(), "BranchNotFound");
        Ok(())
    }
}
