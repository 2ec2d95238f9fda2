//! Throwaway repositories for unit tests.
//!
//! Commits are written straight into the object database (no index, no work
//! tree checkout) with a monotonically increasing author clock, so ordering
//! in tests never depends on wall time. Only flat file names are supported.

use anyhow::{Context, Result};
use git2::{Oid, Repository, RepositoryInitOptions, Signature, Time};
use std::cell::Cell;
use std::path::Path;
use tempfile::TempDir;

pub(crate) struct TestRepo {
    dir: TempDir,
    repo: Repository,
    clock: Cell<i64>,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts)?;

        let mut config = repo.config()?;
        config.set_str("user.name", "Test User")?;
        config.set_str("user.email", "test@example.com")?;

        Ok(Self {
            dir,
            repo,
            clock: Cell::new(1_700_000_000),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    fn signature(&self) -> Result<Signature<'static>> {
        let now = self.clock.get() + 60;
        self.clock.set(now);
        Ok(Signature::new(
            "Test User",
            "test@example.com",
            &Time::new(now, 0),
        )?)
    }

    pub fn tip(&self, branch: &str) -> Result<Oid> {
        let reference = self
            .repo
            .find_reference(&format!("refs/heads/{}", branch))
            .with_context(|| format!("no branch {}", branch))?;
        reference.target().context("symbolic branch ref")
    }

    /// Commit `changes` on top of `branch` (creating it if needed).
    /// `None` content deletes the file.
    pub fn commit(
        &self,
        branch: &str,
        changes: &[(&str, Option<&str>)],
        message: &str,
    ) -> Result<Oid> {
        let parent = self.tip(branch).ok();
        let parents: Vec<Oid> = parent.into_iter().collect();
        self.commit_with_parents(branch, &parents, changes, message)
    }

    /// Create a merge commit on `into` whose second parent is the tip of `from`.
    /// The merged tree is `into`'s tree overlaid with `from`'s files plus `changes`.
    pub fn merge(&self, into: &str, from: &str, message: &str) -> Result<Oid> {
        let ours = self.tip(into)?;
        let theirs = self.tip(from)?;
        let their_tree = self.repo.find_commit(theirs)?.tree()?;
        let overlay: Vec<(String, String)> = their_tree
            .iter()
            .filter_map(|entry| {
                let name = entry.name()?.to_string();
                let blob = self.repo.find_blob(entry.id()).ok()?;
                Some((name, String::from_utf8_lossy(blob.content()).into_owned()))
            })
            .collect();
        let changes: Vec<(&str, Option<&str>)> = overlay
            .iter()
            .map(|(name, content)| (name.as_str(), Some(content.as_str())))
            .collect();
        self.commit_with_parents(into, &[ours, theirs], &changes, message)
    }

    fn commit_with_parents(
        &self,
        branch: &str,
        parents: &[Oid],
        changes: &[(&str, Option<&str>)],
        message: &str,
    ) -> Result<Oid> {
        let parent_commits = parents
            .iter()
            .map(|oid| self.repo.find_commit(*oid))
            .collect::<Result<Vec<_>, _>>()?;
        let base_tree = match parent_commits.first() {
            Some(commit) => Some(commit.tree()?),
            None => None,
        };

        let mut builder = self.repo.treebuilder(base_tree.as_ref())?;
        for (name, content) in changes {
            match content {
                Some(content) => {
                    let blob = self.repo.blob(content.as_bytes())?;
                    builder.insert(name, blob, 0o100644)?;
                }
                None => {
                    builder.remove(name)?;
                }
            }
        }
        let tree = self.repo.find_tree(builder.write()?)?;

        let sig = self.signature()?;
        let refs: Vec<&git2::Commit> = parent_commits.iter().collect();
        let oid = self.repo.commit(
            Some(&format!("refs/heads/{}", branch)),
            &sig,
            &sig,
            message,
            &tree,
            &refs,
        )?;
        Ok(oid)
    }

    pub fn branch_at(&self, name: &str, target: Oid) -> Result<()> {
        let commit = self.repo.find_commit(target)?;
        self.repo.branch(name, &commit, true)?;
        Ok(())
    }

    /// Create `refs/remotes/<name>` (e.g. `origin/main`).
    pub fn remote_branch(&self, name: &str, target: Oid) -> Result<()> {
        self.repo
            .reference(&format!("refs/remotes/{}", name), target, true, "test remote")?;
        Ok(())
    }

    pub fn lightweight_tag(&self, name: &str, target: Oid) -> Result<()> {
        let object = self.repo.find_object(target, None)?;
        self.repo.tag_lightweight(name, &object, true)?;
        Ok(())
    }

    pub fn annotated_tag(&self, name: &str, target: Oid) -> Result<()> {
        let object = self.repo.find_object(target, None)?;
        let sig = self.signature()?;
        self.repo.tag(name, &object, &sig, "release", true)?;
        Ok(())
    }

    pub fn detach_head(&self, target: Oid) -> Result<()> {
        self.repo.set_head_detached(target)?;
        Ok(())
    }
}
