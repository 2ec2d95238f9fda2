//! Repository fixtures shared by the integration tests

#![allow(dead_code)]

use anyhow::{Context, Result};
use git2::{Oid, Repository, RepositoryInitOptions, Signature, Time};
use std::cell::Cell;
use std::path::Path;
use tempfile::TempDir;

pub struct Fixture {
    dir: TempDir,
    repo: Repository,
    clock: Cell<i64>,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts)?;
        Ok(Self {
            dir,
            repo,
            clock: Cell::new(1_650_000_000),
        })
    }

    /// `n` commits on `main`, each adding one file. Returns oids oldest first.
    pub fn linear(n: usize) -> Result<(Self, Vec<Oid>)> {
        let fixture = Self::new()?;
        let mut oids = Vec::with_capacity(n);
        for i in 0..n {
            let name = format!("file{}.txt", i);
            let content = format!("content {}\n", i);
            oids.push(fixture.commit("main", &name, &content, &format!("commit {}", i))?);
        }
        Ok((fixture, oids))
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn tip(&self, branch: &str) -> Result<Oid> {
        self.repo
            .find_reference(&format!("refs/heads/{}", branch))?
            .target()
            .context("symbolic ref")
    }

    pub fn branch_at(&self, name: &str, target: Oid) -> Result<()> {
        self.repo.branch(name, &self.repo.find_commit(target)?, true)?;
        Ok(())
    }

    /// Write one file on top of `branch` and commit it.
    pub fn commit(&self, branch: &str, file: &str, content: &str, message: &str) -> Result<Oid> {
        let parents: Vec<Oid> = self.tip(branch).ok().into_iter().collect();
        self.commit_tree(branch, &parents, &[(file, content)], message)
    }

    /// Merge commit on `into` with `from` as the second parent; the tree takes
    /// `into`'s files plus every file of `from`.
    pub fn merge(&self, into: &str, from: &str, message: &str) -> Result<Oid> {
        let ours = self.tip(into)?;
        let theirs = self.tip(from)?;
        let their_tree = self.repo.find_commit(theirs)?.tree()?;
        let mut files = Vec::new();
        for entry in their_tree.iter() {
            let name = entry.name().context("non-utf8 name")?.to_string();
            let blob = self.repo.find_blob(entry.id())?;
            files.push((name, String::from_utf8_lossy(blob.content()).into_owned()));
        }
        let files: Vec<(&str, &str)> = files
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_str()))
            .collect();
        self.commit_tree(into, &[ours, theirs], &files, message)
    }

    fn commit_tree(
        &self,
        branch: &str,
        parents: &[Oid],
        files: &[(&str, &str)],
        message: &str,
    ) -> Result<Oid> {
        let parents = parents
            .iter()
            .map(|oid| self.repo.find_commit(*oid))
            .collect::<Result<Vec<_>, _>>()?;
        let base = match parents.first() {
            Some(parent) => Some(parent.tree()?),
            None => None,
        };
        let mut builder = self.repo.treebuilder(base.as_ref())?;
        for (name, content) in files {
            let blob = self.repo.blob(content.as_bytes())?;
            builder.insert(name, blob, 0o100644)?;
        }
        let tree = self.repo.find_tree(builder.write()?)?;

        let now = self.clock.get() + 30;
        self.clock.set(now);
        let sig = Signature::new("Fixture", "fixture@example.com", &Time::new(now, 0))?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        Ok(self.repo.commit(
            Some(&format!("refs/heads/{}", branch)),
            &sig,
            &sig,
            message,
            &tree,
            &parent_refs,
        )?)
    }
}
