//! Tag decoration

use git2::{Oid, Repository};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::EngineResult;
use crate::models::Commit;

/// Commit id -> tag names pointing at it, annotated tags peeled.
#[derive(Debug, Default)]
pub struct TagIndex {
    by_commit: FxHashMap<Oid, Vec<String>>,
}

impl TagIndex {
    pub fn build(repo: &Repository) -> EngineResult<Self> {
        let mut by_commit: FxHashMap<Oid, Vec<String>> = FxHashMap::default();

        let mut refs = Vec::new();
        repo.tag_foreach(|oid, name| {
            let name = String::from_utf8_lossy(name)
                .trim_start_matches("refs/tags/")
                .to_string();
            refs.push((oid, name));
            true
        })?;

        for (oid, name) in refs {
            // Tags can point to tag objects; peel to the commit
            let target = repo
                .find_object(oid, None)
                .and_then(|obj| obj.peel_to_commit())
                .map(|commit| commit.id());
            match target {
                Ok(commit_id) => by_commit.entry(commit_id).or_default().push(name),
                Err(e) => debug!("Skipping tag {} ({})", name, e.message()),
            }
        }

        for names in by_commit.values_mut() {
            names.sort();
        }
        Ok(Self { by_commit })
    }

    pub fn tags_for(&self, oid: Oid) -> Option<&[String]> {
        self.by_commit.get(&oid).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.by_commit.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_commit.is_empty()
    }

    /// Fill `commit.tags` when any tag points at it.
    pub fn decorate(&self, commit: &mut Commit) {
        let Ok(oid) = Oid::from_str(&commit.hash) else {
            return;
        };
        if let Some(tags) = self.tags_for(oid) {
            commit.tags = Some(tags.to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::walker::read_commit;
    use crate::test_support::TestRepo;
    use anyhow::Result;

    #[test]
    fn test_lightweight_and_annotated_tags() -> Result<()> {
        let t = TestRepo::new()?;
        let c1 = t.commit("main", &[("a.txt", Some("a"))], "one")?;
        let c2 = t.commit("main", &[("b.txt", Some("b"))], "two")?;
        t.lightweight_tag("v0.1", c1)?;
        t.annotated_tag("v0.2", c2)?;
        t.lightweight_tag("latest", c2)?;

        let index = TagIndex::build(t.repo())?;
        assert_eq!(index.len(), 3);
        assert_eq!(index.tags_for(c1), Some(&["v0.1".to_string()][..]));

        let mut commit = read_commit(t.repo(), c2)?;
        index.decorate(&mut commit);
        assert_eq!(
            commit.tags,
            Some(vec!["latest".to_string(), "v0.2".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_untagged_commit_stays_undecorated() -> Result<()> {
        let t = TestRepo::new()?;
        let c1 = t.commit("main", &[("a.txt", Some("a"))], "one")?;
        let index = TagIndex::build(t.repo())?;
        assert!(index.is_empty());

        let mut commit = read_commit(t.repo(), c1)?;
        index.decorate(&mut commit);
        assert!(commit.tags.is_none());
        Ok(())
    }
}
