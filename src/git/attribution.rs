//! Heuristic branch attribution
//!
//! Answers "which branch does this commit belong to" by ranking every ref tip
//! the commit is reachable from. Candidates are ordered by tier, then by
//! graph distance (fewest parent edges from tip to commit, BFS over all
//! parents), then by name. The answer is best effort: when history is linear
//! across merged branches several candidates are equally valid and the full
//! ranked list is returned so callers can pick differently.
//!
//! Tiers:
//! 1. `Feature` - local branches whose name is not trunk-like
//! 2. `Local` - trunk-like local branches other than the primary trunk
//!    (`develop` when `main` exists)
//! 3. `Remote` - remote-tracking branches other than the primary trunk
//! 4. `Trunk` - the primary trunk, local or remote (`main`, `origin/main`)
//!
//! The primary trunk is the first configured trunk name that exists as a
//! local branch, falling back to the first one that exists remotely.

use git2::{Oid, Repository};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::VecDeque;

use crate::error::{EngineError, EngineResult};
use crate::models::Branch;

pub const DEFAULT_TRUNK_NAMES: &[&str] = &["main", "master", "develop", "trunk"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributionTier {
    Feature = 1,
    Local = 2,
    Remote = 3,
    Trunk = 4,
}

/// One ranked attribution candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchCandidate {
    pub name: String,
    pub tier: AttributionTier,
    /// Parent edges between the branch tip and the commit (0 = the tip itself)
    pub distance: u32,
}

#[derive(Debug, Clone)]
struct RankedTip {
    name: String,
    oid: Oid,
    tier: AttributionTier,
}

/// Strip the remote name from a remote-tracking branch (`origin/a/b` -> `a/b`).
fn short_name(branch: &Branch) -> &str {
    if branch.is_remote {
        branch
            .name
            .split_once('/')
            .map(|(_, rest)| rest)
            .unwrap_or(&branch.name)
    } else {
        &branch.name
    }
}

fn primary_trunk<'a>(branches: &'a [Branch], trunk_names: &'a [String]) -> Option<&'a str> {
    let exists = |remote: bool, name: &str| {
        branches
            .iter()
            .any(|b| b.is_remote == remote && short_name(b) == name)
    };
    trunk_names
        .iter()
        .find(|name| exists(false, name.as_str()))
        .or_else(|| trunk_names.iter().find(|name| exists(true, name.as_str())))
        .map(String::as_str)
}

/// Assign every branch its tier.
fn classify(branches: &[Branch], trunk_names: &[String]) -> EngineResult<Vec<RankedTip>> {
    let primary = primary_trunk(branches, trunk_names);
    branches
        .iter()
        .map(|branch| {
            let short = short_name(branch);
            let tier = if Some(short) == primary {
                AttributionTier::Trunk
            } else if branch.is_remote {
                AttributionTier::Remote
            } else if trunk_names.iter().any(|t| t == short) {
                AttributionTier::Local
            } else {
                AttributionTier::Feature
            };
            Ok(RankedTip {
                name: branch.name.clone(),
                oid: Oid::from_str(&branch.tip)?,
                tier,
            })
        })
        .collect()
}

fn sort_candidates(candidates: &mut [BranchCandidate]) {
    candidates.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then(a.distance.cmp(&b.distance))
            .then_with(|| a.name.cmp(&b.name))
    });
}

fn parents_of(repo: &Repository, oid: Oid) -> EngineResult<Vec<Oid>> {
    let commit = repo
        .find_commit(oid)
        .map_err(|e| EngineError::corrupted_object(oid, e))?;
    Ok(commit.parent_ids().collect())
}

/// Shortest parent-edge distance from `tip` down to `target`, if reachable.
fn distance_to(repo: &Repository, tip: Oid, target: Oid) -> EngineResult<Option<u32>> {
    if tip == target {
        return Ok(Some(0));
    }
    if !repo.graph_descendant_of(tip, target)? {
        return Ok(None);
    }

    let mut seen: FxHashMap<Oid, u32> = FxHashMap::default();
    let mut queue = VecDeque::from([(tip, 0u32)]);
    seen.insert(tip, 0);
    while let Some((oid, dist)) = queue.pop_front() {
        for parent in parents_of(repo, oid)? {
            if parent == target {
                return Ok(Some(dist + 1));
            }
            if !seen.contains_key(&parent) {
                seen.insert(parent, dist + 1);
                queue.push_back((parent, dist + 1));
            }
        }
    }
    Ok(None)
}

/// Rank every branch `commit` is reachable from. One-shot variant; see
/// [`BranchAttributor`] for attributing many commits against the same refs.
pub fn attribute_branches(
    repo: &Repository,
    commit: Oid,
    branches: &[Branch],
    trunk_names: &[String],
) -> EngineResult<Vec<BranchCandidate>> {
    let mut candidates = Vec::new();
    for tip in classify(branches, trunk_names)? {
        if let Some(distance) = distance_to(repo, tip.oid, commit)? {
            candidates.push(BranchCandidate {
                name: tip.name,
                tier: tip.tier,
                distance,
            });
        }
    }
    sort_candidates(&mut candidates);
    Ok(candidates)
}

/// Attribution with per-tip distance maps cached for the lifetime of the value.
///
/// The first lookup against a tip walks that tip's full ancestry once; later
/// lookups are hash probes. Memory grows with tips times history length.
pub struct BranchAttributor<'repo> {
    repo: &'repo Repository,
    tips: Vec<RankedTip>,
    distances: Vec<Option<FxHashMap<Oid, u32>>>,
}

impl<'repo> BranchAttributor<'repo> {
    pub fn new(
        repo: &'repo Repository,
        branches: &[Branch],
        trunk_names: &[String],
    ) -> EngineResult<Self> {
        let tips = classify(branches, trunk_names)?;
        let distances = vec![None; tips.len()];
        Ok(Self {
            repo,
            tips,
            distances,
        })
    }

    pub fn rank(&mut self, commit: Oid) -> EngineResult<Vec<BranchCandidate>> {
        let mut candidates = Vec::new();
        for idx in 0..self.tips.len() {
            if self.distances[idx].is_none() {
                self.distances[idx] = Some(ancestry(self.repo, self.tips[idx].oid)?);
            }
            let distance = self.distances[idx]
                .as_ref()
                .and_then(|map| map.get(&commit).copied());
            if let Some(distance) = distance {
                let tip = &self.tips[idx];
                candidates.push(BranchCandidate {
                    name: tip.name.clone(),
                    tier: tip.tier,
                    distance,
                });
            }
        }
        sort_candidates(&mut candidates);
        Ok(candidates)
    }

    /// Ranked branch names, best first.
    pub fn attribute(&mut self, commit: Oid) -> EngineResult<Vec<String>> {
        Ok(self.rank(commit)?.into_iter().map(|c| c.name).collect())
    }
}

/// BFS distances from `tip` to every ancestor.
fn ancestry(repo: &Repository, tip: Oid) -> EngineResult<FxHashMap<Oid, u32>> {
    let mut seen: FxHashMap<Oid, u32> = FxHashMap::default();
    let mut queue = VecDeque::from([(tip, 0u32)]);
    seen.insert(tip, 0);
    while let Some((oid, dist)) = queue.pop_front() {
        for parent in parents_of(repo, oid)? {
            if !seen.contains_key(&parent) {
                seen.insert(parent, dist + 1);
                queue.push_back((parent, dist + 1));
            }
        }
    }
    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::branches::list_branches;
    use crate::test_support::TestRepo;
    use anyhow::Result;

    fn trunks() -> Vec<String> {
        DEFAULT_TRUNK_NAMES.iter().map(|s| s.to_string()).collect()
    }

    /// main: c1 - c2 - c3
    ///              \
    /// feature:      f1 - f2
    fn forked() -> Result<(TestRepo, [Oid; 5])> {
        let t = TestRepo::new()?;
        let c1 = t.commit("main", &[("a.txt", Some("1"))], "c1")?;
        let c2 = t.commit("main", &[("a.txt", Some("2"))], "c2")?;
        t.branch_at("feature", c2)?;
        let f1 = t.commit("feature", &[("f.txt", Some("f1"))], "f1")?;
        let f2 = t.commit("feature", &[("f.txt", Some("f2"))], "f2")?;
        let c3 = t.commit("main", &[("a.txt", Some("3"))], "c3")?;
        Ok((t, [c1, c2, c3, f1, f2]))
    }

    #[test]
    fn test_feature_only_commit() -> Result<()> {
        let (t, [_, _, _, f1, _]) = forked()?;
        let branches = list_branches(t.repo())?;
        let ranked = attribute_branches(t.repo(), f1, &branches, &trunks())?;
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "feature");
        assert_eq!(ranked[0].tier, AttributionTier::Feature);
        assert_eq!(ranked[0].distance, 1);
        Ok(())
    }

    #[test]
    fn test_shared_commit_prefers_feature_tier() -> Result<()> {
        let (t, [c1, ..]) = forked()?;
        let branches = list_branches(t.repo())?;
        let ranked = attribute_branches(t.repo(), c1, &branches, &trunks())?;
        let names: Vec<_> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["feature", "main"]);
        assert_eq!(ranked[1].tier, AttributionTier::Trunk);
        Ok(())
    }

    #[test]
    fn test_trunk_only_commit_goes_to_trunk() -> Result<()> {
        let (t, [_, _, c3, _, _]) = forked()?;
        t.remote_branch("origin/main", c3)?;
        let branches = list_branches(t.repo())?;
        let ranked = attribute_branches(t.repo(), c3, &branches, &trunks())?;
        let names: Vec<_> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["main", "origin/main"]);
        assert!(ranked.iter().all(|c| c.tier == AttributionTier::Trunk));
        Ok(())
    }

    #[test]
    fn test_tiers_and_distance_ordering() -> Result<()> {
        let (t, [c1, c2, _, f1, _]) = forked()?;
        t.branch_at("develop", c2)?;
        t.branch_at("hotfix", f1)?;
        t.remote_branch("origin/feature", c2)?;
        let branches = list_branches(t.repo())?;

        let ranked = attribute_branches(t.repo(), c1, &branches, &trunks())?;
        let order: Vec<_> = ranked.iter().map(|c| (c.name.as_str(), c.tier)).collect();
        assert_eq!(
            order,
            vec![
                // both feature tier; hotfix is 2 edges away, feature 3
                ("hotfix", AttributionTier::Feature),
                ("feature", AttributionTier::Feature),
                ("develop", AttributionTier::Local),
                ("origin/feature", AttributionTier::Remote),
                ("main", AttributionTier::Trunk),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_lexical_tie_break_is_deterministic() -> Result<()> {
        let (t, [_, c2, ..]) = forked()?;
        t.branch_at("zz-topic", c2)?;
        t.branch_at("aa-topic", c2)?;
        let branches = list_branches(t.repo())?;

        let first = attribute_branches(t.repo(), c2, &branches, &trunks())?;
        let second = attribute_branches(t.repo(), c2, &branches, &trunks())?;
        assert_eq!(first, second);
        assert_eq!(first[0].name, "aa-topic");
        assert_eq!(first[1].name, "zz-topic");
        Ok(())
    }

    #[test]
    fn test_cached_attributor_matches_one_shot() -> Result<()> {
        let (t, oids) = forked()?;
        t.remote_branch("origin/main", oids[1])?;
        let branches = list_branches(t.repo())?;
        let mut attributor = BranchAttributor::new(t.repo(), &branches, &trunks())?;

        for oid in oids {
            let cached = attributor.rank(oid)?;
            let direct = attribute_branches(t.repo(), oid, &branches, &trunks())?;
            assert_eq!(cached, direct);
        }
        assert_eq!(attributor.attribute(oids[4])?, vec!["feature".to_string()]);
        Ok(())
    }

    #[test]
    fn test_master_is_trunk_when_main_missing() -> Result<()> {
        let t = TestRepo::new()?;
        let c1 = t.commit("master", &[("a.txt", Some("1"))], "c1")?;
        t.branch_at("develop", c1)?;
        let branches = list_branches(t.repo())?;
        let ranked = attribute_branches(t.repo(), c1, &branches, &trunks())?;
        let order: Vec<_> = ranked.iter().map(|c| (c.name.as_str(), c.tier)).collect();
        assert_eq!(
            order,
            vec![
                ("develop", AttributionTier::Local),
                ("master", AttributionTier::Trunk)
            ]
        );
        Ok(())
    }
}
