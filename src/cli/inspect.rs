//! One-shot queries: branches, show, attribute

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::path::Path;

use gitpulse::config::EngineConfig;
use gitpulse::git::{
    attribute_branches, diff_commit, list_branches, resolve_commit, AttributionTier, RepoHandle,
};

fn open(path: &Path) -> Result<git2::Repository> {
    let handle = RepoHandle::open(path)
        .with_context(|| format!("Cannot open repository at {}", path.display()))?;
    Ok(handle.open_repo()?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn branches(path: &Path, json: bool) -> Result<()> {
    let repo = open(path)?;
    let branches = list_branches(&repo)?;
    if json {
        return print_json(&branches);
    }

    for branch in &branches {
        let marker = if branch.is_current { "*" } else { " " };
        let name = if branch.is_remote {
            style(branch.name.as_str()).red()
        } else if branch.is_current {
            style(branch.name.as_str()).green().bold()
        } else {
            style(branch.name.as_str())
        };
        println!(
            "{} {} {}",
            marker,
            name,
            style(&branch.tip[..branch.tip.len().min(12)]).dim()
        );
    }
    Ok(())
}

pub fn show(path: &Path, rev: &str, json: bool) -> Result<()> {
    let repo = open(path)?;
    let oid = resolve_commit(&repo, rev)?;
    let diff = diff_commit(&repo, oid)?;
    if json {
        return print_json(&diff);
    }

    println!(
        "{} {} files changed, {} insertions, {} deletions",
        style(&oid.to_string()[..12]).yellow(),
        style(diff.stats.files_count).cyan(),
        style(format!("+{}", diff.stats.additions)).green(),
        style(format!("-{}", diff.stats.deletions)).red()
    );
    for file in &diff.files {
        let path = match &file.old_path {
            Some(old) => format!("{} -> {}", old, file.path),
            None => file.path.clone(),
        };
        if file.binary {
            println!("  {} {} {}", file.status, path, style("binary").dim());
        } else {
            println!(
                "  {} {} {} {}",
                file.status,
                path,
                style(format!("+{}", file.additions)).green(),
                style(format!("-{}", file.deletions)).red()
            );
        }
    }
    Ok(())
}

pub fn attribute(path: &Path, config: &EngineConfig, rev: &str, json: bool) -> Result<()> {
    let repo = open(path)?;
    let oid = resolve_commit(&repo, rev)?;
    let branches = list_branches(&repo)?;
    let ranked = attribute_branches(&repo, oid, &branches, &config.branches.trunk_names)?;
    if json {
        return print_json(&ranked);
    }

    if ranked.is_empty() {
        println!("{} not reachable from any branch", style(rev).yellow());
        return Ok(());
    }
    for (i, candidate) in ranked.iter().enumerate() {
        let tier = match candidate.tier {
            AttributionTier::Feature => style("feature").magenta(),
            AttributionTier::Local => style("local").blue(),
            AttributionTier::Remote => style("remote").red(),
            AttributionTier::Trunk => style("trunk").green(),
        };
        println!(
            "{:>2}. {} [{}] {} commits below tip",
            i + 1,
            style(&candidate.name).bold(),
            tier,
            candidate.distance
        );
    }
    Ok(())
}
