//! User-level config location and config file scaffolding

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::project_config::{EXAMPLE_CONFIG, PROJECT_CONFIG_FILES};

/// `~/.config/gitpulse/config.toml` (platform config dir)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gitpulse").join("config.toml"))
}

/// Write an example `gitpulse.toml` into `repo_path` unless one already exists.
///
/// Returns the path of the (new or existing) file and whether it was created.
pub fn init_project_config(repo_path: &Path) -> Result<(PathBuf, bool)> {
    for name in PROJECT_CONFIG_FILES {
        let existing = repo_path.join(name);
        if existing.exists() {
            return Ok((existing, false));
        }
    }

    let path = repo_path.join(PROJECT_CONFIG_FILES[0]);
    std::fs::write(&path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok((path, true))
}
