//! Engine configuration
//!
//! Loaded in layers, later layers winning key by key:
//!
//! 1. Built-in defaults
//! 2. User config (`~/.config/gitpulse/config.toml`)
//! 3. Project config (`gitpulse.toml` or `.gitpulse.toml` in the repository root)
//! 4. Environment (`GITPULSE_BATCH_SIZE`, `GITPULSE_GIT_BIN`)
//!
//! # Configuration Format
//!
//! ```toml
//! [load]
//! batch_size = 50
//! include_files = false
//! order = "topological"   # or "date"
//! estimate_cap = 100000
//! event_buffer = 4
//!
//! [branches]
//! trunk_names = ["main", "master", "develop", "trunk"]
//!
//! [external]
//! git_binary = "git"
//! timeout_secs = 120
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::user_config::user_config_path;
use crate::git::{WalkOrder, DEFAULT_TRUNK_NAMES};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Project config file names, in lookup order
pub const PROJECT_CONFIG_FILES: &[&str] = &["gitpulse.toml", ".gitpulse.toml"];

pub const EXAMPLE_CONFIG: &str = r#"# gitpulse configuration

[load]
# Commits per streamed Data event
batch_size = 50
# Compute per-file diff stats while loading (slower on large trees)
include_files = false
# "topological" (children before parents) or "date"
order = "topological"
# Maximum commits counted for the Start event's estimate (0 = exact count)
estimate_cap = 100000
# Batches buffered between the walker and a slow consumer
event_buffer = 4

[branches]
# Names treated as trunk when attributing commits to branches
trunk_names = ["main", "master", "develop", "trunk"]

[external]
# git binary used for amend / cherry-pick / revert / custom log
git_binary = "git"
# Seconds before an external command is killed (0 = no timeout)
timeout_secs = 120
"#;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub branches: BranchConfig,
    #[serde(default)]
    pub external: ExternalConfig,
}

/// Defaults for load sessions
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoadConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub include_files: bool,
    #[serde(default)]
    pub order: WalkOrder,
    #[serde(default = "default_estimate_cap")]
    pub estimate_cap: usize,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            include_files: false,
            order: WalkOrder::default(),
            estimate_cap: default_estimate_cap(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_estimate_cap() -> usize {
    100_000
}
fn default_event_buffer() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BranchConfig {
    #[serde(default = "default_trunk_names")]
    pub trunk_names: Vec<String>,
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            trunk_names: default_trunk_names(),
        }
    }
}

fn default_trunk_names() -> Vec<String> {
    DEFAULT_TRUNK_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Settings for the external git fallback
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExternalConfig {
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            git_binary: default_git_binary(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_git_binary() -> String {
    "git".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

impl EngineConfig {
    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("GITPULSE_BATCH_SIZE") {
            match raw.parse::<usize>() {
                Ok(size) => self.load.batch_size = size,
                Err(_) => warn!("Ignoring GITPULSE_BATCH_SIZE={:?}: not a number", raw),
            }
        }
        if let Some(bin) = lookup("GITPULSE_GIT_BIN").filter(|b| !b.trim().is_empty()) {
            self.external.git_binary = bin;
        }
    }

    /// Replace values that would stall a session.
    pub fn normalize(&mut self) {
        if self.load.batch_size == 0 {
            warn!("batch_size must be at least 1, using {}", DEFAULT_BATCH_SIZE);
            self.load.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.load.event_buffer == 0 {
            self.load.event_buffer = default_event_buffer();
        }
        if self.branches.trunk_names.is_empty() {
            self.branches.trunk_names = default_trunk_names();
        }
    }
}

/// Load the effective configuration for a repository.
pub fn load_config(repo_path: &Path) -> EngineConfig {
    let user = user_config_path().filter(|p| p.exists());
    let mut config = load_layers(user.as_deref(), repo_path);
    config.apply_env(|key| std::env::var(key).ok());
    config.normalize();
    config
}

/// Merge the user file and the first project file found, without env overrides.
fn load_layers(user_path: Option<&Path>, repo_path: &Path) -> EngineConfig {
    let mut merged = toml::Table::new();

    if let Some(path) = user_path {
        merge_file(&mut merged, path);
    }
    for name in PROJECT_CONFIG_FILES {
        let path = repo_path.join(name);
        if path.exists() {
            merge_file(&mut merged, &path);
            break;
        }
    }

    match toml::Value::Table(merged).try_into::<EngineConfig>() {
        Ok(config) => config,
        Err(e) => {
            warn!("Invalid gitpulse configuration, using defaults: {}", e);
            EngineConfig::default()
        }
    }
}

fn merge_file(merged: &mut toml::Table, path: &Path) {
    match read_table(path) {
        Ok(table) => {
            debug!("Loaded config from {}", path.display());
            merge_tables(merged, table);
        }
        Err(e) => warn!("Failed to load {}: {}", path.display(), e),
    }
}

fn read_table(path: &Path) -> anyhow::Result<toml::Table> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Deep-merge `overlay` into `base`; nested tables merge, everything else replaces.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
