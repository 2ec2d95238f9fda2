//! Configuration module for gitpulse
//!
//! This module handles:
//! - Project-level configuration (gitpulse.toml in the repository root)
//! - User-level configuration (~/.config/gitpulse/config.toml)
//! - Environment overrides for batch size and the external git binary

mod project_config;
mod user_config;

pub use project_config::{
    load_config, BranchConfig, EngineConfig, ExternalConfig, LoadConfig, DEFAULT_BATCH_SIZE,
    EXAMPLE_CONFIG, PROJECT_CONFIG_FILES,
};
pub use user_config::{init_project_config, user_config_path};
