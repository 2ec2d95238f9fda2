//! Init command - write an example gitpulse.toml

use anyhow::Result;
use console::style;
use std::path::Path;

use gitpulse::config::init_project_config;

/// Run the init command
pub fn run(path: &Path) -> Result<()> {
    let (config_path, created) = init_project_config(path)?;
    if created {
        println!(
            "{} Created {}",
            style("✓").green(),
            style(config_path.display()).cyan()
        );
    } else {
        println!(
            "{} Already configured at {}",
            style("✓").green(),
            style(config_path.display()).cyan()
        );
    }
    Ok(())
}
