//! CLI command definitions and handlers

mod exec;
mod init;
mod inspect;
mod log;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gitpulse::config::load_config;
use gitpulse::git::WalkOrder;

fn parse_batch_size(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("batch size must be at least 1".to_string())
    } else {
        Ok(n)
    }
}

/// gitpulse - fast, streaming git history
#[derive(Parser, Debug)]
#[command(name = "gitpulse")]
#[command(
    version,
    about = "Stream git history straight from the object database",
    after_help = "\
Examples:
  gitpulse log --limit 20                 Newest 20 commits on the current branch
  gitpulse log --branch feature --files   Per-file stats for a feature branch
  gitpulse log --json                     NDJSON progress events for scripting
  gitpulse show HEAD~2                    Diff stats for one commit
  gitpulse attribute abc1234              Which branch a commit belongs to
  gitpulse exec cherry-pick abc1234       Delegate a mutation to git
  gitpulse serve                          Line-delimited JSON server on stdio"
)]
pub struct Cli {
    /// Path to repository (default: current directory)
    #[arg(long = "repo", short = 'C', global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream commits of a branch
    #[command(after_help = "\
Examples:
  gitpulse log                           Whole history of the current branch
  gitpulse log --skip 100 --limit 50     Commits 101-150
  gitpulse log --order date --branches   Date order with branch attribution")]
    Log {
        /// Branch to walk (default: current branch)
        #[arg(long, short = 'b')]
        branch: Option<String>,

        /// Commits to skip from the tip
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Maximum commits to load (0 = all)
        #[arg(long, short = 'n', default_value = "0")]
        limit: usize,

        /// Commits per streamed batch (default from config)
        #[arg(long, value_parser = parse_batch_size)]
        batch_size: Option<usize>,

        /// Include per-file diff stats
        #[arg(long)]
        files: bool,

        /// Attribute each commit to the branches containing it
        #[arg(long)]
        branches: bool,

        /// Walk order: topological or date (default from config)
        #[arg(long)]
        order: Option<WalkOrder>,

        /// Emit raw NDJSON progress events
        #[arg(long)]
        json: bool,
    },

    /// List local and remote branches
    Branches {
        #[arg(long)]
        json: bool,
    },

    /// Show diff stats for one commit
    Show {
        /// Commit hash or revision (HEAD~1, v1.2, ...)
        #[arg(default_value = "HEAD")]
        rev: String,

        #[arg(long)]
        json: bool,
    },

    /// Rank the branches a commit most plausibly belongs to
    Attribute {
        #[arg(default_value = "HEAD")]
        rev: String,

        #[arg(long)]
        json: bool,
    },

    /// Run a gateway operation (amend-message, cherry-pick, revert, custom-log, ...)
    #[command(after_help = "\
Examples:
  gitpulse exec amend-message \"Better subject\"
  gitpulse exec revert abc1234
  gitpulse exec custom-log -- --format=%h%x09%an -n 10")]
    Exec {
        operation: gitpulse::gateway::Operation,

        /// Arguments passed to the operation
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Serve line-delimited JSON requests on stdin/stdout
    Serve,

    /// Write an example gitpulse.toml into the repository
    Init,
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Log {
            ref branch,
            skip,
            limit,
            batch_size,
            files,
            branches,
            order,
            json,
        } => {
            let config = load_config(&cli.path);
            let options = log::LogOptions {
                branch: branch.clone(),
                skip,
                limit,
                batch_size,
                include_files: files.then_some(true),
                include_branches: branches,
                order,
                json,
            };
            log::run(&cli.path, &config, options)
        }
        Commands::Branches { json } => inspect::branches(&cli.path, json),
        Commands::Show { ref rev, json } => inspect::show(&cli.path, rev, json),
        Commands::Attribute { ref rev, json } => {
            let config = load_config(&cli.path);
            inspect::attribute(&cli.path, &config, rev, json)
        }
        Commands::Exec {
            operation,
            ref args,
        } => {
            let config = load_config(&cli.path);
            exec::run(&cli.path, &config, operation, args)
        }
        Commands::Serve => gitpulse::server::run_stdio(load_config(&cli.path)),
        Commands::Init => init::run(&cli.path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_size() {
        assert_eq!(parse_batch_size("25"), Ok(25));
        assert!(parse_batch_size("0").is_err());
        assert!(parse_batch_size("many").is_err());
    }

    #[test]
    fn test_log_flags() {
        let cli = Cli::try_parse_from([
            "gitpulse", "-C", "/tmp/repo", "log", "-b", "dev", "-n", "10", "--order", "date",
            "--files",
        ])
        .unwrap();
        assert_eq!(cli.path, PathBuf::from("/tmp/repo"));
        match cli.command {
            Commands::Log {
                branch,
                limit,
                order,
                files,
                ..
            } => {
                assert_eq!(branch.as_deref(), Some("dev"));
                assert_eq!(limit, 10);
                assert_eq!(order, Some(WalkOrder::Date));
                assert!(files);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_exec_keeps_hyphenated_args() {
        let cli = Cli::try_parse_from([
            "gitpulse",
            "exec",
            "custom-log",
            "--format=%h",
            "-n",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Exec { operation, args } => {
                assert_eq!(operation, gitpulse::gateway::Operation::CustomLog);
                assert_eq!(args, vec!["--format=%h", "-n", "3"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_operation_rejected() {
        assert!(Cli::try_parse_from(["gitpulse", "exec", "push"]).is_err());
    }
}
