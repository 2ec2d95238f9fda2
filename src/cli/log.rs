//! Log command - stream a branch's history to the terminal

use anyhow::{bail, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gitpulse::config::EngineConfig;
use gitpulse::git::WalkOrder;
use gitpulse::models::{Commit, LoadRequest, ProgressEvent};
use gitpulse::session::{CancellationToken, CursorStore, LoadSession, SessionOutcome};

pub struct LogOptions {
    pub branch: Option<String>,
    pub skip: usize,
    pub limit: usize,
    pub batch_size: Option<usize>,
    pub include_files: Option<bool>,
    pub include_branches: bool,
    pub order: Option<WalkOrder>,
    pub json: bool,
}

impl LogOptions {
    fn request(&self, path: &Path) -> LoadRequest {
        let mut request = LoadRequest::new(path)
            .skip(self.skip)
            .limit(self.limit)
            .include_branches(self.include_branches);
        if let Some(branch) = &self.branch {
            request = request.branch(branch.clone());
        }
        if let Some(include) = self.include_files {
            request = request.include_files(include);
        }
        if let Some(size) = self.batch_size {
            request = request.batch_size(size);
        }
        if let Some(order) = self.order {
            request = request.order(order);
        }
        request
    }
}

fn create_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Run the log command
pub fn run(path: &Path, config: &EngineConfig, options: LogOptions) -> Result<()> {
    let (tx, rx) = crossbeam_channel::bounded(config.load.event_buffer.max(1));
    let mut session = LoadSession::new(
        "cli",
        options.request(path),
        config,
        Arc::new(CursorStore::new()),
        CancellationToken::new(),
    );
    let producer = std::thread::spawn(move || {
        let mut tx = tx;
        session.run(&mut tx)
    });

    let spinner = (!options.json).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(create_spinner_style());
        spinner.set_message("Reading history...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    });

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut estimate = 0;
    let mut seen = 0;
    for event in rx {
        if options.json {
            serde_json::to_writer(&mut out, &event)?;
            writeln!(out)?;
            continue;
        }
        match event {
            ProgressEvent::Start { total_estimate, .. } => estimate = total_estimate,
            ProgressEvent::Data { commits, .. } => {
                seen += commits.len();
                if let Some(spinner) = &spinner {
                    spinner.set_message(format!("Loaded {} of ~{} commits", seen, estimate));
                    spinner.suspend(|| print_commits(&mut out, &commits))?;
                }
            }
            ProgressEvent::End { total_loaded } => {
                if let Some(spinner) = &spinner {
                    spinner.finish_and_clear();
                }
                eprintln!("{} {} commits", style("✓").green(), style(total_loaded).cyan());
            }
            ProgressEvent::Error { .. } => {
                if let Some(spinner) = &spinner {
                    spinner.finish_and_clear();
                }
            }
        }
    }
    out.flush()?;

    match producer.join() {
        Ok(SessionOutcome::Failed { kind, message }) => bail!("{} ({})", message, kind),
        Ok(_) => Ok(()),
        Err(_) => bail!("history reader thread panicked"),
    }
}

fn print_commits(out: &mut impl Write, commits: &[Commit]) -> io::Result<()> {
    for commit in commits {
        let mut refs: Vec<String> = Vec::new();
        if let Some(tags) = &commit.tags {
            refs.extend(tags.iter().map(|t| format!("tag: {}", t)));
        }
        if let Some(branches) = &commit.branches {
            refs.extend(branches.iter().take(3).cloned());
        }
        let refs = if refs.is_empty() {
            String::new()
        } else {
            format!(" {}", style(format!("({})", refs.join(", "))).cyan())
        };
        let stats = commit
            .stats
            .map(|s| {
                format!(
                    " {} {}",
                    style(format!("+{}", s.additions)).green(),
                    style(format!("-{}", s.deletions)).red()
                )
            })
            .unwrap_or_default();

        writeln!(
            out,
            "{}{} {} {}{}",
            style(commit.short_hash()).yellow(),
            refs,
            commit.summary,
            style(format!("<{}> {}", commit.author_name, commit.authored_at.format("%Y-%m-%d"))).dim(),
            stats
        )?;

        if let Some(files) = &commit.files {
            for file in files {
                let counts = if file.binary {
                    style("binary".to_string()).dim()
                } else {
                    style(format!("+{} -{}", file.additions, file.deletions)).dim()
                };
                writeln!(out, "    {} {} {}", file.status, file.path, counts)?;
            }
        }
    }
    Ok(())
}
