//! Operations delegated to an installed `git` binary
//!
//! Output is passed through untouched. A non-zero exit, a missing binary or a
//! timeout all surface as [`EngineError::ExternalToolError`]; nothing is
//! retried.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{Capability, Operation, OperationOutput, OperationRequest};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::git::RepoHandle;

/// Keeps git from opening an editor or prompting for credentials.
const GIT_ENV: &[(&str, &str)] = &[
    ("GIT_TERMINAL_PROMPT", "0"),
    ("GIT_EDITOR", "true"),
    ("GIT_PAGER", "cat"),
];

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ExternalBackend {
    git_binary: String,
    timeout_secs: u64,
}

impl ExternalBackend {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            git_binary: config.external.git_binary.clone(),
            timeout_secs: config.external.timeout_secs,
        }
    }

    /// git arguments for an operation, before the caller's own.
    fn git_args(operation: Operation, args: &[String]) -> EngineResult<Vec<String>> {
        let mut git_args: Vec<String> = match operation {
            Operation::AmendMessage => {
                let [message] = args else {
                    return Err(EngineError::InvalidArgument(
                        "amend-message takes exactly one message".to_string(),
                    ));
                };
                return Ok(vec![
                    "commit".into(),
                    "--amend".into(),
                    "--only".into(),
                    "--allow-empty".into(),
                    "-m".into(),
                    message.clone(),
                ]);
            }
            Operation::CherryPick => vec!["cherry-pick".into()],
            Operation::Revert => vec!["revert".into(), "--no-edit".into()],
            Operation::CustomLog => vec!["--no-pager".into(), "log".into(), "--no-color".into()],
            other => return Err(EngineError::Unsupported(other.name().to_string())),
        };
        if matches!(operation, Operation::CherryPick | Operation::Revert) && args.is_empty() {
            return Err(EngineError::InvalidArgument(format!(
                "{} needs at least one commit",
                operation
            )));
        }
        git_args.extend(args.iter().cloned());
        Ok(git_args)
    }
}

impl Capability for ExternalBackend {
    fn name(&self) -> &'static str {
        "external"
    }

    fn supports(&self, operation: Operation) -> bool {
        matches!(
            operation,
            Operation::AmendMessage | Operation::CherryPick | Operation::Revert | Operation::CustomLog
        )
    }

    fn invoke(&self, request: &OperationRequest) -> EngineResult<OperationOutput> {
        let handle = RepoHandle::open(&request.repo_path)?;
        let args = Self::git_args(request.operation, &request.args)?;
        run_command(
            &self.git_binary,
            &args,
            handle.command_dir(),
            self.timeout_secs,
            GIT_ENV,
        )
    }
}

/// Run `program` to completion in `cwd`.
///
/// `timeout_secs == 0` waits indefinitely. Both pipes are drained on their
/// own threads so a chatty child never blocks on a full pipe.
pub fn run_command(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout_secs: u64,
    env: &[(&str, &str)],
) -> EngineResult<OperationOutput> {
    debug!("Running {} {:?} in {:?}", program, args, cwd);

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|e| {
        let stderr = if e.kind() == std::io::ErrorKind::NotFound {
            format!("{} not found. Please install it first.", program)
        } else {
            format!("Failed to run {}: {}", program, e)
        };
        EngineError::ExternalToolError {
            exit_code: None,
            stderr,
        }
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let status = wait(&mut child, program, timeout_secs)?;
    let stdout = collect(stdout);
    let stderr = collect(stderr);

    match status.code() {
        Some(0) => Ok(OperationOutput {
            stdout,
            stderr,
            exit_code: 0,
        }),
        exit_code => {
            debug!("{} exited with {:?}", program, exit_code);
            Err(EngineError::ExternalToolError { exit_code, stderr })
        }
    }
}

fn wait(child: &mut Child, program: &str, timeout_secs: u64) -> EngineResult<ExitStatus> {
    if timeout_secs == 0 {
        return Ok(child.wait()?);
    }

    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            warn!("{} timed out after {}s", program, timeout_secs);
            return Err(EngineError::ExternalToolError {
                exit_code: None,
                stderr: format!("{} timed out after {}s", program, timeout_secs),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
