//! Exec command - run one gateway operation

use anyhow::Result;
use console::style;
use std::io::Write;
use std::path::Path;

use gitpulse::config::EngineConfig;
use gitpulse::error::EngineError;
use gitpulse::gateway::{Operation, OperationRequest, OperationRouter};

/// Run the operation and pass its output through unchanged. A failing
/// external tool ends the process with that tool's exit code.
pub fn run(path: &Path, config: &EngineConfig, operation: Operation, args: &[String]) -> Result<()> {
    let router = OperationRouter::new(config);
    let request = OperationRequest::new(operation, path).args(args.iter().cloned());

    match router.invoke(&request) {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(output.stdout.as_bytes())?;
            stdout.flush()?;
            if !output.stderr.is_empty() {
                eprint!("{}", output.stderr);
            }
            Ok(())
        }
        Err(EngineError::ExternalToolError { exit_code, stderr }) => {
            eprint!("{}", stderr);
            eprintln!(
                "{} {} failed{}",
                style("✗").red(),
                operation,
                exit_code
                    .map(|code| format!(" with exit code {}", code))
                    .unwrap_or_default()
            );
            std::process::exit(exit_code.filter(|code| *code != 0).unwrap_or(1));
        }
        Err(e) => Err(e.into()),
    }
}
