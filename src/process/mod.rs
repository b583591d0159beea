use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Outcome of one external process invocation.
///
/// Exit codes are deliberately not part of the outcome: the wrapped tools are
/// unreliable reporters, so callers judge success by checking for the expected
/// output file after the call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    TimedOutAndKilled,
    LaunchFailed(String),
}

/// Run `command` with stdout and stderr merged into `log_file` (truncated, not
/// appended), waiting up to `timeout` wall-clock time.
///
/// On expiry the process is force-killed and reaped before this returns
/// `TimedOutAndKilled`; the log file is produced on every path that reaches a
/// successful spawn.
pub async fn run(command: &[String], log_file: &Path, timeout: Duration) -> ProcessOutcome {
    let Some((program, args)) = command.split_first() else {
        return ProcessOutcome::LaunchFailed("empty command line".to_string());
    };

    let log = match fs_err::File::create(log_file) {
        Ok(file) => file.into_parts().0,
        Err(err) => return ProcessOutcome::LaunchFailed(err.to_string()),
    };
    let log_clone = match log.try_clone() {
        Ok(clone) => clone,
        Err(err) => return ProcessOutcome::LaunchFailed(err.to_string()),
    };

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_clone))
        .spawn()
    {
        Ok(child) => child,
        Err(err) => return ProcessOutcome::LaunchFailed(err.to_string()),
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(_status)) => ProcessOutcome::Completed,
        Ok(Err(err)) => {
            tracing::warn!("waiting on {:?} failed: {}", program, err);
            ProcessOutcome::Completed
        }
        Err(_elapsed) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            ProcessOutcome::TimedOutAndKilled
        }
    }
}
