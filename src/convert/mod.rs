use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::process::{self, ProcessOutcome};

/// Wrapper around the external audio converter (ffmpeg by default).
///
/// The contract is file-based: after `convert` returns, either the output path
/// exists (success) or it does not; callers never interpret exit codes.
pub struct Converter {
    program: String,
}

impl Converter {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }

    /// Use a different converter binary; tests point this at stub scripts.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check whether the converter binary is runnable.
    pub async fn installed(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Convert `input` into `output`, capturing converter output in `log_file`.
    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
        log_file: &Path,
        timeout: Duration,
    ) -> ProcessOutcome {
        let command = vec![
            self.program.clone(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        process::run(&command, log_file, timeout).await
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}
