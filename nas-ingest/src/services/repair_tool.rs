//! External repair tool
//!
//! The repair tool writes a cleaned copy of `source` to `destination`; it
//! never touches the source. The default implementation drives ffmpeg's FFT
//! denoiser and always encodes FLAC.

use crate::error::{TriageError, TriageResult};
use crate::utils::process::{run_with_timeout, stderr_tail};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

/// Upper bound on the `-version` availability check
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// What the repair tool reported
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub success: bool,
    pub diagnostic: String,
}

impl RepairOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            diagnostic: String::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Noise-reduction tool
#[async_trait]
pub trait RepairTool: Send + Sync {
    /// Write a repaired copy of `source` to `destination`.
    ///
    /// Failures (non-zero exit, timeout, launch error) are reported through
    /// `RepairOutcome`, never as a panic or error.
    async fn repair(&self, source: &Path, destination: &Path, strength_db: f64) -> RepairOutcome;
}

/// ffmpeg `afftdn` denoiser
pub struct FfmpegDenoiser {
    program: String,
    timeout: Duration,
}

impl FfmpegDenoiser {
    /// Create the denoiser after checking the program runs.
    ///
    /// Returns `TriageError::RepairToolUnavailable` when `<program> -version`
    /// cannot be executed, fails, or does not answer within the check timeout
    /// (the repair timeout, at most 10 seconds).
    pub async fn new(program: &str, timeout: Duration) -> TriageResult<Self> {
        let check_timeout = timeout.min(VERSION_CHECK_TIMEOUT);
        match run_with_timeout(program.as_ref(), ["-version"], check_timeout).await {
            Ok(output) if output.status.success() => {
                let banner = String::from_utf8_lossy(&output.stdout);
                tracing::info!(
                    program,
                    version = banner.lines().next().unwrap_or(""),
                    "Repair tool available"
                );
                Ok(Self {
                    program: program.to_string(),
                    timeout,
                })
            }
            Ok(output) => Err(TriageError::RepairToolUnavailable(format!(
                "{} -version exited with {}",
                program, output.status
            ))),
            Err(e) => Err(TriageError::RepairToolUnavailable(e.to_string())),
        }
    }

    /// Arguments for one denoise run
    pub fn build_args(source: &Path, destination: &Path, strength_db: f64) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            source.as_os_str().to_os_string(),
            "-af".into(),
            format!("afftdn=nr={}:nf=-25:tn=1", strength_db).into(),
            "-c:a".into(),
            "flac".into(),
            destination.as_os_str().to_os_string(),
        ]
    }
}

#[async_trait]
impl RepairTool for FfmpegDenoiser {
    async fn repair(&self, source: &Path, destination: &Path, strength_db: f64) -> RepairOutcome {
        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            strength_db,
            "Running denoiser"
        );

        let args = Self::build_args(source, destination, strength_db);
        match run_with_timeout(self.program.as_ref(), args, self.timeout).await {
            Ok(output) if output.status.success() => RepairOutcome::succeeded(),
            Ok(output) => RepairOutcome::failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr_tail(&output)
            )),
            Err(e) => RepairOutcome::failed(e.to_string()),
        }
    }
}
