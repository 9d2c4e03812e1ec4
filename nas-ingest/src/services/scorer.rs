//! Quality scoring
//!
//! The scorer itself is opaque: anything that maps a path to a badness
//! score in [0,1]. `fail_safe_score` is the only way the pipeline consults
//! it, and it never fails. Errors, panics and out-of-range values all become
//! 1.0, which classifies the file as dirty.

use crate::error::TriageError;
use crate::utils::process::{run_with_timeout, stderr_tail, ProcessError};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Score substituted whenever the scorer cannot be trusted
pub const FAIL_SAFE_SCORE: f64 = 1.0;

/// Scorer failures
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("scorer exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("unparsable scorer output: {0:?}")]
    Unparsable(String),

    #[error("{0}")]
    Other(String),
}

/// Audio quality scorer
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Badness score for `path`; higher is worse
    async fn score(&self, path: &Path) -> Result<f64, ScoringError>;
}

/// Score `path`, substituting 1.0 on any kind of failure
pub async fn fail_safe_score(scorer: &dyn Scorer, path: &Path) -> f64 {
    let result = AssertUnwindSafe(scorer.score(path)).catch_unwind().await;

    let reason = match result {
        Ok(Ok(score)) if score.is_finite() && (0.0..=1.0).contains(&score) => return score,
        Ok(Ok(score)) => format!("out-of-range score {}", score),
        Ok(Err(e)) => e.to_string(),
        Err(_panic) => "scorer panicked".to_string(),
    };

    let err = TriageError::Scoring {
        path: path.to_path_buf(),
        reason,
    };
    tracing::warn!(error = %err, "Using fail-safe score {}", FAIL_SAFE_SCORE);
    FAIL_SAFE_SCORE
}

/// Scorer backed by an external program.
///
/// Runs `<program> <args...> <path>` and reads the score from the last
/// non-empty line of stdout.
pub struct CommandScorer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandScorer {
    pub fn new(program: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Scorer for CommandScorer {
    async fn score(&self, path: &Path) -> Result<f64, ScoringError> {
        let mut args: Vec<&std::ffi::OsStr> = self.args.iter().map(|a| a.as_ref()).collect();
        args.push(path.as_os_str());

        let output = run_with_timeout(self.program.as_os_str(), args, self.timeout).await?;
        if !output.status.success() {
            return Err(ScoringError::ExitStatus {
                status: output.status.to_string(),
                stderr: stderr_tail(&output),
            });
        }

        parse_score(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the last non-empty line of scorer output
pub fn parse_score(stdout: &str) -> Result<f64, ScoringError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| ScoringError::Unparsable(String::new()))?;

    line.parse::<f64>()
        .map_err(|_| ScoringError::Unparsable(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    #[async_trait]
    impl Scorer for Fixed {
        async fn score(&self, _path: &Path) -> Result<f64, ScoringError> {
            Ok(self.0)
        }
    }

    struct Failing;

    #[async_trait]
    impl Scorer for Failing {
        async fn score(&self, _path: &Path) -> Result<f64, ScoringError> {
            Err(ScoringError::Other("model not loaded".to_string()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Scorer for Panicking {
        async fn score(&self, _path: &Path) -> Result<f64, ScoringError> {
            panic!("corrupt header");
        }
    }

    #[tokio::test]
    async fn test_valid_score_passes_through() {
        assert_eq!(fail_safe_score(&Fixed(0.2), Path::new("a.flac")).await, 0.2);
        assert_eq!(fail_safe_score(&Fixed(0.0), Path::new("a.flac")).await, 0.0);
        assert_eq!(fail_safe_score(&Fixed(1.0), Path::new("a.flac")).await, 1.0);
    }

    #[tokio::test]
    async fn test_invalid_scores_become_fail_safe() {
        for bad in [f64::NAN, f64::INFINITY, -0.1, 1.5] {
            assert_eq!(
                fail_safe_score(&Fixed(bad), Path::new("a.flac")).await,
                FAIL_SAFE_SCORE
            );
        }
    }

    #[tokio::test]
    async fn test_error_becomes_fail_safe() {
        assert_eq!(
            fail_safe_score(&Failing, Path::new("a.flac")).await,
            FAIL_SAFE_SCORE
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_fail_safe() {
        assert_eq!(
            fail_safe_score(&Panicking, Path::new("a.flac")).await,
            FAIL_SAFE_SCORE
        );
    }

    #[test]
    fn test_parse_score_uses_last_line() {
        assert_eq!(parse_score("loading model\n0.42\n\n").unwrap(), 0.42);
        assert!(parse_score("").is_err());
        assert!(parse_score("score: high").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_scorer_reads_stdout() {
        let scorer = CommandScorer::new(
            PathBuf::from("echo"),
            vec!["0.75".to_string()],
            Duration::from_secs(5),
        );
        // echo prints "0.75 <path>"; the last token is not a number
        assert!(scorer.score(Path::new("x.flac")).await.is_err());

        let scorer = CommandScorer::new(
            PathBuf::from("sh"),
            vec!["-c".to_string(), "echo 0.75".to_string()],
            Duration::from_secs(5),
        );
        assert_eq!(scorer.score(Path::new("x.flac")).await.unwrap(), 0.75);
    }
}
