//! Metadata completion for clean files

use crate::error::{TriageError, TriageResult};
use crate::utils::process::{run_with_timeout, stderr_tail};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

/// External metadata completer
#[async_trait]
pub trait MetadataCompletionInvoker: Send + Sync {
    /// Complete tags for `path`.
    ///
    /// `Ok(true)` on success, `Ok(false)` when the completer ran but reported
    /// failure; `Err` when it could not be run at all.
    async fn complete(&self, path: &Path) -> TriageResult<bool>;
}

/// Invokes `<program> <args...> <absolute path>`; exit status 0 is success
pub struct CommandMetadataInvoker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandMetadataInvoker {
    pub fn new(program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }
}

#[async_trait]
impl MetadataCompletionInvoker for CommandMetadataInvoker {
    async fn complete(&self, path: &Path) -> TriageResult<bool> {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.push(absolute.into_os_string());

        let output = run_with_timeout(self.program.as_ref(), args, self.timeout)
            .await
            .map_err(|e| TriageError::MetadataInvocation {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(true)
        } else {
            tracing::warn!(
                path = %path.display(),
                status = %output.status,
                stderr = %stderr_tail(&output),
                "Metadata completer reported failure"
            );
            Ok(false)
        }
    }
}
