//! External program execution under a deadline
//!
//! Every collaborator program (scorer, repair tool, metadata completer) runs
//! through `run_with_timeout`. The child is spawned with `kill_on_drop`, so
//! when the deadline fires and the wait future is dropped the process is
//! killed rather than left running.

use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Failure to obtain a completed process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Run `program args...` to completion, capturing stdout and stderr
pub async fn run_with_timeout<I, S>(
    program: &OsStr,
    args: I,
    timeout: Duration,
) -> Result<Output, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program_name = program.to_string_lossy().into_owned();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Launch {
            program: program_name.clone(),
            source,
        })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(ProcessError::Launch {
            program: program_name,
            source,
        }),
        Err(_elapsed) => {
            tracing::warn!(program = %program_name, ?timeout, "External program timed out");
            Err(ProcessError::Timeout {
                program: program_name,
                timeout,
            })
        }
    }
}

/// Last few hundred bytes of stderr, for diagnostics
pub fn stderr_tail(output: &Output) -> String {
    const MAX_CHARS: usize = 500;
    let text = String::from_utf8_lossy(&output.stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= MAX_CHARS {
        text.to_string()
    } else {
        text.chars().skip(count - MAX_CHARS).collect()
    }
}
