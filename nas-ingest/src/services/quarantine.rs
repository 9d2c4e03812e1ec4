//! Quarantine storage
//!
//! Defective files are moved here from the ingestion directory, keeping
//! their base name (numbered on collision). Quarantine only ever receives
//! files; nothing in the pipeline deletes or rewrites them.

use crate::error::{TriageError, TriageResult};
use crate::utils::fs_move::{move_no_clobber_async, numbered_name, split_file_name, MAX_NAME_ATTEMPTS};
use std::io;
use std::path::{Path, PathBuf};

pub struct Quarantine {
    dir: PathBuf,
}

impl Quarantine {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move `path` into quarantine and return its new location.
    ///
    /// On error the file is left where it was.
    pub async fn admit(&self, path: &Path) -> TriageResult<PathBuf> {
        let move_error = |source: io::Error| TriageError::QuarantineMove {
            path: path.to_path_buf(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(move_error)?;

        let (stem, extension) = split_file_name(path);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = self
                .dir
                .join(numbered_name(&stem, extension.as_deref(), attempt));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(true) {
                continue;
            }

            match move_no_clobber_async(path.to_path_buf(), candidate.clone()).await {
                Ok(()) => {
                    tracing::info!(
                        from = %path.display(),
                        to = %candidate.display(),
                        "File quarantined"
                    );
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(move_error(e)),
            }
        }

        Err(move_error(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name for {} in quarantine", stem),
        )))
    }
}
