//! No-clobber file moves
//!
//! Moves never overwrite an existing destination. Within one filesystem the
//! move is a hard link followed by unlinking the source, which fails
//! atomically with `AlreadyExists` when the destination is taken. Across
//! filesystems (or where hard links are unsupported) the content is copied
//! into a freshly created file, flushed to disk, and only then is the source
//! removed.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Upper bound on `_N` suffixes tried before giving up on a name
pub const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Move `src` to `dst`, failing with `AlreadyExists` if `dst` exists
pub fn move_no_clobber(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::hard_link(src, dst) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(src) {
                // Roll back so the file exists exactly once
                let _ = fs::remove_file(dst);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(link_err) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                error = %link_err,
                "Hard link unavailable, falling back to copy"
            );
            copy_no_clobber(src, dst)?;
            if let Err(e) = fs::remove_file(src) {
                let _ = fs::remove_file(dst);
                return Err(e);
            }
            Ok(())
        }
    }
}

fn copy_no_clobber(src: &Path, dst: &Path) -> io::Result<()> {
    let mut input = File::open(src)?;
    let mut output = OpenOptions::new().write(true).create_new(true).open(dst)?;

    let result = io::copy(&mut input, &mut output).and_then(|_| output.sync_all());
    if let Err(e) = result {
        drop(output);
        let _ = fs::remove_file(dst);
        return Err(e);
    }

    if let Ok(metadata) = input.metadata() {
        let _ = fs::set_permissions(dst, metadata.permissions());
    }
    Ok(())
}

/// Async wrapper running the move on the blocking pool
pub async fn move_no_clobber_async(src: PathBuf, dst: PathBuf) -> io::Result<()> {
    tokio::task::spawn_blocking(move || move_no_clobber(&src, &dst))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("move task failed: {}", e)))?
}

/// Candidate file name: `stem.ext` for attempt 0, `stem_N.ext` afterwards
pub fn numbered_name(stem: &str, extension: Option<&str>, attempt: u32) -> String {
    let stem = if attempt == 0 {
        stem.to_string()
    } else {
        format!("{}_{}", stem, attempt)
    };
    match extension {
        Some(ext) if !ext.is_empty() => format!("{}.{}", stem, ext),
        _ => stem,
    }
}

/// Split a path's file name into (stem, extension) as owned strings
pub fn split_file_name(path: &Path) -> (String, Option<String>) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    (stem, extension)
}
