//! Ingestion directory discovery
//!
//! Two producers feed the work queue:
//! - `sweep`: one recursive walk at startup, catching files that arrived
//!   while the service was down
//! - `watch`: recursive filesystem notifications for files created in or
//!   renamed into the directory; a new subdirectory is swept as a whole
//!
//! Watched paths wait for a settle delay before being queued so that a
//! writer still copying the file has time to finish. Duplicate delivery is
//! harmless: the ledger rejects paths it already knows.

use nas_common::{Error, Result};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub struct IngestWatcher {
    ingest_dir: PathBuf,
    /// Lower-cased, without leading dots
    extensions: Arc<[String]>,
    queue: mpsc::Sender<PathBuf>,
    settler: Settler,
}

/// Delays watched paths before queueing, one pending delay per path
#[derive(Clone)]
struct Settler {
    delay: Duration,
    queue: mpsc::Sender<PathBuf>,
    settling: Arc<Mutex<HashSet<PathBuf>>>,
}

impl IngestWatcher {
    pub fn new(
        ingest_dir: PathBuf,
        extensions: Vec<String>,
        settle_delay: Duration,
        queue: mpsc::Sender<PathBuf>,
    ) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        let settler = Settler {
            delay: settle_delay,
            queue: queue.clone(),
            settling: Arc::new(Mutex::new(HashSet::new())),
        };
        Self {
            ingest_dir,
            extensions,
            queue,
            settler,
        }
    }

    /// Case-insensitive extension allow-list check
    pub fn is_allowed(&self, path: &Path) -> bool {
        extension_allowed(&self.extensions, path)
    }

    /// Enqueue every allow-listed file under the ingestion directory.
    ///
    /// Waits for queue capacity, so a sweep larger than the queue applies
    /// backpressure instead of dropping paths. Returns the number queued.
    pub async fn sweep(&self) -> Result<usize> {
        let root = self.ingest_dir.clone();
        let extensions = Arc::clone(&self.extensions);
        let files = tokio::task::spawn_blocking(move || collect_files(&root, &extensions))
            .await
            .map_err(|e| Error::Internal(format!("Sweep task failed: {}", e)))?;

        let total = files.len();
        let mut queued = 0;
        for path in files {
            if self.queue.send(path).await.is_err() {
                warn!("Work queue closed during sweep");
                break;
            }
            queued += 1;
        }

        info!(
            dir = %self.ingest_dir.display(),
            found = total,
            queued,
            "Startup sweep complete"
        );
        Ok(queued)
    }

    /// Watch the ingestion directory until `shutdown` resolves
    pub async fn watch<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => error!("Watch error: {:?}", e),
            },
            Config::default(),
        )
        .map_err(|e| Error::Internal(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&self.ingest_dir, RecursiveMode::Recursive)
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to watch {}: {}",
                    self.ingest_dir.display(),
                    e
                ))
            })?;
        info!(dir = %self.ingest_dir.display(), "Watching ingestion directory");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Watcher stopping");
                    break;
                }
                event = event_rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
        }

        drop(watcher);
        Ok(())
    }

    /// Route one notification to settle-then-enqueue tasks
    fn dispatch(&self, event: Event) {
        for path in arrived_paths(&event) {
            if path.is_dir() {
                self.sweep_new_directory(path);
            } else if self.is_allowed(&path) {
                self.settler.settle_and_enqueue(path);
            }
        }
    }

    /// Walk a directory that appeared while watching, off the async runtime
    fn sweep_new_directory(&self, dir: PathBuf) {
        debug!(dir = %dir.display(), "New directory, sweeping");
        let extensions = Arc::clone(&self.extensions);
        let settler = self.settler.clone();
        tokio::spawn(async move {
            let root = dir.clone();
            match tokio::task::spawn_blocking(move || collect_files(&root, &extensions)).await {
                Ok(files) => {
                    for file in files {
                        settler.settle_and_enqueue(file);
                    }
                }
                Err(e) => error!(dir = %dir.display(), "New directory sweep failed: {}", e),
            }
        });
    }
}

impl Settler {
    fn settle_and_enqueue(&self, path: PathBuf) {
        {
            let Ok(mut settling) = self.settling.lock() else {
                return;
            };
            if !settling.insert(path.clone()) {
                return;
            }
        }

        let queue = self.queue.clone();
        let settling = Arc::clone(&self.settling);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(mut set) = settling.lock() {
                set.remove(&path);
            }
            if !path.exists() {
                debug!(path = %path.display(), "File gone before settle delay elapsed");
                return;
            }
            debug!(path = %path.display(), "Enqueueing settled file");
            if queue.send(path).await.is_err() {
                debug!("Work queue closed, dropping watched path");
            }
        });
    }
}

/// Paths a notification says have newly appeared
pub fn arrived_paths(event: &Event) -> Vec<PathBuf> {
    match &event.kind {
        EventKind::Create(CreateKind::File)
        | EventKind::Create(CreateKind::Folder)
        | EventKind::Create(CreateKind::Any)
        | EventKind::Create(CreateKind::Other) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        // Platforms that cannot pair rename halves report the new name as Any
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            event.paths.iter().filter(|p| p.exists()).cloned().collect()
        }
        _ => Vec::new(),
    }
}

fn extension_allowed(extensions: &[String], path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            extensions.iter().any(|allowed| *allowed == e)
        })
        .unwrap_or(false)
}

fn collect_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry during sweep");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| extension_allowed(extensions, path))
        .collect()
}
