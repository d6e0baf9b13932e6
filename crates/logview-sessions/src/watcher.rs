use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{EngineError, Result};

/// Watches a single events file and signals when it is created or written.
///
/// Signals are coalesced: at most one is pending at a time, and receivers
/// re-read the file rather than trusting the notification payload.
pub struct FileWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Start watching `path`. The parent directory is watched so the file may
    /// be created after the watch begins.
    pub fn new(path: &Path) -> Result<(Self, mpsc::Receiver<()>)> {
        let (tx, rx) = mpsc::channel(1);
        let target = path.to_path_buf();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let watched = target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                Self::handle_event(&tx, &watched, &event);
            }
        })
        .map_err(|e| EngineError::read(&dir, std::io::Error::other(e)))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| EngineError::read(&dir, std::io::Error::other(e)))?;

        Ok((
            Self {
                path: target,
                _watcher: watcher,
            },
            rx,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle_event(tx: &mpsc::Sender<()>, target: &Path, event: &Event) {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        // Only the parent directory is watched, so the file name identifies
        // the target even when the backend reports canonicalized paths.
        if event.paths.iter().any(|p| p.file_name() == target.file_name()) {
            // Full channel means a wake-up is already pending.
            let _ = tx.try_send(());
        }
    }
}
