use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_stream::Stream;

use crate::error::{EngineError, Result};
use crate::reader::{list_headers, read_headers_from, LineCursor};
use crate::types::EventHeader;
use crate::watcher::FileWatcher;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const BATCH_BUFFER: usize = 16;

/// Delivers headers for lines appended to one session's events file.
///
/// The watermark is the highest line already delivered; a tick only ever
/// yields lines above it, in file order, and advances it in the same call.
#[derive(Debug)]
pub struct TailDispatcher {
    session_id: String,
    path: PathBuf,
    cursor: LineCursor,
    watermark: u64,
}

impl TailDispatcher {
    /// Start after `watermark`, typically the last line a consumer already
    /// holds.
    pub fn new(session_id: impl Into<String>, path: PathBuf, watermark: u64) -> Self {
        Self {
            session_id: session_id.into(),
            path,
            cursor: LineCursor::default(),
            watermark,
        }
    }

    /// Start after the last line currently in the file. A file that does not
    /// exist yet starts at watermark 0.
    pub fn from_current(session_id: impl Into<String>, path: PathBuf) -> Result<Self> {
        let watermark = match list_headers(&path) {
            Ok(headers) => headers.last().map(|h| h.line).unwrap_or(0),
            Err(EngineError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        Ok(Self::new(session_id, path, watermark))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Read newly completed lines and return the headers above the
    /// watermark. An empty batch means nothing new.
    pub fn tick(&mut self) -> Result<Vec<EventHeader>> {
        let len = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            // Not created yet; the session may still be starting.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::read(&self.path, e)),
        };

        if len < self.cursor.offset {
            tracing::warn!(
                "{:?} shrank from {} to {} bytes; rereading without lowering the watermark",
                self.path,
                self.cursor.offset,
                len
            );
            self.cursor = LineCursor::default();
        }
        if len == self.cursor.offset {
            return Ok(Vec::new());
        }

        let (headers, cursor) = read_headers_from(&self.path, self.cursor, true)?;
        self.cursor = cursor;

        let batch: Vec<EventHeader> = headers
            .into_iter()
            .filter(|h| h.line > self.watermark)
            .collect();
        if let Some(last) = batch.last() {
            self.watermark = last.line;
        }
        Ok(batch)
    }

    /// Run the dispatcher on the runtime, polling every `poll_interval` and
    /// waking early on file change notifications when a watcher is available.
    pub fn subscribe(self, poll_interval: Duration) -> Subscription {
        let (tx, rx) = mpsc::channel(BATCH_BUFFER);
        let session_id = self.session_id.clone();
        let handle = tokio::spawn(run(self, poll_interval, tx));
        Subscription {
            session_id,
            rx,
            handle,
        }
    }
}

async fn run(
    mut dispatcher: TailDispatcher,
    poll_interval: Duration,
    tx: mpsc::Sender<Vec<EventHeader>>,
) {
    let (_watcher, mut changes) = match FileWatcher::new(&dispatcher.path) {
        Ok((watcher, changes)) => (Some(watcher), Some(changes)),
        Err(e) => {
            tracing::warn!("Falling back to polling for {}: {}", dispatcher.session_id, e);
            (None, None)
        }
    };

    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            Some(()) = next_change(&mut changes) => {}
            _ = tx.closed() => break,
        }

        let joined = tokio::task::spawn_blocking(move || {
            let result = dispatcher.tick();
            (dispatcher, result)
        })
        .await;
        let (returned, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("Tail task failed: {}", e);
                return;
            }
        };
        dispatcher = returned;

        match result {
            Ok(batch) if batch.is_empty() => {}
            Ok(batch) => {
                tracing::debug!(
                    "Delivering {} new events for {} (watermark {})",
                    batch.len(),
                    dispatcher.session_id,
                    dispatcher.watermark
                );
                if tx.send(batch).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Tail read failed for {}: {}", dispatcher.session_id, e),
        }
    }

    tracing::debug!("Tail subscription for {} ended", dispatcher.session_id);
}

async fn next_change(changes: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// A live stream of header batches for one session. Dropping it stops the
/// dispatcher and releases its file watcher.
pub struct Subscription {
    session_id: String,
    rx: mpsc::Receiver<Vec<EventHeader>>,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next batch, or `Err(Transport)` once the dispatcher has stopped.
    pub async fn next_batch(&mut self) -> Result<Vec<EventHeader>> {
        self.rx.recv().await.ok_or(EngineError::Transport)
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Stream for Subscription {
    type Item = Vec<EventHeader>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Keeps at most one live subscription per viewer. Registering a new one
/// aborts the one it supersedes.
#[derive(Clone, Default)]
pub struct TailRegistry {
    active: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl TailRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, viewer_id: &str, subscription: &Subscription) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = active.insert(viewer_id.to_string(), subscription.abort_handle()) {
            tracing::debug!("Superseding live subscription for viewer {}", viewer_id);
            previous.abort();
        }
    }

    /// Number of viewers with a running subscription.
    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}
