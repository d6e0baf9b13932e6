use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::range::{parse_timestamp, DateRange};
use crate::types::{Project, Session, SessionMetadata};

/// Snapshots older than this are rebuilt before being served.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(3);

const SESSIONS_DIR: &str = "sessions";

/// Counters from the most recent directory walk.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanStats {
    pub sessions_scanned: usize,
    pub sessions_cached: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
struct ProjectEntry {
    slug: String,
    path: PathBuf,
    sessions: Vec<Session>,
}

/// Immutable project -> sessions hierarchy captured by one scan.
///
/// The initial snapshot is empty and has never been captured, so its age is
/// treated as infinite and the first read always triggers a scan.
#[derive(Debug, Default)]
pub struct SessionHierarchySnapshot {
    projects: Vec<ProjectEntry>,
    index: HashMap<String, (usize, usize)>,
    children: HashMap<String, Vec<String>>,
    captured_at: Option<Instant>,
    generation: u64,
    stats: ScanStats,
}

impl SessionHierarchySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    fn build(projects: Vec<ProjectEntry>, generation: u64, stats: ScanStats) -> Self {
        let mut index = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();

        for (p, project) in projects.iter().enumerate() {
            for (s, session) in project.sessions.iter().enumerate() {
                index.insert(session.id.clone(), (p, s));
            }
        }
        for project in &projects {
            for session in &project.sessions {
                if let Some(parent) = session.parent_id() {
                    if index.contains_key(parent) {
                        children
                            .entry(parent.to_string())
                            .or_default()
                            .push(session.id.clone());
                    }
                }
            }
        }
        for ids in children.values_mut() {
            ids.sort();
        }

        Self {
            projects,
            index,
            children,
            captured_at: Some(Instant::now()),
            generation,
            stats,
        }
    }

    pub fn captured_at(&self) -> Option<Instant> {
        self.captured_at
    }

    /// `None` for a snapshot that was never captured.
    pub fn age(&self) -> Option<Duration> {
        self.captured_at.map(|at| at.elapsed())
    }

    pub fn is_fresh(&self, window: Duration) -> bool {
        self.age().is_some_and(|age| age <= window)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    /// Sessions across all projects. An id listed under two projects counts
    /// twice, matching the per-project counts.
    pub fn session_count(&self) -> usize {
        self.projects.iter().map(|p| p.sessions.len()).sum()
    }

    /// Projects with their session counts. With a bounded range, counts
    /// only matching sessions and omits projects left with none.
    pub fn projects(&self, range: &DateRange) -> Vec<Project> {
        self.projects
            .iter()
            .filter_map(|project| {
                let session_count = project
                    .sessions
                    .iter()
                    .filter(|s| range.contains(s.timestamp))
                    .count();
                if !range.is_unbounded() && session_count == 0 {
                    return None;
                }
                Some(Project {
                    slug: project.slug.clone(),
                    path: project.path.clone(),
                    session_count,
                })
            })
            .collect()
    }

    /// Sessions of one project in id order, `None` if the project is unknown.
    pub fn sessions(&self, slug: &str, range: &DateRange) -> Option<Vec<Session>> {
        let project = self.projects.iter().find(|p| p.slug == slug)?;
        Some(
            project
                .sessions
                .iter()
                .filter(|s| range.contains(s.timestamp))
                .cloned()
                .collect(),
        )
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        let (p, s) = *self.index.get(id)?;
        self.projects.get(p)?.sessions.get(s)
    }

    /// Ids of known sub-agent sessions derived from `id`.
    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Breadcrumb from the root session down to `id`, stopping at the first
    /// ancestor that is not present.
    pub fn ancestry(&self, id: &str) -> Vec<&Session> {
        let mut chain = Vec::new();
        let mut current = self.session(id);
        while let Some(session) = current {
            chain.push(session);
            current = session.parent_id().and_then(|parent| self.session(parent));
        }
        chain.reverse();
        chain
    }
}

/// Display order for a project's sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrder {
    #[default]
    IdAscending,
    /// Descending by timestamp, sessions without one first.
    NewestFirst,
}

/// Reorder an already-scanned session list. Never touches the filesystem.
pub fn order_sessions(sessions: &mut [Session], order: SessionOrder) {
    match order {
        SessionOrder::IdAscending => sessions.sort_by(|a, b| a.id.cmp(&b.id)),
        SessionOrder::NewestFirst => sessions.sort_by(|a, b| match (a.timestamp, b.timestamp) {
            (None, None) => a.id.cmp(&b.id),
            (None, Some(_)) => CmpOrdering::Less,
            (Some(_), None) => CmpOrdering::Greater,
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.id.cmp(&b.id)),
        }),
    }
}

/// Walk `projects_dir` and build a snapshot. Sessions whose directory mtime
/// has not advanced since `previous` are reused without re-reading metadata.
pub fn scan_projects(
    projects_dir: &Path,
    previous: &SessionHierarchySnapshot,
    generation: u64,
) -> Result<SessionHierarchySnapshot> {
    let started = Instant::now();
    let mut stats = ScanStats::default();

    if !projects_dir.exists() {
        return Ok(SessionHierarchySnapshot::build(Vec::new(), generation, stats));
    }

    let entries =
        fs::read_dir(projects_dir).map_err(|e| EngineError::read(projects_dir, e))?;
    let mut project_dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    project_dirs.sort();

    let mut projects = Vec::with_capacity(project_dirs.len());

    for project_dir in project_dirs {
        let slug = dir_name(&project_dir);
        let sessions_dir = project_dir.join(SESSIONS_DIR);
        if !sessions_dir.is_dir() {
            continue;
        }

        let entries = match fs::read_dir(&sessions_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read sessions dir {:?}: {}", sessions_dir, e);
                continue;
            }
        };

        let mut sessions = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let session_dir = entry.path();
            if !session_dir.is_dir() {
                continue;
            }
            let id = dir_name(&session_dir);
            let mtime = fs::metadata(&session_dir).and_then(|m| m.modified()).ok();

            if let Some(cached) = reusable(previous, &id, &slug, mtime) {
                sessions.push(cached.clone());
                stats.sessions_cached += 1;
                continue;
            }

            sessions.push(read_session(&slug, id, session_dir, mtime));
            stats.sessions_scanned += 1;
        }

        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        projects.push(ProjectEntry {
            slug,
            path: project_dir,
            sessions,
        });
    }

    stats.duration = started.elapsed();
    Ok(SessionHierarchySnapshot::build(projects, generation, stats))
}

fn reusable<'a>(
    previous: &'a SessionHierarchySnapshot,
    id: &str,
    slug: &str,
    mtime: Option<SystemTime>,
) -> Option<&'a Session> {
    let cached = previous.session(id)?;
    match (mtime, cached.mtime) {
        (Some(now), Some(before)) if now <= before && cached.project_slug == slug => Some(cached),
        _ => None,
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn read_metadata_file(path: &Path) -> Option<serde_json::Map<String, Value>> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(map) => Some(map),
        Err(e) => {
            tracing::debug!("Ignoring malformed metadata {:?}: {}", path, e);
            None
        }
    }
}

fn read_session(slug: &str, id: String, dir: PathBuf, mtime: Option<SystemTime>) -> Session {
    let mut session = Session {
        id,
        project_slug: slug.to_string(),
        timestamp: None,
        name: None,
        description: None,
        dir,
        mtime,
    };

    if let Some(metadata) = read_metadata_file(&session.metadata_path()) {
        let text = |key: &str| metadata.get(key).and_then(Value::as_str).map(String::from);
        session.timestamp = text("created").as_deref().and_then(parse_timestamp);
        session.name = text("name");
        session.description = text("description");
    }

    session
}

/// Read a session's `metadata.json` on demand. A missing or malformed file
/// yields an empty context.
pub fn session_metadata(session: &Session) -> SessionMetadata {
    let context = read_metadata_file(&session.metadata_path())
        .and_then(|mut metadata| metadata.remove("context"))
        .unwrap_or_else(|| Value::Object(Default::default()));

    SessionMetadata {
        session_id: session.id.clone(),
        timestamp: session.timestamp,
        parent_session_id: session.parent_id().map(String::from),
        context,
    }
}

/// Scan progress as reported by `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatus {
    pub is_scanning: bool,
    pub last_scan_duration: f64,
    pub sessions_scanned: usize,
    pub sessions_cached: usize,
    pub project_count: usize,
    pub session_count: usize,
    pub cache_age: f64,
    pub cache_duration: f64,
}

struct ScanningFlag<'a>(&'a AtomicBool);

impl<'a> ScanningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ScanningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State shared between the scanner handle and its rescan tasks.
struct ScanState {
    projects_dir: PathBuf,
    snapshot: RwLock<Arc<SessionHierarchySnapshot>>,
    refresh: Arc<Mutex<()>>,
    scanning: AtomicBool,
    walks: AtomicUsize,
}

impl ScanState {
    fn snapshot(&self) -> Arc<SessionHierarchySnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Walk the tree and publish the result. Runs inside a detached task
    /// that holds the refresh lock.
    async fn rescan(&self) -> Result<Arc<SessionHierarchySnapshot>> {
        let _flag = ScanningFlag::raise(&self.scanning);
        self.walks.fetch_add(1, Ordering::SeqCst);

        let previous = self.snapshot();
        let projects_dir = self.projects_dir.clone();
        let generation = previous.generation() + 1;
        let scanned =
            tokio::task::spawn_blocking(move || scan_projects(&projects_dir, &previous, generation))
                .await
                .map_err(|e| EngineError::read(&self.projects_dir, io::Error::other(e.to_string())))??;

        let stats = scanned.stats();
        tracing::info!(
            "Refreshed {} projects, {} sessions (scanned: {}, cached: {}, took {:.2}s)",
            scanned.project_count(),
            scanned.session_count(),
            stats.sessions_scanned,
            stats.sessions_cached,
            stats.duration.as_secs_f64()
        );

        let scanned = Arc::new(scanned);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = scanned.clone();
        Ok(scanned)
    }
}

/// Serves the session hierarchy from a cached snapshot, rescanning when it
/// goes stale. Concurrent callers that find the snapshot stale share one
/// rescan instead of each walking the tree.
///
/// A rescan runs on its own task: a caller that is cancelled mid-scan does
/// not abandon the walk, and callers that arrive meanwhile wait for its
/// result instead of starting another.
pub struct SessionScanner {
    freshness: Duration,
    state: Arc<ScanState>,
}

impl SessionScanner {
    /// Create a scanner over the default `~/.amplifier/projects` directory.
    pub fn new() -> Result<Self> {
        let projects_dir = Self::default_projects_dir().ok_or_else(|| {
            EngineError::read(
                Path::new("~"),
                io::Error::new(io::ErrorKind::NotFound, "Could not determine home directory"),
            )
        })?;
        Ok(Self::with_dir(projects_dir))
    }

    /// Create a scanner over a custom directory (useful for testing).
    pub fn with_dir(projects_dir: PathBuf) -> Self {
        Self {
            freshness: DEFAULT_FRESHNESS,
            state: Arc::new(ScanState {
                projects_dir,
                snapshot: RwLock::new(Arc::new(SessionHierarchySnapshot::empty())),
                refresh: Arc::new(Mutex::new(())),
                scanning: AtomicBool::new(false),
                walks: AtomicUsize::new(0),
            }),
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn default_projects_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".amplifier").join("projects"))
    }

    pub fn projects_dir(&self) -> &Path {
        &self.state.projects_dir
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// The current snapshot, whatever its age.
    pub fn snapshot(&self) -> Arc<SessionHierarchySnapshot> {
        self.state.snapshot()
    }

    /// The current snapshot, rescanning first if it is stale.
    pub async fn fresh_snapshot(&self) -> Result<Arc<SessionHierarchySnapshot>> {
        let observed = self.snapshot();
        if observed.is_fresh(self.freshness) {
            return Ok(observed);
        }
        self.rescan(Some(observed.generation())).await
    }

    /// Rebuild the snapshot unconditionally and reset the staleness clock.
    pub async fn force_rescan(&self) -> Result<Arc<SessionHierarchySnapshot>> {
        self.rescan(None).await
    }

    /// Rescan unless a scan newer than `seen` finished while waiting for the
    /// refresh lock. The lock travels with the rescan task.
    async fn rescan(&self, seen: Option<u64>) -> Result<Arc<SessionHierarchySnapshot>> {
        let guard = self.state.refresh.clone().lock_owned().await;
        let latest = self.snapshot();
        if seen.is_some_and(|generation| generation != latest.generation()) {
            return Ok(latest);
        }

        let state = self.state.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            state.rescan().await
        });
        task.await
            .map_err(|e| EngineError::read(self.projects_dir(), io::Error::other(e.to_string())))?
    }

    pub async fn get_projects(&self) -> Result<Vec<Project>> {
        Ok(self.fresh_snapshot().await?.projects(&DateRange::default()))
    }

    /// Sessions of one project; NotFound if the slug is still unknown after
    /// the freshness check.
    pub async fn get_sessions(&self, slug: &str) -> Result<Vec<Session>> {
        self.fresh_snapshot()
            .await?
            .sessions(slug, &DateRange::default())
            .ok_or_else(|| EngineError::not_found("Project", slug))
    }

    pub async fn get_session(&self, id: &str) -> Result<Session> {
        self.fresh_snapshot()
            .await?
            .session(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("Session", id))
    }

    pub async fn get_session_metadata(&self, id: &str) -> Result<SessionMetadata> {
        let session = self.get_session(id).await?;
        tokio::task::spawn_blocking(move || session_metadata(&session))
            .await
            .map_err(|e| EngineError::read(self.projects_dir(), io::Error::other(e.to_string())))
    }

    pub fn is_scanning(&self) -> bool {
        self.state.scanning.load(Ordering::SeqCst)
    }

    /// Number of directory walks performed so far.
    pub fn walk_count(&self) -> usize {
        self.state.walks.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ScanStatus {
        let snapshot = self.snapshot();
        let stats = snapshot.stats();
        ScanStatus {
            is_scanning: self.is_scanning(),
            last_scan_duration: stats.duration.as_secs_f64(),
            sessions_scanned: stats.sessions_scanned,
            sessions_cached: stats.sessions_cached,
            project_count: snapshot.project_count(),
            session_count: snapshot.session_count(),
            cache_age: snapshot.age().map(|a| a.as_secs_f64()).unwrap_or(0.0),
            cache_duration: self.freshness.as_secs_f64(),
        }
    }
}
