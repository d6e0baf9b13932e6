use std::fs;
use std::path::Path;
use std::sync::Arc;

use logview_sessions::{
    agent_label, order_sessions, parent_session_id, scan_projects, DateRange, EngineError,
    SessionHierarchySnapshot, SessionOrder, SessionScanner,
};
use tempfile::TempDir;

const ROOT: &str = "a1b2c3d4-e5f6-7890-abcd-ef1234567890";
const REVIEWER: &str = "a1b2c3d4-e5f6-7890-abcd-ef1234567890-reviewer";
const OTHER: &str = "0f0e0d0c-0b0a-0908-0706-050403020100";

/// Helper: create `<projects>/<slug>/sessions/<id>/` with an events file and
/// optional metadata.
fn add_session(projects: &Path, slug: &str, id: &str, metadata: Option<&str>) {
    let dir = projects.join(slug).join("sessions").join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("events.jsonl"),
        "{\"event\":\"session:start\",\"lvl\":\"info\"}\n",
    )
    .unwrap();
    if let Some(metadata) = metadata {
        fs::write(dir.join("metadata.json"), metadata).unwrap();
    }
}

fn create_projects_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    add_session(
        dir.path(),
        "demo",
        ROOT,
        Some(r#"{"created":"2026-01-20T10:00:00Z","name":"Auth fix","context":{"cwd":"/home/user/demo"}}"#),
    );
    add_session(
        dir.path(),
        "demo",
        REVIEWER,
        Some(r#"{"created":"2026-01-20T10:05:00Z"}"#),
    );
    add_session(
        dir.path(),
        "other",
        OTHER,
        Some(r#"{"created":"2026-01-25T08:00:00Z","description":"Docs pass"}"#),
    );
    add_session(dir.path(), "other", "no-metadata-session", None);
    dir
}

// ============================================================
// Id classification
// ============================================================

#[test]
fn test_root_ids_have_no_parent() {
    assert_eq!(parent_session_id(ROOT), None);
    assert_eq!(parent_session_id("a-b-c"), None);
    assert_eq!(agent_label(ROOT), None);
}

#[test]
fn test_subagent_parent_is_first_five_segments() {
    for extra in 1..6 {
        let suffix: Vec<String> = (0..extra).map(|i| format!("agent{}", i)).collect();
        let id = format!("{}-{}", ROOT, suffix.join("-"));
        assert_eq!(parent_session_id(&id), Some(ROOT), "id {}", id);
        assert_eq!(agent_label(&id), Some(suffix.join("-").as_str()));
    }
}

// ============================================================
// Snapshot contents
// ============================================================

#[tokio::test]
async fn test_demo_project_lists_parent_and_subagent() {
    let dir = create_projects_dir();
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf());

    let sessions = scanner.get_sessions("demo").await.unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec![ROOT, REVIEWER]);

    let sub = &sessions[1];
    assert!(sub.is_subagent());
    assert_eq!(sub.parent_id(), Some(sessions[0].id.as_str()));
    assert_eq!(sub.agent(), Some("reviewer"));
    assert_eq!(sessions[0].name.as_deref(), Some("Auth fix"));
}

#[tokio::test]
async fn test_projects_carry_session_counts() {
    let dir = create_projects_dir();
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf());

    let projects = scanner.get_projects().await.unwrap();
    let counts: Vec<(&str, usize)> = projects
        .iter()
        .map(|p| (p.slug.as_str(), p.session_count))
        .collect();
    assert_eq!(counts, vec![("demo", 2), ("other", 2)]);
}

#[tokio::test]
async fn test_session_count_includes_ids_repeated_across_projects() {
    let dir = TempDir::new().unwrap();
    add_session(dir.path(), "first", ROOT, None);
    add_session(dir.path(), "second", ROOT, None);
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf());

    let snapshot = scanner.force_rescan().await.unwrap();
    let per_project: usize = scanner
        .get_projects()
        .await
        .unwrap()
        .iter()
        .map(|p| p.session_count)
        .sum();
    assert_eq!(per_project, 2);
    assert_eq!(snapshot.session_count(), 2);
    assert_eq!(scanner.status().session_count, 2);
}

#[tokio::test]
async fn test_unknown_project_and_session_are_not_found() {
    let dir = create_projects_dir();
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf());

    let err = scanner.get_sessions("missing").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: "Project", .. }));
    assert!(scanner.get_session("missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_missing_projects_dir_scans_empty() {
    let dir = TempDir::new().unwrap();
    let scanner = SessionScanner::with_dir(dir.path().join("does-not-exist"));

    assert!(scanner.get_projects().await.unwrap().is_empty());
    assert_eq!(scanner.walk_count(), 1);
}

#[tokio::test]
async fn test_session_metadata_reads_context() {
    let dir = create_projects_dir();
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf());

    let metadata = scanner.get_session_metadata(ROOT).await.unwrap();
    assert_eq!(metadata.session_id, ROOT);
    assert_eq!(metadata.parent_session_id, None);
    assert_eq!(metadata.context["cwd"], "/home/user/demo");

    let sub = scanner.get_session_metadata(REVIEWER).await.unwrap();
    assert_eq!(sub.parent_session_id.as_deref(), Some(ROOT));
    assert!(sub.context.as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_children_and_ancestry() {
    let dir = create_projects_dir();
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf());
    let snapshot = scanner.fresh_snapshot().await.unwrap();

    assert_eq!(snapshot.children(ROOT), &[REVIEWER.to_string()]);
    assert!(snapshot.children(OTHER).is_empty());

    let chain: Vec<&str> = snapshot
        .ancestry(REVIEWER)
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(chain, vec![ROOT, REVIEWER]);
}

#[test]
fn test_orphan_subagent_is_listed_without_parent() {
    let dir = TempDir::new().unwrap();
    let orphan = format!("{}-explorer", OTHER);
    add_session(dir.path(), "solo", &orphan, None);

    let snapshot = scan_projects(dir.path(), &SessionHierarchySnapshot::empty(), 1).unwrap();
    let session = snapshot.session(&orphan).unwrap();
    assert_eq!(session.parent_id(), Some(OTHER));
    assert!(snapshot.session(OTHER).is_none());
    assert_eq!(snapshot.ancestry(&orphan).len(), 1);
}

// ============================================================
// Date ranges and ordering
// ============================================================

#[test]
fn test_date_range_narrows_projects_and_sessions() {
    let dir = create_projects_dir();
    let snapshot = scan_projects(dir.path(), &SessionHierarchySnapshot::empty(), 1).unwrap();

    let range = DateRange::parse(Some("2026-01-22"), None);
    let projects = snapshot.projects(&range);
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].slug, "other");
    assert_eq!(projects[0].session_count, 1);

    let sessions = snapshot.sessions("other", &range).unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec![OTHER]);

    let until = DateRange::parse(None, Some("2026-01-21"));
    assert_eq!(snapshot.sessions("demo", &until).unwrap().len(), 2);
    assert!(snapshot.sessions("other", &until).unwrap().is_empty());
}

#[test]
fn test_newest_first_puts_undated_sessions_on_top() {
    let dir = create_projects_dir();
    let snapshot = scan_projects(dir.path(), &SessionHierarchySnapshot::empty(), 1).unwrap();

    let mut sessions = snapshot.sessions("demo", &DateRange::default()).unwrap();
    sessions.extend(snapshot.sessions("other", &DateRange::default()).unwrap());
    order_sessions(&mut sessions, SessionOrder::NewestFirst);

    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["no-metadata-session", OTHER, REVIEWER, ROOT]);

    order_sessions(&mut sessions, SessionOrder::IdAscending);
    assert_eq!(sessions[0].id, OTHER);
}

// ============================================================
// Rescans
// ============================================================

#[tokio::test]
async fn test_rescan_reuses_unchanged_sessions() {
    let dir = create_projects_dir();
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf());

    let first = scanner.force_rescan().await.unwrap();
    assert_eq!(first.stats().sessions_scanned, 4);
    assert_eq!(first.stats().sessions_cached, 0);

    let second = scanner.force_rescan().await.unwrap();
    assert_eq!(second.stats().sessions_scanned, 0);
    assert_eq!(second.stats().sessions_cached, 4);
    assert_eq!(second.generation(), first.generation() + 1);

    add_session(dir.path(), "demo", "brand-new-session", None);
    let third = scanner.force_rescan().await.unwrap();
    assert_eq!(third.stats().sessions_scanned, 1);
    assert_eq!(third.session_count(), 5);
}

#[tokio::test]
async fn test_fresh_snapshot_is_served_without_walking() {
    let dir = create_projects_dir();
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf());

    scanner.get_projects().await.unwrap();
    scanner.get_sessions("demo").await.unwrap();
    scanner.get_session(ROOT).await.unwrap();
    assert_eq!(scanner.walk_count(), 1);

    scanner.force_rescan().await.unwrap();
    assert_eq!(scanner.walk_count(), 2);
}

#[tokio::test]
async fn test_zero_freshness_rescans_every_read() {
    let dir = create_projects_dir();
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf())
        .with_freshness(std::time::Duration::ZERO);

    scanner.get_projects().await.unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    scanner.get_projects().await.unwrap();
    assert_eq!(scanner.walk_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stale_reads_share_one_walk() {
    let dir = create_projects_dir();
    let scanner = Arc::new(SessionScanner::with_dir(dir.path().to_path_buf()));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.fresh_snapshot().await.unwrap().generation() })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), 1);
    }
    assert_eq!(scanner.walk_count(), 1);
    assert!(!scanner.is_scanning());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_reader_does_not_abandon_the_walk() {
    let dir = TempDir::new().unwrap();
    for n in 0..1500 {
        add_session(dir.path(), "bulk", &format!("session-{:04}", n), None);
    }
    let scanner = Arc::new(SessionScanner::with_dir(dir.path().to_path_buf()));

    let first = {
        let scanner = scanner.clone();
        tokio::spawn(async move { scanner.fresh_snapshot().await.map(|s| s.generation()) })
    };
    while scanner.walk_count() == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    first.abort();
    let _ = first.await;

    let snapshot = scanner.fresh_snapshot().await.unwrap();
    assert_eq!(snapshot.generation(), 1);
    assert_eq!(snapshot.session_count(), 1500);
    assert_eq!(scanner.walk_count(), 1);
    assert!(!scanner.is_scanning());
}

#[tokio::test]
async fn test_status_reports_last_scan() {
    let dir = create_projects_dir();
    let scanner = SessionScanner::with_dir(dir.path().to_path_buf());

    let before = scanner.status();
    assert!(!before.is_scanning);
    assert_eq!(before.session_count, 0);

    scanner.force_rescan().await.unwrap();
    let after = scanner.status();
    assert_eq!(after.project_count, 2);
    assert_eq!(after.session_count, 4);
    assert_eq!(after.sessions_scanned, 4);
    assert_eq!(after.cache_duration, 3.0);
}
