//! End-to-end flows through `AppContext` with the shipped configuration and
//! file-backed state.

use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

use academy::app::AppContext;
use academy::config::{self, Config, DEFAULT_CONFIG_PATH, StorageBackend};
use academy::error::AppError;
use academy::progress::{FIRST_LESSON, FIRST_LOGIN};
use academy::router::Navigation;

// ── helpers ──────────────────────────────────────────────────────────────────

fn config_in(tmp: &TempDir) -> Config {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
    let work_dir = tmp.path().to_str().expect("utf-8 temp path");
    config::load_from(&path, Some(work_dir), None).expect("shipped config loads")
}

fn open(tmp: &TempDir) -> AppContext {
    AppContext::open(config_in(tmp)).expect("context opens")
}

// ── flows ────────────────────────────────────────────────────────────────────

#[test]
fn shipped_config_uses_file_storage_under_work_dir() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    assert_eq!(cfg.store.backend, StorageBackend::File);
    assert!(cfg.store.dir.starts_with(tmp.path()));
}

#[test]
fn student_session_persists_between_runs() {
    let tmp = TempDir::new().unwrap();

    {
        let ctx = open(&tmp);
        let user = ctx.login("student", "english2026").unwrap();
        assert_eq!(user.email, "student@academy.com");
        ctx.start_lesson("listening_1").unwrap();
        ctx.complete_lesson("listening_1", 75).unwrap();
        assert_eq!(ctx.store().persist_failures(), 0);
    }

    let ctx = open(&tmp);
    assert_eq!(ctx.auth().current_user().map(|u| u.username).as_deref(), Some("student"));

    let progress = ctx.progress().get_user_progress("student").unwrap();
    assert_eq!(progress.completed_lessons, 1);
    assert_eq!(progress.total_points, 75);
    assert_eq!(progress.total_minutes, 15);
    assert_eq!(progress.study_streak, 1);
    assert_eq!(progress.achievements, vec![FIRST_LOGIN, FIRST_LESSON]);

    let Navigation::Loaded { content, .. } = ctx.navigate("dashboard") else {
        panic!("dashboard should load for a restored session");
    };
    assert!(content.contains("Welcome back, student!"));
}

#[test]
fn logout_locks_pages_on_next_run() {
    let tmp = TempDir::new().unwrap();
    {
        let ctx = open(&tmp);
        ctx.login("alex", "teacher").unwrap();
        ctx.logout().unwrap();
    }

    let ctx = open(&tmp);
    assert!(!ctx.auth().is_logged_in());
    assert_eq!(ctx.store().get("user").unwrap(), Some(json!(null)));
    assert_eq!(ctx.navigate("reading"), Navigation::Blocked { page: "reading".into() });
    assert!(matches!(ctx.start_lesson("reading_1"), Err(AppError::Auth(_))));
}

#[test]
fn analytics_log_is_shared_across_runs() {
    let tmp = TempDir::new().unwrap();
    {
        let ctx = open(&tmp);
        ctx.login("alex", "teacher").unwrap();
        ctx.navigate("listening");
    }

    let ctx = open(&tmp);
    ctx.navigate("progress");

    let events: Vec<_> = ctx
        .analytics()
        .stored_events()
        .iter()
        .map(|e| (e["event"].clone(), e["properties"]["userId"].clone()))
        .collect();
    assert_eq!(
        events,
        vec![
            (json!("login"), json!("alex")),
            (json!("page_view"), json!("alex")),
            (json!("page_view"), json!("alex")),
        ]
    );
}

#[test]
fn subscribers_track_progress_writes() {
    let tmp = TempDir::new().unwrap();
    let ctx = open(&tmp);
    ctx.login("alex", "teacher").unwrap();

    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let s = seen.clone();
    let _sub = ctx
        .store()
        .subscribe("progress.alex", move |v| s.borrow_mut().push(v["totalPoints"].clone()))
        .unwrap();

    ctx.complete_lesson("reading_2", 90).unwrap();

    // One write for the lesson credit, one for the first-lesson achievement.
    assert_eq!(*seen.borrow(), vec![json!(90), json!(90)]);
}
