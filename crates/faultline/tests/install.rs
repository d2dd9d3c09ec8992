//! Controller behavior once installed.
//!
//! Installation is process-global, so every test here shares one install
//! directory and serializes on a lock before touching the store.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use faultline::MonitorType;

static LOCK: Mutex<()> = Mutex::new(());
static WRITTEN: Mutex<Vec<i64>> = Mutex::new(Vec::new());

fn on_written(id: i64)
{
    WRITTEN.lock().unwrap().push(id);
}

fn install_dir() -> &'static PathBuf
{
    static DIR: OnceLock<(tempfile::TempDir, PathBuf)> = OnceLock::new();
    let (_keepalive, path) = DIR.get_or_init(|| {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        (dir, path)
    });
    path
}

fn installed() -> MonitorType
{
    faultline::install("install-demo", install_dir()).unwrap()
}

#[test]
fn double_install_returns_identical_mask_and_sets_up_once()
{
    let _guard = LOCK.lock().unwrap();

    let first = installed();
    assert!(first.contains(MonitorType::SIGNAL));
    assert!(first.contains(MonitorType::USER_REPORTED));
    assert!(faultline::is_installed());

    let second = faultline::install("install-demo", install_dir()).unwrap();
    assert_eq!(first, second);

    assert!(install_dir().join("Reports").is_dir());
    assert!(install_dir().join("Data").join("crash-state.json").is_file());
}

#[test]
fn eviction_keeps_the_two_highest_ids()
{
    let _guard = LOCK.lock().unwrap();
    installed();

    faultline::delete_all_reports();
    faultline::set_max_report_count(2);
    WRITTEN.lock().unwrap().clear();
    faultline::set_report_written_callback(Some(on_written));

    faultline::report_user_exception("First", "one", "rust", "a.rs:1");
    faultline::report_user_exception("Second", "two", "rust", "a.rs:2");
    faultline::report_user_exception("Third", "three", "rust", "a.rs:3");

    faultline::set_report_written_callback(None);
    let written = WRITTEN.lock().unwrap().clone();
    assert_eq!(written.len(), 3);

    assert_eq!(faultline::report_count(), 2);
    assert_eq!(faultline::report_ids(10), written[1..].to_vec());

    faultline::set_max_report_count(5);
}

#[test]
fn captured_user_exception_is_readable_as_json()
{
    let _guard = LOCK.lock().unwrap();
    installed();
    faultline::delete_all_reports();

    faultline::report_user_exception("WidgetPanic", "the widget gave up", "rust", "widget.rs:7");

    let ids = faultline::report_ids(10);
    assert_eq!(ids.len(), 1);
    let bytes = faultline::read_report(ids[0]).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed["report_type"], "standard");
    assert_eq!(parsed["app_name"], "install-demo");
    assert_eq!(parsed["user"]["name"], "WidgetPanic");
    assert_eq!(parsed["user"]["line_of_code"], "widget.rs:7");
    // The signal detector was enabled at install, so a session id exists
    assert!(!parsed["event_id"].as_str().unwrap().is_empty());

    // A synthetic event never marks the launch as crashed
    assert!(!faultline::crashed_last_launch());
}

#[test]
fn caller_supplied_report_bytes_round_trip()
{
    let _guard = LOCK.lock().unwrap();
    installed();
    faultline::delete_all_reports();

    let id = faultline::add_user_report(br#"{"custom":true}"#).unwrap();
    assert_eq!(faultline::read_report(id).as_deref(), Some(&br#"{"custom":true}"#[..]));

    faultline::delete_report(id);
    assert!(faultline::read_report(id).is_none());
    assert_eq!(faultline::report_count(), 0);

    // Idempotent
    faultline::delete_report(id);
}

#[test]
fn activation_after_install_starts_new_sessions()
{
    let _guard = LOCK.lock().unwrap();
    installed();

    faultline::notify_app_active(true);
    let sessions = faultline::sessions_since_last_crash();

    faultline::notify_app_active(false);
    faultline::notify_app_active(true);
    assert_eq!(faultline::sessions_since_last_crash(), sessions + 1);

    faultline::notify_app_in_foreground(false);
    faultline::notify_app_terminate();
}

#[test]
fn monitor_mask_can_be_narrowed_and_restored()
{
    let _guard = LOCK.lock().unwrap();
    installed();

    let narrowed = faultline::set_monitoring(MonitorType::USER_REPORTED);
    assert_eq!(narrowed, MonitorType::USER_REPORTED);

    let restored = faultline::set_monitoring(MonitorType::PRODUCTION_SAFE_MINIMAL);
    assert!(restored.contains(MonitorType::SIGNAL));
    assert!(restored.contains(MonitorType::USER_REPORTED));
    // Detectors without a backend on this platform never appear
    assert!(!restored.contains(MonitorType::DEADLOCK));
}
