//! # Installation Controller
//!
//! The top-level gate: wires the report store, crash state and monitor
//! registry together exactly once per process, and owns the report-write
//! callback the registry invokes on capture.
//!
//! Installation is guarded by a `OnceCell`; a second `install` call performs
//! no setup and simply returns the currently active monitor mask. Control
//! knobs set *before* installation (monitor mask, console-log options,
//! callbacks, lifecycle notifications) are recorded and applied when
//! installation happens.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use faultline_core::context;
use faultline_core::monitor::{signal, user};
use faultline_core::{registry, CrashContext, FnCell, MonitorType};
use faultline_store::ReportStore;
use faultline_utils::{init_console_capture, previous_log_contents};

use crate::error::InstallResult;
use crate::report;
use crate::state::{CrashState, LifecycleState};

/// Invoked after a standard report has been written, with its id.
pub type ReportWrittenCallback = fn(i64);

/// Invoked at the start of the write path with the captured context.
pub type CrashNotifyCallback = fn(&CrashContext);

const CONSOLE_LOG_FILE: &str = "console.log";
const CRASH_STATE_FILE: &str = "crash-state.json";

struct Installation
{
    app_name: String,
    store: ReportStore,
    state: CrashState,
    console_log_path: Option<&'static str>,
}

static INSTALLATION: OnceCell<Installation> = OnceCell::new();

// Knobs that must be settable before install; applied at install time.
static DESIRED_MONITORS: AtomicU32 = AtomicU32::new(MonitorType::PRODUCTION_SAFE_MINIMAL.bits());
static LAST_LIFECYCLE: AtomicU8 = AtomicU8::new(LifecycleState::None as u8);
static REPORT_WRITTEN_CB: FnCell<ReportWrittenCallback> = FnCell::new();
static CRASH_NOTIFY_CB: FnCell<CrashNotifyCallback> = FnCell::new();
static ADD_CONSOLE_LOG: AtomicBool = AtomicBool::new(false);
static PRINT_PREVIOUS_LOG: AtomicBool = AtomicBool::new(false);

/// Whether `install` has completed in this process.
pub fn is_installed() -> bool
{
    INSTALLATION.get().is_some()
}

/// Install the crash reporter.
///
/// Creates `Reports/` and `Data/` under `install_path`, initializes the
/// report store and crash state, registers the write callback, activates
/// the configured monitors and replays the most recent lifecycle
/// notification into them. Returns the mask of monitors that actually
/// activated.
///
/// Calling this a second time performs no setup and returns the current
/// active mask.
///
/// ## Errors
///
/// Returns an error when the directories, store or state file cannot be
/// created. Nothing is partially installed on error.
pub fn install(app_name: &str, install_path: &Path) -> InstallResult<MonitorType>
{
    if INSTALLATION.get().is_some() {
        debug!(app_name, "Already installed; returning active monitors");
        return Ok(registry::active_monitors());
    }

    INSTALLATION.get_or_try_init(|| -> InstallResult<Installation> {
        let reports_dir = install_path.join("Reports");
        let data_dir = install_path.join("Data");
        fs::create_dir_all(&data_dir)?;

        let store = ReportStore::initialize(app_name, &reports_dir)?;
        let state = CrashState::initialize(&data_dir.join(CRASH_STATE_FILE))?;

        let console_path = data_dir.join(CONSOLE_LOG_FILE);
        if PRINT_PREVIOUS_LOG.load(Ordering::SeqCst) {
            match previous_log_contents(&console_path) {
                Some(contents) => info!(target: "faultline::console", "Previous session log:\n{contents}"),
                None => debug!("No previous session log to print"),
            }
        }
        let console_log_path = if ADD_CONSOLE_LOG.load(Ordering::SeqCst) {
            if let Err(e) = init_console_capture(&console_path) {
                warn!(error = %e, "Failed to start console log capture");
            }
            Some(leak_path(&console_path))
        } else {
            None
        };

        registry::set_event_callback(Some(on_crash));
        let requested = MonitorType::from_bits_truncate(DESIRED_MONITORS.load(Ordering::SeqCst));
        registry::set_active_monitors(requested);
        replay_last_lifecycle(&state);

        info!(
            app_name,
            path = %install_path.display(),
            active = ?registry::active_monitors(),
            "Crash reporter installed"
        );
        Ok(Installation {
            app_name: app_name.to_string(),
            store,
            state,
            console_log_path,
        })
    })?;

    Ok(registry::active_monitors())
}

/// Re-assert the signal handlers at the top of the OS handler chain.
///
/// Useful when another actor installed its own handlers after `install`.
/// Does nothing (with a diagnostic) before installation.
pub fn reinstall()
{
    if !is_installed() {
        warn!("reinstall() called before install(); ignoring");
        return;
    }
    if let Err(e) = signal::reassert_handlers() {
        warn!(error = %e, "Failed to re-assert signal handlers");
    }
}

/// Request a monitor mask.
///
/// Before installation the request is only recorded and the empty mask is
/// returned. After installation the registry transitions monitors
/// immediately; the return value is what actually activated, which excludes
/// any detector this platform does not support.
pub fn set_monitoring(mask: MonitorType) -> MonitorType
{
    DESIRED_MONITORS.store(mask.bits(), Ordering::SeqCst);
    if !is_installed() {
        debug!(requested = ?mask, "Not installed yet; monitor mask recorded for install");
        return MonitorType::empty();
    }
    registry::set_active_monitors(mask);
    registry::active_monitors()
}

/// Bound the number of retained reports. Applied on the next write.
pub fn set_max_report_count(max: usize)
{
    if let Some(inst) = INSTALLATION.get() {
        inst.store.set_max_report_count(max);
    } else {
        warn!(max, "set_max_report_count() called before install(); ignoring");
    }
}

/// Register (or clear) the callback invoked after a standard report lands.
pub fn set_report_written_callback(callback: Option<ReportWrittenCallback>)
{
    REPORT_WRITTEN_CB.set(callback);
}

/// Register (or clear) the callback invoked with each captured context.
pub fn set_crash_notify_callback(callback: Option<CrashNotifyCallback>)
{
    CRASH_NOTIFY_CB.set(callback);
}

/// Attach the current session's console log path to future reports.
/// Takes effect at install time.
pub fn set_add_console_log_to_report(enabled: bool)
{
    ADD_CONSOLE_LOG.store(enabled, Ordering::SeqCst);
}

/// Print the previous session's console log during install.
pub fn set_print_previous_log(enabled: bool)
{
    PRINT_PREVIOUS_LOG.store(enabled, Ordering::SeqCst);
}

/// Submit a synthetic, caller-described event through the full capture and
/// write path.
pub fn report_user_exception(name: &str, reason: &str, language: &str, line_of_code: &str)
{
    user::report_user_exception(name, reason, language, line_of_code);
}

/// Record that the application became active (`true`) or inactive.
pub fn notify_app_active(active: bool)
{
    record_lifecycle(if active { LifecycleState::Active } else { LifecycleState::Inactive });
    if let Some(inst) = INSTALLATION.get() {
        inst.state.notify_app_active(active);
    }
}

/// Record a foreground/background transition.
pub fn notify_app_in_foreground(in_foreground: bool)
{
    record_lifecycle(if in_foreground {
        LifecycleState::Foreground
    } else {
        LifecycleState::Background
    });
    if let Some(inst) = INSTALLATION.get() {
        inst.state.notify_app_in_foreground(in_foreground);
    }
}

/// Record an orderly termination.
pub fn notify_app_terminate()
{
    record_lifecycle(LifecycleState::Terminating);
    if let Some(inst) = INSTALLATION.get() {
        inst.state.notify_app_terminate();
    }
}

/// Record an externally detected crash against the persisted state.
pub fn notify_app_crash()
{
    if let Some(inst) = INSTALLATION.get() {
        inst.state.notify_app_crash();
    }
}

/// Whether the previous launch ended in a recorded crash.
pub fn crashed_last_launch() -> bool
{
    INSTALLATION.get().is_some_and(|inst| inst.state.crashed_last_launch())
}

/// Foreground sessions since the last recorded crash.
pub fn sessions_since_last_crash() -> u32
{
    INSTALLATION.get().map_or(0, |inst| inst.state.sessions_since_last_crash())
}

/// Number of reports currently on disk. Zero before installation.
pub fn report_count() -> usize
{
    INSTALLATION.get().map_or(0, |inst| inst.store.count())
}

/// Up to `max` report ids in ascending order.
pub fn report_ids(max: usize) -> Vec<i64>
{
    INSTALLATION.get().map_or_else(Vec::new, |inst| inst.store.list_ids(max))
}

/// The raw bytes of report `id`, or `None` if it does not exist (or a read
/// failed; failures are logged, never propagated).
pub fn read_report(id: i64) -> Option<Vec<u8>>
{
    let inst = INSTALLATION.get()?;
    match inst.store.read(id) {
        Ok(found) => found,
        Err(e) => {
            error!(id, error = %e, "Failed to read report");
            None
        }
    }
}

/// Store caller-supplied report bytes under a freshly allocated id.
pub fn add_user_report(report: &[u8]) -> Option<i64>
{
    let inst = INSTALLATION.get()?;
    match inst.store.add_user_report(report) {
        Ok(id) => Some(id),
        Err(e) => {
            error!(error = %e, "Failed to add user report");
            None
        }
    }
}

/// Delete report `id`. Deleting a nonexistent report is not an error.
pub fn delete_report(id: i64)
{
    if let Some(inst) = INSTALLATION.get() {
        if let Err(e) = inst.store.delete_one(id) {
            error!(id, error = %e, "Failed to delete report");
        }
    }
}

/// Delete every report. The id counter keeps counting.
pub fn delete_all_reports()
{
    if let Some(inst) = INSTALLATION.get() {
        inst.store.delete_all();
    }
}

fn record_lifecycle(state: LifecycleState)
{
    LAST_LIFECYCLE.store(state as u8, Ordering::SeqCst);
}

/// Replay the most recent pre-install lifecycle notification, so
/// state-dependent bookkeeping starts from what the host already announced.
fn replay_last_lifecycle(state: &CrashState)
{
    match LifecycleState::from_u8(LAST_LIFECYCLE.load(Ordering::SeqCst)) {
        LifecycleState::None => {}
        LifecycleState::Active => state.notify_app_active(true),
        LifecycleState::Inactive => state.notify_app_active(false),
        LifecycleState::Foreground => state.notify_app_in_foreground(true),
        LifecycleState::Background => state.notify_app_in_foreground(false),
        LifecycleState::Terminating => state.notify_app_terminate(),
    }
}

fn leak_path(path: &PathBuf) -> &'static str
{
    Box::leak(path.display().to_string().into_boxed_str())
}

/// The single write path, invoked by the registry once per captured event.
///
/// Runs in the capturing detector's execution context: for a real fault this
/// is the signal handler with the world stopped. A suspended thread may hold
/// the tracing subscriber's writer lock, so nothing here may log; every
/// fallible step is best-effort and its failure is dropped.
fn on_crash(context: &mut CrashContext)
{
    let Some(inst) = INSTALLATION.get() else {
        return;
    };

    if let Some(callback) = CRASH_NOTIFY_CB.get() {
        callback(context);
    }

    context.console_log_path = inst.console_log_path;

    // Synthetic events must not mark the application as crashed.
    if !context.user_reported {
        inst.state.notify_app_crash();
    }

    if context.crashed_during_handling {
        let _ = context::with_last_report_path(|p| report::write_recrash(Path::new(p), &inst.app_name, context));
        return;
    }

    let (id, path) = inst.store.allocate_next();
    if report::write_standard(&path, &inst.app_name, context).is_ok() {
        context::set_last_report_path(&path.display().to_string());
        inst.store.prune();
        if let Some(callback) = REPORT_WRITTEN_CB.get() {
            callback(id);
        }
    }
}
