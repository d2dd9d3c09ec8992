//! # Faultline
//!
//! In-process crash and diagnostic capture for native applications.
//!
//! Faultline installs detectors for fatal conditions (POSIX signals, plus a
//! user-reported channel for synthetic events), captures a consistent
//! snapshot of program state from inside the failure context, persists it as
//! a durable JSON report, and tracks crash state across launches.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! let active = faultline::install("MyApp", Path::new("/var/app/faultline"))
//!     .expect("Failed to install crash reporter");
//! println!("Active monitors: {active:?}");
//!
//! // Later, after a crash and relaunch:
//! for id in faultline::report_ids(10) {
//!     if let Some(bytes) = faultline::read_report(id) {
//!         // ship it somewhere
//!         let _ = bytes;
//!     }
//! }
//! ```
//!
//! The capture machinery lives in [`faultline_core`], report persistence in
//! [`faultline_store`]; this crate ties them together behind an
//! install-once controller.

pub mod error;
pub mod install;
pub mod state;

mod report;

pub use error::{InstallError, InstallResult};
pub use install::{
    add_user_report, crashed_last_launch, delete_all_reports, delete_report, install, is_installed,
    notify_app_active, notify_app_crash, notify_app_in_foreground, notify_app_terminate, read_report,
    reinstall, report_count, report_ids, report_user_exception, sessions_since_last_crash,
    set_add_console_log_to_report, set_crash_notify_callback, set_max_report_count, set_monitoring,
    set_print_previous_log, set_report_written_callback, CrashNotifyCallback, ReportWrittenCallback,
};
pub use state::{CrashState, LifecycleState};

pub use faultline_core::monitor::signal::{signal_handler_info, SignalHandlerInfo};
pub use faultline_core::{CrashContext, EventId, MonitorType, UserReport};
