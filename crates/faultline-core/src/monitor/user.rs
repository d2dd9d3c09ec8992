//! # User-Reported Monitor
//!
//! Accepts caller-submitted synthetic events and pushes them through the
//! same capture and write path as real faults.
//!
//! Unlike the signal detector this runs on the reporting thread in a normal
//! execution context, but it still funnels into the shared crash context, so
//! concurrent reports are serialized with a busy-wait flag rather than a
//! lock the capture path could deadlock against.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::context::{crash_context_mut, CrashContext, UserReport};
use crate::monitor::registry;
use crate::monitor::signal;
use crate::monitor::{Monitor, MonitorType};

static ENABLED: AtomicBool = AtomicBool::new(false);
static REPORTING: AtomicBool = AtomicBool::new(false);

/// The user-reported monitor singleton.
pub struct UserMonitor;

pub static USER_MONITOR: UserMonitor = UserMonitor;

impl Monitor for UserMonitor
{
    fn monitor_type(&self) -> MonitorType
    {
        MonitorType::USER_REPORTED
    }

    fn set_enabled(&self, enabled: bool)
    {
        ENABLED.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool
    {
        ENABLED.load(Ordering::SeqCst)
    }

    fn add_contextual_info(&self, _context: &mut CrashContext) {}
}

/// Submit a synthetic event through the full capture path.
///
/// The event is dropped (with a diagnostic) when the monitor is disabled.
pub fn report_user_exception(name: &str, reason: &str, language: &str, line_of_code: &str)
{
    if !ENABLED.load(Ordering::SeqCst) {
        warn!("user-reported monitor is disabled; dropping report");
        return;
    }

    // Exclude concurrent synthetic reports from the shared context
    while REPORTING
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        std::hint::spin_loop();
    }

    let mut user = UserReport::empty();
    user.name.set(name);
    user.reason.set(reason);
    user.language.set(language);
    user.line_of_code.set(line_of_code);

    // SAFETY: the REPORTING flag excludes other synthetic reports; a real
    // fault arriving mid-report is handled by the registry's re-entry gate.
    let context = unsafe { crash_context_mut() };
    *context = CrashContext::zeroed();
    context.kind = MonitorType::USER_REPORTED;
    context.event_id = signal::current_event_id();
    context.user_reported = true;
    context.user = Some(user);

    registry::handle_exception(context);

    REPORTING.store(false, Ordering::SeqCst);
}
