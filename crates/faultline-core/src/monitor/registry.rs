//! # Monitor Registry
//!
//! Owns the set of detector backends, activates them by bitmask, and fans a
//! captured event out to the single report-writing callback.
//!
//! The registry is module-level state because the signal handler must reach
//! it without indirection: the monitor table is a fixed array of static
//! singletons, the event callback is an atomic function pointer, and the
//! re-entry gate is a single atomic counter. Nothing here takes a lock or
//! allocates, on either the control path or the capture path.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::context::{CrashContext, FnCell};
use crate::monitor::signal::SIGNAL_MONITOR;
use crate::monitor::user::USER_MONITOR;
use crate::monitor::{Monitor, MonitorType};

/// The single report-write path. Invoked exactly once per captured event,
/// possibly from a signal handler.
pub type EventCallback = fn(&mut CrashContext);

static EVENT_CALLBACK: FnCell<EventCallback> = FnCell::new();
static FAULT_DEPTH: AtomicU32 = AtomicU32::new(0);

/// How deep into the re-entrancy ladder a beginning capture is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDepth
{
    /// Normal capture; write a standard report.
    First,
    /// A fault arrived while a capture was already in progress; write the
    /// reduced recrash report targeting the last report path.
    Reentrant,
    /// Third cumulative fault. Unrecoverable by design: the caller must
    /// terminate the process immediately, with no write attempt.
    Fatal,
}

/// Every detector backend known to this build, in registration order.
pub fn monitors() -> &'static [&'static dyn Monitor]
{
    static MONITORS: [&dyn Monitor; 2] = [&SIGNAL_MONITOR, &USER_MONITOR];
    &MONITORS
}

/// Register (or clear) the report-write callback.
pub fn set_event_callback(callback: Option<EventCallback>)
{
    EVENT_CALLBACK.set(callback);
}

/// Enable every monitor whose bit is set and disable the rest.
///
/// Transitions are idempotent. A monitor whose OS registration fails leaves
/// itself disabled without disturbing the others, so the resulting active
/// mask is whatever actually succeeded.
pub fn set_active_monitors(mask: MonitorType)
{
    debug!(requested = ?mask, "updating active monitors");
    for monitor in monitors() {
        let want = mask.contains(monitor.monitor_type());
        if want != monitor.is_enabled() {
            monitor.set_enabled(want);
        }
    }
}

/// The mask of monitors that are actually enabled right now.
///
/// Recomputed from `is_enabled()` on every call, so a bit never appears for
/// a detector this platform does not support, regardless of what mask was
/// requested.
pub fn active_monitors() -> MonitorType
{
    let mut mask = MonitorType::empty();
    for monitor in monitors() {
        if monitor.is_enabled() {
            mask |= monitor.monitor_type();
        }
    }
    mask
}

/// Claim the next rung of the re-entrancy ladder.
///
/// Called by a fatal detector on handler entry, before anything else. The
/// counter never goes down during a session: a trapped fault either runs
/// its capture to completion or the process exits. It restarts only when a
/// detector begins a fresh enable session ([`reset_capture_depth`]).
pub fn begin_capture() -> CaptureDepth
{
    match FAULT_DEPTH.fetch_add(1, Ordering::SeqCst) {
        0 => CaptureDepth::First,
        1 => CaptureDepth::Reentrant,
        _ => CaptureDepth::Fatal,
    }
}

/// Restart the re-entrancy ladder for a fresh enable session.
///
/// A fault survived (chained through and execution resumed) in a previous
/// session must not misclassify the next session's first capture as
/// re-entrant.
pub fn reset_capture_depth()
{
    FAULT_DEPTH.store(0, Ordering::SeqCst);
}

/// Dispatch a captured event.
///
/// Broadcasts the contextual-info hook to every other enabled monitor (a
/// crash captured by one detector still receives the default classification
/// fields report consumers expect), then invokes the registered write
/// callback exactly once. Runs in the capturing detector's execution
/// context: no locks, no allocation, disabled monitors skipped.
pub fn handle_exception(context: &mut CrashContext)
{
    for monitor in monitors() {
        if monitor.is_enabled() && !context.kind.contains(monitor.monitor_type()) {
            monitor.add_contextual_info(context);
        }
    }

    if let Some(callback) = EVENT_CALLBACK.get() {
        callback(context);
    }
}
