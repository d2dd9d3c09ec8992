//! End-to-end capture over a real raised signal.
//!
//! Raising a fatal signal consumes rungs of the process-global re-entrancy
//! ladder, so this file owns its process: one test, two raises, and a
//! previously installed handler that lets execution continue afterwards.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicUsize, Ordering};

use faultline_core::monitor::signal;
use faultline_core::{registry, CrashContext, MonitorType, MAX_STACK_DEPTH};

static PREVIOUS_HANDLER_CALLS: AtomicU32 = AtomicU32::new(0);

extern "C" fn previous_handler(_sig: libc::c_int, _info: *mut libc::siginfo_t, _ctx: *mut libc::c_void)
{
    PREVIOUS_HANDLER_CALLS.fetch_add(1, Ordering::SeqCst);
}

static CALLBACK_CALLS: AtomicU32 = AtomicU32::new(0);
static SEEN_KIND: AtomicU32 = AtomicU32::new(0);
static SEEN_SIGNUM: AtomicI32 = AtomicI32::new(0);
static SEEN_REGISTERS_VALID: AtomicBool = AtomicBool::new(false);
static SEEN_REENTRANT: AtomicBool = AtomicBool::new(false);
static SEEN_FRAME_COUNT: AtomicUsize = AtomicUsize::new(0);
static SEEN_EVENT_ID: AtomicBool = AtomicBool::new(false);

fn on_event(context: &mut CrashContext)
{
    CALLBACK_CALLS.fetch_add(1, Ordering::SeqCst);
    SEEN_KIND.store(context.kind.bits(), Ordering::SeqCst);
    SEEN_SIGNUM.store(context.signum, Ordering::SeqCst);
    SEEN_REGISTERS_VALID.store(context.registers_valid, Ordering::SeqCst);
    SEEN_REENTRANT.store(context.crashed_during_handling, Ordering::SeqCst);
    SEEN_EVENT_ID.store(!context.event_id.as_str().is_empty(), Ordering::SeqCst);
    if let Some(cursor) = context.stack_cursor {
        // Drain a copy; the context keeps the original un-walked
        SEEN_FRAME_COUNT.store(cursor.count(), Ordering::SeqCst);
    }
}

#[test]
fn raised_signal_is_captured_then_chained_to_the_previous_handler()
{
    // Install a forwarding target before the detector, so it gets saved
    // into the chain table.
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction =
        previous_handler as extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void) as usize;
    action.sa_flags = libc::SA_SIGINFO;
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGTRAP, &action, std::ptr::null_mut());
    }

    registry::set_event_callback(Some(on_event));
    registry::set_active_monitors(MonitorType::SIGNAL);
    assert!(registry::active_monitors().contains(MonitorType::SIGNAL));

    unsafe {
        libc::raise(libc::SIGTRAP);
    }

    assert_eq!(CALLBACK_CALLS.load(Ordering::SeqCst), 1, "write callback runs exactly once");
    assert_eq!(
        PREVIOUS_HANDLER_CALLS.load(Ordering::SeqCst),
        1,
        "saved handler is chained to with the original signal"
    );
    assert_eq!(SEEN_KIND.load(Ordering::SeqCst), MonitorType::SIGNAL.bits());
    assert_eq!(SEEN_SIGNUM.load(Ordering::SeqCst), libc::SIGTRAP);
    assert!(!SEEN_REENTRANT.load(Ordering::SeqCst));
    assert!(SEEN_EVENT_ID.load(Ordering::SeqCst), "session event id is populated");

    let frames = SEEN_FRAME_COUNT.load(Ordering::SeqCst);
    assert!(frames <= MAX_STACK_DEPTH, "cursor is bounded at the maximum depth");

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    {
        assert!(SEEN_REGISTERS_VALID.load(Ordering::SeqCst), "trap registers recovered");
        assert!(frames >= 1, "at least the faulting frame is produced");
    }

    // A second fault while the first capture has already run takes the
    // re-entrant path: a reduced report, not a fresh one.
    unsafe {
        libc::raise(libc::SIGTRAP);
    }
    assert_eq!(CALLBACK_CALLS.load(Ordering::SeqCst), 2);
    assert!(SEEN_REENTRANT.load(Ordering::SeqCst));
    assert_eq!(PREVIOUS_HANDLER_CALLS.load(Ordering::SeqCst), 2);

    // Disabling restores the saved handler verbatim
    registry::set_active_monitors(MonitorType::empty());
    let mut restored: libc::sigaction = unsafe { std::mem::zeroed() };
    unsafe {
        libc::sigaction(libc::SIGTRAP, std::ptr::null(), &mut restored);
    }
    assert_eq!(restored.sa_sigaction, action.sa_sigaction);
    assert_ne!(restored.sa_sigaction, signal::handler_address());
}
