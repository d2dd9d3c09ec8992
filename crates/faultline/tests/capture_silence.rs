//! The capture path must never emit log events: a suspended thread may be
//! holding the subscriber's writer lock, and the handler context forbids
//! locks anyway. This drives a real signal capture through report write,
//! eviction and state persistence under a recording subscriber and asserts
//! the capture window stayed silent.
//!
//! Lives in its own test binary: the recorder must be the process-global
//! subscriber, and the capture depth gate is process-global too.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{span, Event, Metadata, Subscriber};

use faultline::{CrashContext, MonitorType};

static IN_CAPTURE: AtomicBool = AtomicBool::new(false);
static EVENTS_DURING_CAPTURE: AtomicUsize = AtomicUsize::new(0);

/// Counts events that arrive while a capture is in flight.
struct CaptureWindowRecorder;

impl Subscriber for CaptureWindowRecorder
{
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool
    {
        true
    }

    fn new_span(&self, _attrs: &span::Attributes<'_>) -> span::Id
    {
        span::Id::from_u64(1)
    }

    fn record(&self, _span: &span::Id, _values: &span::Record<'_>) {}

    fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}

    fn event(&self, _event: &Event<'_>)
    {
        if IN_CAPTURE.load(Ordering::SeqCst) {
            EVENTS_DURING_CAPTURE.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn enter(&self, _span: &span::Id) {}

    fn exit(&self, _span: &span::Id) {}
}

/// Opens the capture window; runs first thing on the write path.
fn on_capture_begin(_context: &CrashContext)
{
    IN_CAPTURE.store(true, Ordering::SeqCst);
}

// Chained after the capture completes; closes the window and keeps the
// forwarded signal from killing the test process.
extern "C" fn previous_handler(_signum: libc::c_int, _info: *mut libc::siginfo_t, _ctx: *mut libc::c_void)
{
    IN_CAPTURE.store(false, Ordering::SeqCst);
}

fn install_previous_handler()
{
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = previous_handler
            as extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void)
            as usize;
        action.sa_flags = libc::SA_SIGINFO;
        libc::sigemptyset(&mut action.sa_mask);
        assert_eq!(libc::sigaction(libc::SIGTRAP, &action, std::ptr::null_mut()), 0);
    }
}

#[test]
fn capture_window_emits_no_log_events()
{
    tracing::subscriber::set_global_default(CaptureWindowRecorder).unwrap();
    install_previous_handler();

    let dir = tempfile::TempDir::new().unwrap();
    faultline::set_crash_notify_callback(Some(on_capture_begin));
    let active = faultline::install("silence-demo", dir.path()).unwrap();
    assert!(active.contains(MonitorType::SIGNAL));

    // One resident report plus a cap of one forces an eviction during the
    // next capture's prune.
    assert_eq!(faultline::add_user_report(b"{}"), Some(1));
    faultline::set_max_report_count(1);

    unsafe {
        libc::raise(libc::SIGTRAP);
    }

    // The chained handler ran after the capture and closed the window.
    assert!(!IN_CAPTURE.load(Ordering::SeqCst));

    // Write and eviction both happened: the seeded report is gone and the
    // crash report took its place under the next id...
    assert_eq!(faultline::report_ids(10), vec![2]);
    let report: serde_json::Value = serde_json::from_slice(&faultline::read_report(2).unwrap()).unwrap();
    assert_eq!(report["signal"]["name"], "SIGTRAP");
    // ...and none of it touched the subscriber.
    assert_eq!(EVENTS_DURING_CAPTURE.load(Ordering::SeqCst), 0);
}
