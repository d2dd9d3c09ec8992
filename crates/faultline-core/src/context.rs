//! # Crash Context
//!
//! The process-wide record a detector fills in when it traps a fault.
//!
//! Exactly one [`CrashContext`] instance exists for the lifetime of the
//! process. It is zeroed at the start of each capture and handed by reference
//! through the registry to the report-writing callback. Because the capture
//! protocol runs with every other thread suspended and re-entry bounded by an
//! atomic gate (see [`crate::monitor::registry`]), plain stores into the
//! shared instance are race-free by protocol rather than by lock.
//!
//! Everything in this module is sized up front: detectors copy strings into
//! bounded buffers instead of allocating, because the capture context cannot
//! touch the heap (a suspended thread may hold the allocator lock).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::machine::MachineContext;
use crate::monitor::MonitorType;
use crate::stack::StackCursor;

/// Length of a hyphenated UUID, the on-wire form of an event identifier.
pub const EVENT_ID_LEN: usize = 36;

/// Session-scoped event identifier.
///
/// Generated once when a detector is enabled and reused for every capture in
/// that session. Stored as fixed ASCII so the signal handler can copy it
/// without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventId([u8; EVENT_ID_LEN]);

impl EventId
{
    /// The all-zero identifier used before any detector has been enabled.
    pub const fn zeroed() -> Self
    {
        EventId([0; EVENT_ID_LEN])
    }

    /// Wrap a pre-formatted identifier buffer.
    pub const fn from_bytes(bytes: [u8; EVENT_ID_LEN]) -> Self
    {
        EventId(bytes)
    }

    /// The identifier as a string slice, or `""` if it was never generated.
    pub fn as_str(&self) -> &str
    {
        if self.0[0] == 0 {
            return "";
        }
        std::str::from_utf8(&self.0).unwrap_or("")
    }
}

/// Fixed-capacity string buffer.
///
/// Copies are truncated at a UTF-8 boundary so `as_str` always yields valid
/// text. Used for user-report fields that must survive inside the single
/// static [`CrashContext`] without owning heap memory.
#[derive(Debug, Clone, Copy)]
pub struct BoundedStr<const N: usize>
{
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> BoundedStr<N>
{
    pub const fn new() -> Self
    {
        BoundedStr { buf: [0; N], len: 0 }
    }

    /// Copy `s` into the buffer, truncating at the last char boundary that
    /// fits.
    pub fn set(&mut self, s: &str)
    {
        let mut end = s.len().min(N);
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf[..end].copy_from_slice(&s.as_bytes()[..end]);
        self.len = end;
    }

    pub fn as_str(&self) -> &str
    {
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }
}

impl<const N: usize> Default for BoundedStr<N>
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Caller-supplied description of a user-reported exception.
#[derive(Debug, Clone, Copy)]
pub struct UserReport
{
    /// Exception name or class.
    pub name: BoundedStr<128>,
    /// Human-readable reason.
    pub reason: BoundedStr<256>,
    /// Originating language or framework, if any.
    pub language: BoundedStr<32>,
    /// Source location, if the caller knows it.
    pub line_of_code: BoundedStr<128>,
}

impl UserReport
{
    pub const fn empty() -> Self
    {
        UserReport {
            name: BoundedStr::new(),
            reason: BoundedStr::new(),
            language: BoundedStr::new(),
            line_of_code: BoundedStr::new(),
        }
    }
}

/// Snapshot of a captured event, filled in by the trapping detector.
#[derive(Debug, Clone, Copy)]
pub struct CrashContext
{
    /// Which detector captured the event.
    pub kind: MonitorType,
    /// Session-scoped event identifier.
    pub event_id: EventId,
    /// Address whose access faulted, when the signal carries one.
    pub fault_address: u64,
    /// Signal number, or the default classification supplied by the signal
    /// detector's contextual-info hook.
    pub signum: i32,
    /// Signal code qualifying `signum`.
    pub sigcode: i32,
    /// Register snapshot taken from the trap context.
    pub machine_context: Option<MachineContext>,
    /// Bounded backward walk over the crashed thread's stack.
    pub stack_cursor: Option<StackCursor>,
    /// False when the machine state could not be recovered; the report is
    /// still written, flagged invalid rather than dropped.
    pub registers_valid: bool,
    /// Set when this capture began while another capture was in progress.
    /// The write path must target the reduced recrash report.
    pub crashed_during_handling: bool,
    /// Set for synthetic, caller-submitted events; these do not mark the
    /// application as crashed.
    pub user_reported: bool,
    /// Caller-supplied detail for user-reported events.
    pub user: Option<UserReport>,
    /// Console log to attach to the report, when the host enabled that.
    pub console_log_path: Option<&'static str>,
}

impl CrashContext
{
    pub const fn zeroed() -> Self
    {
        CrashContext {
            kind: MonitorType::empty(),
            event_id: EventId::zeroed(),
            fault_address: 0,
            signum: 0,
            sigcode: 0,
            machine_context: None,
            stack_cursor: None,
            registers_valid: false,
            crashed_during_handling: false,
            user_reported: false,
            user: None,
            console_log_path: None,
        }
    }
}

/// Interior-mutable cell shared with the signal handler.
///
/// Mutation is serialized by the capture protocol itself (stop-the-world
/// pause plus the registry's atomic re-entry gate), never by a lock.
pub(crate) struct RacyCell<T>(UnsafeCell<T>);

// SAFETY: access is serialized by the capture protocol; see module docs.
unsafe impl<T> Sync for RacyCell<T> {}

impl<T> RacyCell<T>
{
    pub(crate) const fn new(value: T) -> Self
    {
        RacyCell(UnsafeCell::new(value))
    }

    pub(crate) fn get(&self) -> *mut T
    {
        self.0.get()
    }
}

/// Lock-free cell holding an optional callback function pointer.
///
/// Readable from the capture context with a single atomic load, with the
/// null address reserved for "no callback". `F` must be a plain `fn`
/// pointer type; this is the one place a callback crosses from normal code
/// into the handler, so the unsafety lives here instead of in every caller.
pub struct FnCell<F>
{
    slot: AtomicUsize,
    _marker: std::marker::PhantomData<F>,
}

impl<F: Copy> FnCell<F>
{
    pub const fn new() -> Self
    {
        FnCell {
            slot: AtomicUsize::new(0),
            _marker: std::marker::PhantomData,
        }
    }

    /// Register (or clear) the callback.
    pub fn set(&self, callback: Option<F>)
    {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
        let raw = match callback {
            // SAFETY: F is an address-sized fn pointer, never null.
            Some(f) => unsafe { std::mem::transmute_copy::<F, usize>(&f) },
            None => 0,
        };
        self.slot.store(raw, Ordering::SeqCst);
    }

    /// The registered callback, if any.
    pub fn get(&self) -> Option<F>
    {
        let raw = self.slot.load(Ordering::SeqCst);
        if raw == 0 {
            return None;
        }
        // SAFETY: the only writer is `set`, which stores 0 or a valid F.
        Some(unsafe { std::mem::transmute_copy::<usize, F>(&raw) })
    }
}

static CRASH_CONTEXT: RacyCell<CrashContext> = RacyCell::new(CrashContext::zeroed());

/// The single live crash context.
///
/// # Safety
///
/// The caller must hold the capture serialization described in the module
/// docs: either it is the trapping detector running with the world stopped,
/// or it is a synthetic capture path that has excluded concurrent captures.
pub unsafe fn crash_context_mut() -> &'static mut CrashContext
{
    &mut *CRASH_CONTEXT.get()
}

const LAST_REPORT_PATH_CAP: usize = 1024;

static LAST_REPORT_PATH: RacyCell<[u8; LAST_REPORT_PATH_CAP]> = RacyCell::new([0; LAST_REPORT_PATH_CAP]);
static LAST_REPORT_PATH_LEN: AtomicUsize = AtomicUsize::new(0);

/// Record the path of the most recently allocated report.
///
/// The recrash path targets this instead of allocating a new id. Only the
/// write callback stores here, and only while it owns the capture, so the
/// store/len pair cannot tear.
pub fn set_last_report_path(path: &str)
{
    let bytes = path.as_bytes();
    let len = bytes.len().min(LAST_REPORT_PATH_CAP);
    // SAFETY: serialized by the capture protocol (single writer).
    unsafe {
        (&mut *LAST_REPORT_PATH.get())[..len].copy_from_slice(&bytes[..len]);
    }
    LAST_REPORT_PATH_LEN.store(len, Ordering::SeqCst);
}

/// Run `f` over the last allocated report path, if one exists.
pub fn with_last_report_path<R>(f: impl FnOnce(&str) -> R) -> Option<R>
{
    let len = LAST_REPORT_PATH_LEN.load(Ordering::SeqCst);
    if len == 0 {
        return None;
    }
    // SAFETY: single-writer protocol; the bytes below `len` are initialized.
    let bytes = unsafe { &(&*LAST_REPORT_PATH.get())[..len] };
    std::str::from_utf8(bytes).ok().map(f)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn bounded_str_truncates_at_char_boundary()
    {
        let mut s: BoundedStr<6> = BoundedStr::new();
        s.set("héllo world");
        // 'é' is two bytes; truncation must not split it
        assert!(s.as_str().is_char_boundary(s.as_str().len()));
        assert!(s.as_str().len() <= 6);
        assert!(s.as_str().starts_with("h"));

        let mut exact: BoundedStr<5> = BoundedStr::new();
        exact.set("hello");
        assert_eq!(exact.as_str(), "hello");
    }

    #[test]
    fn bounded_str_overwrites_previous_contents()
    {
        let mut s: BoundedStr<32> = BoundedStr::new();
        s.set("first value");
        s.set("ok");
        assert_eq!(s.as_str(), "ok");
    }

    #[test]
    fn event_id_zeroed_reads_as_empty()
    {
        assert_eq!(EventId::zeroed().as_str(), "");
    }

    #[test]
    fn fn_cell_round_trips_a_callback()
    {
        fn touch(context: &mut CrashContext)
        {
            context.signum = 7;
        }

        static CELL: FnCell<fn(&mut CrashContext)> = FnCell::new();
        assert!(CELL.get().is_none());

        CELL.set(Some(touch as fn(&mut CrashContext)));
        let mut context = CrashContext::zeroed();
        CELL.get().unwrap()(&mut context);
        assert_eq!(context.signum, 7);

        CELL.set(None);
        assert!(CELL.get().is_none());
    }

    #[test]
    fn last_report_path_round_trip()
    {
        set_last_report_path("/tmp/app-report-0000000000000001.json");
        let seen = with_last_report_path(|p| p.to_string());
        assert_eq!(seen.as_deref(), Some("/tmp/app-report-0000000000000001.json"));
    }
}
