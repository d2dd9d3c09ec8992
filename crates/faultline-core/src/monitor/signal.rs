//! # Signal Detector
//!
//! Installs handlers for the fixed fatal-signal set, captures program state
//! when one fires, and chains to whatever handler was installed before us.
//!
//! Everything between handler entry and the final chain/re-raise runs under
//! async-signal-safety rules: the handler works exclusively with the static
//! state in this module and the crash context cell, suspends every other
//! thread for the duration, and never touches the heap, a lock, or the
//! logging layer.
//!
//! States: Disabled -> Enabling -> Enabled -> Disabling -> Disabled. A
//! failed enable rolls back every signal it touched and leaves the detector
//! disabled.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};

use libc::c_int;
use tracing::{debug, warn};

use crate::context::{crash_context_mut, CrashContext, EventId, RacyCell, EVENT_ID_LEN};
use crate::error::{CoreResult, MonitorError};
use crate::machine;
use crate::monitor::registry::{self, CaptureDepth};
use crate::monitor::{Monitor, MonitorType};
use crate::signals::{self, FATAL_SIGNALS};
use crate::stack::{StackCursor, MAX_STACK_DEPTH};
use crate::threads;

const SIGNAL_COUNT: usize = FATAL_SIGNALS.len();

/// Handler stack sized well above SIGSTKSZ so the capture protocol survives
/// stack exhaustion.
const ALT_STACK_SIZE: usize = 64 * 1024;

/// Per-signal record of the previously installed OS handler.
#[derive(Clone, Copy)]
enum HandlerChainEntry
{
    /// Nothing saved for this signal (detector disabled, or never touched).
    None,
    /// The handler that was registered before ours, restored verbatim on
    /// disable and chained to after capture.
    Saved(libc::sigaction),
}

static ENABLED: AtomicBool = AtomicBool::new(false);
static CHAIN: RacyCell<[HandlerChainEntry; SIGNAL_COUNT]> = RacyCell::new([HandlerChainEntry::None; SIGNAL_COUNT]);
static EVENT_ID: RacyCell<EventId> = RacyCell::new(EventId::zeroed());
static ALT_STACK: RacyCell<[u8; ALT_STACK_SIZE]> = RacyCell::new([0; ALT_STACK_SIZE]);

/// The signal detector singleton.
pub struct SignalMonitor;

/// Registered with the monitor registry; all state lives in module statics
/// so the handler can reach it.
pub static SIGNAL_MONITOR: SignalMonitor = SignalMonitor;

impl Monitor for SignalMonitor
{
    fn monitor_type(&self) -> MonitorType
    {
        MonitorType::SIGNAL
    }

    fn set_enabled(&self, enabled: bool)
    {
        if enabled == ENABLED.load(Ordering::SeqCst) {
            return;
        }
        if enabled {
            regenerate_event_id();
            match install_handlers() {
                Ok(()) => {
                    // A fault survived in a previous session is that
                    // session's history; the ladder restarts with us.
                    registry::reset_capture_depth();
                    ENABLED.store(true, Ordering::SeqCst);
                    debug!("signal handlers installed");
                }
                Err(err) => {
                    // Fail closed: rollback already happened, stay disabled
                    warn!(%err, "failed to install signal handlers");
                }
            }
        } else {
            uninstall_handlers();
            ENABLED.store(false, Ordering::SeqCst);
            debug!("signal handlers uninstalled");
        }
    }

    fn is_enabled(&self) -> bool
    {
        ENABLED.load(Ordering::SeqCst)
    }

    fn add_contextual_info(&self, context: &mut CrashContext)
    {
        // Events captured elsewhere still carry a signal classification;
        // abort is the conventional default.
        if !context.kind.intersects(MonitorType::SIGNAL | MonitorType::MACH_EXCEPTION) {
            context.signum = libc::SIGABRT;
        }
    }
}

/// Address of our handler, for "is the installed handler ours" checks.
pub fn handler_address() -> usize
{
    handle_signal as extern "C" fn(c_int, *mut libc::siginfo_t, *mut libc::c_void) as usize
}

/// One fatal signal and the handler currently installed for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalHandlerInfo
{
    /// Signal number.
    pub signum: c_int,
    /// Conventional signal name.
    pub name: &'static str,
    /// Address of the currently installed handler; `SIG_DFL` reads as 0.
    pub handler_address: usize,
}

/// The fatal-signal set with each signal's currently installed handler.
///
/// Queried from normal context, for hosts that want to audit who sits at
/// the top of the handler chain. Resolving the addresses to module paths is
/// the host's concern.
pub fn signal_handler_info() -> Vec<SignalHandlerInfo>
{
    FATAL_SIGNALS
        .iter()
        .map(|&signum| {
            let mut current = new_sigaction();
            // SAFETY: querying the current disposition only.
            let handler_address = if unsafe { libc::sigaction(signum, std::ptr::null(), &mut current) } == 0 {
                current.sa_sigaction
            } else {
                0
            };
            SignalHandlerInfo {
                signum,
                name: signals::signal_name(signum).unwrap_or("unknown"),
                handler_address,
            }
        })
        .collect()
}

/// The event identifier for the current enable session.
pub fn current_event_id() -> EventId
{
    // SAFETY: written only by enable, read by the handler after enable.
    unsafe { *EVENT_ID.get() }
}

fn regenerate_event_id()
{
    let mut buf = [0u8; EVENT_ID_LEN];
    uuid::Uuid::new_v4().hyphenated().encode_lower(&mut buf);
    // SAFETY: the detector is disabled while this runs; no handler reads.
    unsafe {
        *EVENT_ID.get() = EventId::from_bytes(buf);
    }
}

/// Re-assert our handler at the top of the OS handler chain.
///
/// Used after another actor may have inserted itself above us. Signals that
/// already point at our handler are skipped; anything else is saved into the
/// chain table and replaced.
pub fn reassert_handlers() -> CoreResult<()>
{
    install_handlers()
}

fn new_sigaction() -> libc::sigaction
{
    // SAFETY: sigaction is a plain C struct; zeroed is its ground state.
    unsafe { mem::zeroed() }
}

fn install_handlers() -> CoreResult<()>
{
    // The handler must run even when the faulting thread exhausted its stack.
    let stack = libc::stack_t {
        ss_sp: ALT_STACK.get() as *mut libc::c_void,
        ss_flags: 0,
        ss_size: ALT_STACK_SIZE,
    };
    // SAFETY: the alternate stack buffer is static and stays valid forever.
    if unsafe { libc::sigaltstack(&stack, std::ptr::null_mut()) } != 0 {
        return Err(MonitorError::AltStack(errno()));
    }

    let mut action = new_sigaction();
    action.sa_sigaction = handler_address();
    action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
    // SAFETY: sigemptyset initializes the mask in place.
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
    }

    let mut touched = [false; SIGNAL_COUNT];
    for (i, &signal) in FATAL_SIGNALS.iter().enumerate() {
        let mut current = new_sigaction();
        // SAFETY: querying the current disposition only.
        if unsafe { libc::sigaction(signal, std::ptr::null(), &mut current) } == 0
            && current.sa_sigaction == handler_address()
        {
            // Already covered from a previous enable; keep its chain entry
            continue;
        }

        let mut previous = new_sigaction();
        // SAFETY: action points at our handler with a static alternate stack.
        if unsafe { libc::sigaction(signal, &action, &mut previous) } != 0 {
            let errno = errno();
            rollback(&touched);
            return Err(MonitorError::Registration {
                signal: signals::signal_name(signal).unwrap_or("unknown"),
                errno,
            });
        }
        touched[i] = true;
        // SAFETY: enable/disable are serialized by the registry; no handler
        // consults the chain until ENABLED flips true.
        unsafe {
            (*CHAIN.get())[i] = HandlerChainEntry::Saved(previous);
        }
    }
    Ok(())
}

/// Undo a partial installation, restoring every signal touched in this call.
fn rollback(touched: &[bool; SIGNAL_COUNT])
{
    for (i, &signal) in FATAL_SIGNALS.iter().enumerate() {
        if !touched[i] {
            continue;
        }
        // SAFETY: restores the sigaction we saved moments ago.
        unsafe {
            if let HandlerChainEntry::Saved(previous) = (*CHAIN.get())[i] {
                let _ = libc::sigaction(signal, &previous, std::ptr::null_mut());
            }
            (*CHAIN.get())[i] = HandlerChainEntry::None;
        }
    }
}

fn uninstall_handlers()
{
    for (i, &signal) in FATAL_SIGNALS.iter().enumerate() {
        // SAFETY: restores previously saved dispositions; clears the table.
        unsafe {
            if let HandlerChainEntry::Saved(previous) = (*CHAIN.get())[i] {
                let _ = libc::sigaction(signal, &previous, std::ptr::null_mut());
            }
            (*CHAIN.get())[i] = HandlerChainEntry::None;
        }
    }

    let stack = libc::stack_t {
        ss_sp: std::ptr::null_mut(),
        ss_flags: libc::SS_DISABLE,
        ss_size: ALT_STACK_SIZE,
    };
    // SAFETY: disabling the alternate stack registration; failure is benign.
    unsafe {
        let _ = libc::sigaltstack(&stack, std::ptr::null_mut());
    }
}

fn errno() -> i32
{
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// The installed signal handler. Runs on the alternate stack with the
/// world about to be stopped; async-signal-safety rules apply throughout.
extern "C" fn handle_signal(signum: c_int, info: *mut libc::siginfo_t, user_context: *mut libc::c_void)
{
    let depth = registry::begin_capture();
    if depth == CaptureDepth::Fatal {
        // Third cumulative fault: unrecoverable by design. Exit before
        // touching anything else.
        // SAFETY: _exit is async-signal-safe and does not return.
        unsafe { libc::_exit(signum) };
    }

    if ENABLED.load(Ordering::SeqCst) {
        let suspended = threads::suspend_all_except_current();

        // SAFETY: user_context is the ucontext the kernel delivered to us.
        let machine_context = unsafe { machine::from_signal_context(user_context) };
        let cursor = StackCursor::from_machine_context(&machine_context, MAX_STACK_DEPTH);

        let (fault_address, sigcode) = if info.is_null() {
            (0, 0)
        } else {
            // SAFETY: info points at the siginfo the kernel delivered.
            unsafe { (fault_address_from(info), (*info).si_code) }
        };

        // SAFETY: the world is stopped and the re-entry gate was claimed
        // above, so this is the only live access to the context cell.
        let context = unsafe { crash_context_mut() };
        *context = CrashContext::zeroed();
        context.kind = MonitorType::SIGNAL;
        context.event_id = current_event_id();
        context.fault_address = fault_address;
        context.signum = signum;
        context.sigcode = sigcode;
        context.registers_valid = machine_context.valid;
        context.machine_context = Some(machine_context);
        context.stack_cursor = Some(cursor);
        context.crashed_during_handling = depth == CaptureDepth::Reentrant;

        registry::handle_exception(context);

        threads::resume(suspended);
    }

    // SAFETY: tail of the handler; forwards to the saved previous handler
    // or re-raises for the default disposition.
    unsafe { forward_signal(signum, info, user_context) };
}

#[cfg(target_os = "linux")]
unsafe fn fault_address_from(info: *mut libc::siginfo_t) -> u64
{
    (*info).si_addr() as u64
}

#[cfg(not(target_os = "linux"))]
unsafe fn fault_address_from(info: *mut libc::siginfo_t) -> u64
{
    (*info).si_addr as u64
}

/// Forward a handled signal to whatever was installed before us, so the
/// default OS behavior (core dump, process death, a cooperating runtime's
/// own handler) still occurs.
unsafe fn forward_signal(signum: c_int, info: *mut libc::siginfo_t, user_context: *mut libc::c_void)
{
    if let Some(index) = signals::index_of(signum) {
        if let HandlerChainEntry::Saved(previous) = (*CHAIN.get())[index] {
            let handler = previous.sa_sigaction;
            if handler == libc::SIG_IGN {
                return;
            }
            if handler != libc::SIG_DFL {
                if previous.sa_flags & libc::SA_SIGINFO != 0 {
                    let f: extern "C" fn(c_int, *mut libc::siginfo_t, *mut libc::c_void) = mem::transmute(handler);
                    return f(signum, info, user_context);
                }
                let f: extern "C" fn(c_int) = mem::transmute(handler);
                return f(signum);
            }
        }
    }

    // No previous handler: restore the default disposition and re-raise so
    // the kernel can still produce a core dump / kill the process.
    let mut action = new_sigaction();
    action.sa_sigaction = libc::SIG_DFL;
    libc::sigaction(signum, &action, std::ptr::null_mut());
    libc::raise(signum);
}
