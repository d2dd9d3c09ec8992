//! Fatal-signal table and name lookups.
//!
//! The fixed set of signals the detector traps, ordered; the handler chain
//! table is indexed by position in this list.

use libc::c_int;

/// Signals treated as fatal and trapped by the signal detector.
pub const FATAL_SIGNALS: [c_int; 8] = [
    libc::SIGABRT,
    libc::SIGBUS,
    libc::SIGFPE,
    libc::SIGILL,
    libc::SIGPIPE,
    libc::SIGSEGV,
    libc::SIGSYS,
    libc::SIGTRAP,
];

/// Position of `signum` in [`FATAL_SIGNALS`], if it is one of ours.
pub fn index_of(signum: c_int) -> Option<usize>
{
    FATAL_SIGNALS.iter().position(|&s| s == signum)
}

/// Conventional name for a fatal signal.
pub fn signal_name(signum: c_int) -> Option<&'static str>
{
    match signum {
        libc::SIGABRT => Some("SIGABRT"),
        libc::SIGBUS => Some("SIGBUS"),
        libc::SIGFPE => Some("SIGFPE"),
        libc::SIGILL => Some("SIGILL"),
        libc::SIGPIPE => Some("SIGPIPE"),
        libc::SIGSEGV => Some("SIGSEGV"),
        libc::SIGSYS => Some("SIGSYS"),
        libc::SIGTRAP => Some("SIGTRAP"),
        _ => None,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn every_fatal_signal_has_a_name_and_index()
    {
        for (i, &sig) in FATAL_SIGNALS.iter().enumerate() {
            assert_eq!(index_of(sig), Some(i));
            assert!(signal_name(sig).is_some());
        }
    }

    #[test]
    fn non_fatal_signals_are_rejected()
    {
        assert_eq!(index_of(libc::SIGUSR1), None);
        assert_eq!(signal_name(libc::SIGUSR1), None);
    }
}
