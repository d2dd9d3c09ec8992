//! # Error Types
//!
//! Error handling for the capture side of the reporter.
//!
//! We use `thiserror` to generate `Error` trait implementations and error
//! messages. Note that none of these errors ever cross the capture boundary:
//! a failed handler registration fails the enable call (the detector stays
//! disabled), and a missing machine state merely flags the report invalid.

use thiserror::Error;

/// Errors raised while enabling or disabling a fault monitor.
///
/// ## Error Categories
///
/// 1. **Registration errors**: the OS refused to install a handler; the
///    enable call rolls back everything it touched and the detector remains
///    disabled (fail closed)
/// 2. **Capture errors**: machine state could not be recovered; a partial
///    report is still written, flagged as having invalid registers
#[derive(Error, Debug)]
pub enum MonitorError
{
    /// `sigaction` refused to install the handler for a signal.
    ///
    /// Whatever was installed before this enable call is restored before the
    /// error is returned, so a partially-enabled detector never exists.
    #[error("failed to register handler for {signal}: errno {errno}")]
    Registration
    {
        /// Name of the signal whose registration failed
        signal: &'static str,
        /// The `errno` value reported by the OS
        errno: i32,
    },

    /// `sigaltstack` refused the alternate signal stack.
    ///
    /// Without an alternate stack the handler could not run under stack
    /// exhaustion, so the detector refuses to enable.
    #[error("alternate signal stack registration failed: errno {0}")]
    AltStack(i32),
}

/// Convenience alias for `Result<T, MonitorError>`
pub type CoreResult<T> = std::result::Result<T, MonitorError>;
