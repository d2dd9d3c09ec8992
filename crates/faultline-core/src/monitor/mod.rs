//! # Monitors
//!
//! Pluggable detector backends, one per class of fault-triggering event.
//!
//! A monitor is a static singleton exposing the small capability set the
//! registry consumes: enable/disable, an enabled query, and a contextual-info
//! hook invoked when *another* monitor captured the event. The set is closed;
//! the registry iterates by capability, never by downcasting.
//!
//! Only the signal detector and the user-reported monitor live in this crate.
//! The remaining [`MonitorType`] variants name external collaborators
//! (hardware and language exception capture, deadlock watchdog, zombie
//! detection, ...) and are simply absent from this registry, so their bits
//! can never appear in the active mask on this platform.

pub mod registry;
pub mod signal;
pub mod user;

use crate::context::CrashContext;

bitflags::bitflags! {
    /// Bitmask of independently combinable detector kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MonitorType: u32 {
        /// Fatal POSIX signals.
        const SIGNAL = 1 << 0;
        /// Hardware exceptions delivered as Mach exceptions.
        const MACH_EXCEPTION = 1 << 1;
        /// Uncaught C++ exceptions.
        const CPP_EXCEPTION = 1 << 2;
        /// Uncaught language-runtime exceptions.
        const NS_EXCEPTION = 1 << 3;
        /// Main-thread deadlock watchdog.
        const DEADLOCK = 1 << 4;
        /// Deallocated-object (zombie) access detection.
        const ZOMBIE = 1 << 5;
        /// Caller-submitted synthetic events.
        const USER_REPORTED = 1 << 6;
        /// Application lifecycle tracking.
        const APP_STATE = 1 << 7;
        /// System information capture.
        const SYSTEM_INFO = 1 << 8;

        /// Every detector that traps a fatal condition.
        const FATAL = Self::SIGNAL.bits()
            | Self::MACH_EXCEPTION.bits()
            | Self::CPP_EXCEPTION.bits()
            | Self::NS_EXCEPTION.bits()
            | Self::DEADLOCK.bits();
        /// Detectors safe to run in production builds.
        const PRODUCTION_SAFE_MINIMAL = Self::FATAL.bits()
            | Self::USER_REPORTED.bits()
            | Self::APP_STATE.bits()
            | Self::SYSTEM_INFO.bits();
    }
}

/// Capability set every detector backend exposes to the registry.
pub trait Monitor: Sync
{
    /// The bit this monitor occupies in the active mask.
    fn monitor_type(&self) -> MonitorType;

    /// Activate or deactivate the detector. Transitions are idempotent; a
    /// failed activation must leave `is_enabled() == false` and must not
    /// disturb other monitors.
    fn set_enabled(&self, enabled: bool);

    /// Whether the last *successful* transition enabled this detector.
    fn is_enabled(&self) -> bool;

    /// Contribute default fields to an event another monitor captured.
    ///
    /// Called from the capturing detector's execution context, which may be
    /// a signal handler: implementations must not allocate or lock.
    fn add_contextual_info(&self, context: &mut CrashContext);
}
