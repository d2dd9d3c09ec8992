//! # faultline-core
//!
//! Fault monitors and signal-context capture primitives for Faultline.
//!
//! This crate provides the capture side of the crash reporter, including:
//! - The [`monitor::Monitor`] capability trait and the monitor registry
//! - The signal detector (install / capture / chain protocol)
//! - Machine-state snapshots and the bounded stack cursor
//! - Stop-the-world thread suspension
//!
//! ## Platform Support
//!
//! - **macOS**: Mach APIs (`task_threads`, `thread_suspend`, ...) for thread
//!   suspension; POSIX `sigaction` for the signal detector
//! - **Linux**: POSIX `sigaction`; thread suspension is a no-op (see
//!   [`threads`])
//!
//! ## Why unsafe code is needed
//!
//! The capture protocol executes inside the OS signal-delivery context, where
//! only async-signal-safe primitives may be used: no heap allocation, no
//! locks, no formatting machinery. That rules out most of the safe standard
//! library, so this crate talks to `sigaction`, `sigaltstack`, `ucontext` and
//! the Mach thread APIs directly and wraps them in narrow safe seams.

#![allow(unsafe_code)] // Required for signal handling and Mach thread control

pub mod context;
pub mod error;
pub mod machine;
pub mod monitor;
pub mod signals;
pub mod stack;
pub mod threads;

pub use context::{BoundedStr, CrashContext, EventId, FnCell, UserReport};
pub use error::{CoreResult, MonitorError};
pub use machine::MachineContext;
pub use monitor::registry::{self, CaptureDepth};
pub use monitor::{Monitor, MonitorType};
pub use stack::{StackCursor, MAX_STACK_DEPTH};
