//! # Faultline Utilities
//!
//! Shared logging and helper utilities for Faultline.
//!
//! This crate provides the logging bootstrap used across the workspace,
//! built on `tracing`, plus the console-log capture that lets the crash
//! reporter attach the current session's log output to a report.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_console_capture, init_logging, init_logging_with_level, previous_log_contents, LogFormat, LogLevel,
};
pub use tracing::{debug, error, info, trace, warn};
