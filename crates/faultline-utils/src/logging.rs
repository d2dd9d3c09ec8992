//! # Logging Utilities
//!
//! Logging infrastructure for Faultline using `tracing`.
//!
//! This module provides structured logging with support for:
//! - Multiple output formats (JSON for production, pretty for development)
//! - Environment variable configuration
//! - Console-log capture into a file the crash reporter can attach to reports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use faultline_utils::init_logging;
//!
//! init_logging().expect("Failed to initialize logging");
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: log level filter (e.g. `debug`, `faultline_core=debug`)
//! - `FAULTLINE_LOG_FORMAT`: output format (`json` or `pretty`, default: `pretty`)
//!
//! None of this runs anywhere near the signal-delivery context: the crash
//! capture path never logs, by rule; logging happens strictly before install
//! and after a capture has completed.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use tracing::Level;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default for development)
    Pretty,
    /// JSON format (default for production)
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Initialize logging with default settings
///
/// Reads configuration from environment variables:
/// - `RUST_LOG`: log level filter
/// - `FAULTLINE_LOG_FORMAT`: output format (`json` or `pretty`)
///
/// ## Errors
///
/// Returns an error if logging is already initialized.
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = env::var("FAULTLINE_LOG_FORMAT")
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or(LogFormat::Pretty);

    let default_level = env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse::<LogLevel>()
        .map(Into::into)
        .unwrap_or(Level::INFO);

    init_logging_internal(format, default_level, None)
}

/// Initialize logging with explicit level and format
///
/// ## Errors
///
/// Returns an error if logging is already initialized.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_logging_internal(format, level.into(), None)
}

/// Initialize logging with an additional console-capture file.
///
/// Everything that reaches the console is also mirrored (without ANSI) into
/// `capture_file`, so the crash reporter can attach the current session's
/// log output to a report. The file is truncated for each session; the
/// previous session's contents should be read with
/// [`previous_log_contents`] *before* calling this.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the capture file's
/// directory cannot be created.
pub fn init_console_capture(capture_file: &Path) -> Result<(), LoggingError>
{
    let format = env::var("FAULTLINE_LOG_FORMAT")
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or(LogFormat::Pretty);

    if let Some(parent) = capture_file.parent() {
        fs::create_dir_all(parent)?;
    }
    init_logging_internal(format, Level::INFO, Some(capture_file.to_path_buf()))
}

/// Contents of a previous session's console log, if one exists.
pub fn previous_log_contents(path: &Path) -> Option<String>
{
    fs::read_to_string(path).ok().filter(|s| !s.is_empty())
}

fn env_filter(default_level: Level) -> EnvFilter
{
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}

fn init_logging_internal(format: LogFormat, default_level: Level, capture_file: Option<PathBuf>) -> Result<(), LoggingError>
{
    let file_layer = match capture_file {
        Some(path) => {
            let file_appender = tracing_appender::rolling::never(
                path.parent().unwrap_or(Path::new(".")),
                path.file_name().unwrap_or(std::ffi::OsStr::new("console.log")),
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // The guard must outlive the process or buffered lines are lost
            std::mem::forget(guard);

            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false) // No ANSI in files
                    .with_filter(env_filter(default_level)),
            )
        }
        None => None,
    };

    match format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stdout)
                .with_filter(env_filter(default_level));

            Registry::default()
                .with(file_layer)
                .with(console_layer)
                .try_init()
                .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(io::stdout)
                .with_filter(env_filter(default_level));

            Registry::default()
                .with(file_layer)
                .with(console_layer)
                .try_init()
                .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        }
    }

    Ok(())
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),

    /// A global subscriber was already set by someone else
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("dev").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("prod").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warn").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn previous_log_contents_requires_a_nonempty_file()
    {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("console.log");
        assert!(previous_log_contents(&path).is_none());

        fs::write(&path, "").unwrap();
        assert!(previous_log_contents(&path).is_none());

        fs::write(&path, "previous session output\n").unwrap();
        assert_eq!(previous_log_contents(&path).unwrap(), "previous session output\n");
    }
}
