//! # Report Writer
//!
//! Serializes a captured [`CrashContext`] into the JSON report file the
//! store hands back to consumers.
//!
//! Two shapes exist: the standard report for a first capture, and the
//! reduced recrash report written *over* the previous report file when a
//! fault arrived while the previous capture was still being written. The
//! recrash shape drops everything that is not needed to diagnose the
//! handler-time fault itself.

use std::io;
use std::path::Path;
use std::{fmt::Write as _, fs};

use serde::Serialize;

use faultline_core::{signals, CrashContext};

#[derive(Serialize)]
struct SignalBody
{
    name: String,
    signum: i32,
    code: i32,
    fault_address: String,
}

#[derive(Serialize)]
struct RegisterBody
{
    pc: String,
    sp: String,
    fp: String,
    lr: String,
}

#[derive(Serialize)]
struct UserBody
{
    name: String,
    reason: String,
    language: String,
    line_of_code: String,
}

#[derive(Serialize)]
struct ReportBody
{
    report_type: &'static str,
    app_name: String,
    event_id: String,
    registers_valid: bool,
    crashed_during_handling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    signal: Option<SignalBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registers: Option<RegisterBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    backtrace: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    console_log_path: Option<String>,
}

fn hex(value: u64) -> String
{
    let mut s = String::with_capacity(18);
    let _ = write!(s, "{value:#x}");
    s
}

fn signal_body(context: &CrashContext) -> Option<SignalBody>
{
    if context.signum == 0 {
        return None;
    }
    Some(SignalBody {
        name: signals::signal_name(context.signum).unwrap_or("UNKNOWN").to_string(),
        signum: context.signum,
        code: context.sigcode,
        fault_address: hex(context.fault_address),
    })
}

fn backtrace_of(context: &CrashContext) -> Vec<String>
{
    // The cursor is Copy; walking this copy leaves the captured one intact.
    match context.stack_cursor {
        Some(cursor) => cursor.map(hex).collect(),
        None => Vec::new(),
    }
}

fn build_standard(app_name: &str, context: &CrashContext) -> ReportBody
{
    ReportBody {
        report_type: "standard",
        app_name: app_name.to_string(),
        event_id: context.event_id.as_str().to_string(),
        registers_valid: context.registers_valid,
        crashed_during_handling: context.crashed_during_handling,
        signal: signal_body(context),
        registers: context.machine_context.map(|m| RegisterBody {
            pc: hex(m.pc),
            sp: hex(m.sp),
            fp: hex(m.fp),
            lr: hex(m.lr),
        }),
        backtrace: backtrace_of(context),
        user: context.user.map(|u| UserBody {
            name: u.name.as_str().to_string(),
            reason: u.reason.as_str().to_string(),
            language: u.language.as_str().to_string(),
            line_of_code: u.line_of_code.as_str().to_string(),
        }),
        console_log_path: context.console_log_path.map(str::to_string),
    }
}

/// Write a standard report for a first capture.
pub(crate) fn write_standard(path: &Path, app_name: &str, context: &CrashContext) -> io::Result<()>
{
    let body = build_standard(app_name, context);
    let bytes = serde_json::to_vec_pretty(&body).map_err(io::Error::other)?;
    fs::write(path, bytes)
}

/// Overwrite `path` with the reduced recrash report.
///
/// Keeps only what diagnoses the handler-time fault: signal, registers and
/// the backtrace of the second capture. User detail and console log are the
/// first capture's concern and are dropped.
pub(crate) fn write_recrash(path: &Path, app_name: &str, context: &CrashContext) -> io::Result<()>
{
    let body = ReportBody {
        report_type: "recrash",
        app_name: app_name.to_string(),
        event_id: context.event_id.as_str().to_string(),
        registers_valid: context.registers_valid,
        crashed_during_handling: true,
        signal: signal_body(context),
        registers: context.machine_context.map(|m| RegisterBody {
            pc: hex(m.pc),
            sp: hex(m.sp),
            fp: hex(m.fp),
            lr: hex(m.lr),
        }),
        backtrace: backtrace_of(context),
        user: None,
        console_log_path: None,
    };
    let bytes = serde_json::to_vec_pretty(&body).map_err(io::Error::other)?;
    fs::write(path, bytes)
}
