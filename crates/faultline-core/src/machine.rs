//! # Machine Context
//!
//! Register snapshot taken from the OS-supplied trap context.
//!
//! Only the registers the stack cursor needs are captured: program counter,
//! stack pointer, frame pointer, and (on arm64) the link register. The
//! conversion reads the `ucontext_t` the kernel hands to the signal handler,
//! so both the layout and the field names are per-OS, per-architecture.
//!
//! On combinations this crate does not know, the snapshot comes back with
//! `valid == false`; the capture protocol still writes a report, flagged as
//! having invalid registers rather than dropped.

/// Minimal register snapshot for stack walking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineContext
{
    /// Program counter at the trap.
    pub pc: u64,
    /// Stack pointer at the trap.
    pub sp: u64,
    /// Frame pointer at the trap.
    pub fp: u64,
    /// Link register (arm64 only, zero elsewhere).
    pub lr: u64,
    /// Whether the registers were actually recovered.
    pub valid: bool,
}

/// Build a snapshot from the `ucontext_t` passed to a signal handler.
///
/// # Safety
///
/// `ucontext` must be the pointer the kernel delivered to the currently
/// executing signal handler (or null, which yields an invalid snapshot).
pub unsafe fn from_signal_context(ucontext: *const libc::c_void) -> MachineContext
{
    if ucontext.is_null() {
        return MachineContext::default();
    }
    from_ucontext(ucontext)
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
unsafe fn from_ucontext(ucontext: *const libc::c_void) -> MachineContext
{
    let uc = &*(ucontext as *const libc::ucontext_t);
    let gregs = &uc.uc_mcontext.gregs;
    MachineContext {
        pc: gregs[libc::REG_RIP as usize] as u64,
        sp: gregs[libc::REG_RSP as usize] as u64,
        fp: gregs[libc::REG_RBP as usize] as u64,
        lr: 0,
        valid: true,
    }
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
unsafe fn from_ucontext(ucontext: *const libc::c_void) -> MachineContext
{
    let uc = &*(ucontext as *const libc::ucontext_t);
    let mc = &uc.uc_mcontext;
    MachineContext {
        pc: mc.pc,
        sp: mc.sp,
        fp: mc.regs[29],
        lr: mc.regs[30],
        valid: true,
    }
}

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
unsafe fn from_ucontext(ucontext: *const libc::c_void) -> MachineContext
{
    let uc = &*(ucontext as *const libc::ucontext_t);
    if uc.uc_mcontext.is_null() {
        return MachineContext::default();
    }
    let ss = &(*uc.uc_mcontext).__ss;
    MachineContext {
        pc: ss.__rip,
        sp: ss.__rsp,
        fp: ss.__rbp,
        lr: 0,
        valid: true,
    }
}

#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
unsafe fn from_ucontext(ucontext: *const libc::c_void) -> MachineContext
{
    let uc = &*(ucontext as *const libc::ucontext_t);
    if uc.uc_mcontext.is_null() {
        return MachineContext::default();
    }
    let ss = &(*uc.uc_mcontext).__ss;
    MachineContext {
        pc: ss.__pc,
        sp: ss.__sp,
        fp: ss.__fp,
        lr: ss.__lr,
        valid: true,
    }
}

#[cfg(not(any(
    all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")),
    all(target_os = "macos", any(target_arch = "x86_64", target_arch = "aarch64")),
)))]
unsafe fn from_ucontext(_ucontext: *const libc::c_void) -> MachineContext
{
    MachineContext::default()
}
