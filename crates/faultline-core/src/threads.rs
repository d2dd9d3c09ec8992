//! # Thread Suspension
//!
//! Stop-the-world pause used as the sole synchronization mechanism during
//! capture.
//!
//! The capture protocol must never take a lock: any suspended thread might
//! hold it. Suspending every other thread at the OS level sidesteps the
//! problem entirely, at the cost of a deliberately heavy pause. Platform
//! specifics stay behind [`suspend_all_except_current`] / [`resume`] so the
//! signal detector never sees them.
//!
//! ## macOS
//!
//! Uses the Mach APIs: `task_threads()` to enumerate, `thread_suspend()` /
//! `thread_resume()` per thread, with the kernel-allocated thread array kept
//! alive inside the handle and released with `vm_deallocate()` on resume.
//! Nothing in this path allocates from our heap.
//!
//! ## Other platforms
//!
//! There is no portable in-process equivalent; the handle is empty and the
//! pause degrades to the registry's atomic re-entry gate.

#[cfg(target_os = "macos")]
mod imp
{
    use libc::{mach_msg_type_number_t, thread_act_t, vm_address_t, vm_size_t};
    use mach2::kern_return::KERN_SUCCESS;
    use mach2::task::task_threads;
    use mach2::traps::mach_task_self;

    mod ffi
    {
        use libc::{kern_return_t, mach_port_t, thread_act_t, vm_address_t, vm_map_t, vm_size_t};

        extern "C" {
            pub fn thread_suspend(target_act: thread_act_t) -> kern_return_t;
            pub fn thread_resume(target_act: thread_act_t) -> kern_return_t;
            pub fn mach_thread_self() -> thread_act_t;
            pub fn mach_port_deallocate(task: mach_port_t, name: mach_port_t) -> kern_return_t;
            pub fn vm_deallocate(task: vm_map_t, address: vm_address_t, size: vm_size_t) -> kern_return_t;
        }
    }

    /// Ownership of a stopped world: the kernel-allocated thread array plus
    /// the thread that stayed running.
    pub struct SuspendHandle
    {
        threads: *mut thread_act_t,
        count: mach_msg_type_number_t,
        caller: thread_act_t,
    }

    pub fn suspend_all_except_current() -> SuspendHandle
    {
        let mut threads: *mut thread_act_t = std::ptr::null_mut();
        let mut count: mach_msg_type_number_t = 0;
        // SAFETY: task_threads writes a kernel-allocated array; the handle
        // keeps it alive until resume() releases it.
        unsafe {
            let caller = ffi::mach_thread_self();
            if task_threads(mach_task_self(), &mut threads, &mut count) != KERN_SUCCESS {
                return SuspendHandle {
                    threads: std::ptr::null_mut(),
                    count: 0,
                    caller,
                };
            }
            for i in 0..count as usize {
                let thread = *threads.add(i);
                if thread != caller {
                    let _ = ffi::thread_suspend(thread);
                }
            }
            SuspendHandle { threads, count, caller }
        }
    }

    pub fn resume(handle: SuspendHandle)
    {
        if handle.threads.is_null() {
            return;
        }
        // SAFETY: the array was produced by task_threads in suspend; every
        // port in it is released here along with the array itself.
        unsafe {
            for i in 0..handle.count as usize {
                let thread = *handle.threads.add(i);
                if thread != handle.caller {
                    let _ = ffi::thread_resume(thread);
                }
                let _ = ffi::mach_port_deallocate(mach_task_self(), thread);
            }
            let size = (handle.count as usize * std::mem::size_of::<thread_act_t>()) as vm_size_t;
            let _ = ffi::vm_deallocate(mach_task_self(), handle.threads as vm_address_t, size);
            let _ = ffi::mach_port_deallocate(mach_task_self(), handle.caller);
        }
    }
}

#[cfg(not(target_os = "macos"))]
mod imp
{
    /// Placeholder handle on platforms without in-process thread control.
    pub struct SuspendHandle
    {
        _private: (),
    }

    pub fn suspend_all_except_current() -> SuspendHandle
    {
        SuspendHandle { _private: () }
    }

    pub fn resume(_handle: SuspendHandle) {}
}

pub use imp::{resume, suspend_all_except_current, SuspendHandle};

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn suspend_resume_round_trip()
    {
        // Spawn a worker so there is something to suspend, then make sure it
        // still finishes after resume.
        let worker = std::thread::spawn(|| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            42u32
        });
        let handle = suspend_all_except_current();
        resume(handle);
        assert_eq!(worker.join().unwrap(), 42);
    }
}
