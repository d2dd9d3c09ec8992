//! # Stack Cursor
//!
//! Lazy, bounded, non-restartable walk over a crashed thread's call stack.
//!
//! The cursor starts from a [`MachineContext`] and follows the frame-pointer
//! chain backward: each frame stores the caller's frame pointer at `[fp]` and
//! the return address at `[fp + 8]` (the same layout on x86-64 and arm64).
//! CFI-based unwinding is deliberately out of scope — it needs heap and
//! section lookups that are unavailable inside the signal-delivery context.
//!
//! The walk stops at the first frame that fails a sanity check, at a null
//! program counter, or at [`MAX_STACK_DEPTH`] frames, whichever comes first.
//! Once exhausted it stays exhausted; a consumer that wants to walk twice
//! must copy the cursor before draining it.

use crate::machine::MachineContext;

/// Maximum number of frames a cursor will produce.
pub const MAX_STACK_DEPTH: usize = 50;

/// Iterator over frame program counters, newest frame first.
#[derive(Debug, Clone, Copy)]
pub struct StackCursor
{
    fp: u64,
    next_pc: u64,
    depth: usize,
    max_depth: usize,
}

impl StackCursor
{
    /// Start a walk over the machine state captured at a trap.
    pub fn from_machine_context(mc: &MachineContext, max_depth: usize) -> Self
    {
        StackCursor {
            fp: mc.fp,
            next_pc: mc.pc,
            depth: 0,
            max_depth,
        }
    }

    /// Number of frames produced so far.
    pub fn depth(&self) -> usize
    {
        self.depth
    }

    fn advance(&mut self) -> Option<u64>
    {
        if self.depth >= self.max_depth || self.next_pc == 0 {
            self.next_pc = 0;
            return None;
        }

        let pc = self.next_pc;
        self.depth += 1;

        match read_frame(self.fp) {
            Some((saved_fp, return_addr)) if return_addr != 0 => {
                self.next_pc = return_addr;
                // Frames must move toward higher addresses or the chain is
                // cyclic; a bad saved fp still lets this return address out,
                // then ends the walk.
                self.fp = if saved_fp > self.fp { saved_fp } else { 0 };
            }
            _ => {
                self.next_pc = 0;
            }
        }

        Some(pc)
    }
}

impl Iterator for StackCursor
{
    type Item = u64;

    fn next(&mut self) -> Option<u64>
    {
        self.advance()
    }
}

/// Read `([fp], [fp + 8])` if `fp` looks like a plausible frame pointer.
fn read_frame(fp: u64) -> Option<(u64, u64)>
{
    if fp == 0 || fp % 8 != 0 || fp.checked_add(8).is_none() {
        return None;
    }
    // SAFETY: alignment checked above. The pointed-to memory may still be
    // garbage for a corrupted frame chain; a wild read here faults inside an
    // already-running capture, which the re-entry gate turns into the
    // reduced recrash path rather than a hang.
    unsafe {
        let saved_fp = std::ptr::read_volatile(fp as *const u64);
        let return_addr = std::ptr::read_volatile((fp + 8) as *const u64);
        Some((saved_fp, return_addr))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    /// Lay out a synthetic frame-pointer chain in owned memory and return a
    /// machine context pointing at its newest frame.
    ///
    /// Each frame is two words: [saved fp, return address].
    fn synthetic_chain(return_addrs: &[u64]) -> (Vec<u64>, MachineContext)
    {
        let mut frames = vec![0u64; return_addrs.len() * 2];
        let base = frames.as_ptr() as u64;
        for (i, &ra) in return_addrs.iter().enumerate() {
            let saved_fp = if i + 1 < return_addrs.len() {
                base + ((i + 1) * 2 * 8) as u64
            } else {
                0
            };
            frames[i * 2] = saved_fp;
            frames[i * 2 + 1] = ra;
        }
        let mc = MachineContext {
            pc: 0x1000,
            sp: base,
            fp: base,
            lr: 0,
            valid: true,
        };
        (frames, mc)
    }

    #[test]
    fn walks_a_synthetic_chain_newest_first()
    {
        let (_frames, mc) = synthetic_chain(&[0x2000, 0x3000, 0x4000]);
        let cursor = StackCursor::from_machine_context(&mc, MAX_STACK_DEPTH);
        let pcs: Vec<u64> = cursor.collect();
        assert_eq!(pcs, vec![0x1000, 0x2000, 0x3000, 0x4000]);
    }

    #[test]
    fn respects_the_depth_bound()
    {
        let addrs: Vec<u64> = (1..=20).map(|i| 0x1000 * i as u64).collect();
        let (_frames, mc) = synthetic_chain(&addrs);
        let cursor = StackCursor::from_machine_context(&mc, 5);
        assert_eq!(cursor.count(), 5);
    }

    #[test]
    fn is_not_restartable_after_exhaustion()
    {
        let (_frames, mc) = synthetic_chain(&[0x2000]);
        let mut cursor = StackCursor::from_machine_context(&mc, MAX_STACK_DEPTH);
        while cursor.next().is_some() {}
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn stops_on_misaligned_frame_pointer()
    {
        let mc = MachineContext {
            pc: 0x1000,
            sp: 0,
            fp: 0x1001, // not 8-byte aligned
            lr: 0,
            valid: true,
        };
        let pcs: Vec<u64> = StackCursor::from_machine_context(&mc, MAX_STACK_DEPTH).collect();
        // The trap pc itself is still reported
        assert_eq!(pcs, vec![0x1000]);
    }

    #[test]
    fn zero_pc_produces_nothing()
    {
        let mc = MachineContext::default();
        let mut cursor = StackCursor::from_machine_context(&mc, MAX_STACK_DEPTH);
        assert_eq!(cursor.next(), None);
    }
}
