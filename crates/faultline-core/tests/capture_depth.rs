//! Re-entrancy ladder.
//!
//! The fault-depth counter is process-global and only restarts when a
//! detector begins a fresh enable session, so this file holds the single
//! test that climbs it.

use faultline_core::{registry, CaptureDepth};

#[test]
fn fault_depth_climbs_first_reentrant_fatal()
{
    assert_eq!(registry::begin_capture(), CaptureDepth::First);
    assert_eq!(registry::begin_capture(), CaptureDepth::Reentrant);
    assert_eq!(registry::begin_capture(), CaptureDepth::Fatal);
    // Once fatal, always fatal
    assert_eq!(registry::begin_capture(), CaptureDepth::Fatal);
}
