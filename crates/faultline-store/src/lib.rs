//! # faultline-store
//!
//! Persistent, bounded, id-ordered collection of crash report files.
//!
//! One file per report, keyed by a strictly increasing 64-bit id. The next-id
//! counter is persisted in a sidecar next to the reports, so ids never
//! restart at zero after a process restart — not even when every report has
//! been deleted in the meantime.
//!
//! Id allocation is a single atomic increment so the crash capture path can
//! call it while every other thread is suspended: there is no lock a
//! suspended thread could be holding.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::ReportStore;
