//! Installation-level error types.

use faultline_store::StoreError;

/// Errors surfaced by the installation controller.
///
/// Everything past installation is recovered locally: store failures are
/// logged and surfaced as empty results, capture failures produce a report
/// flagged invalid. Only setup itself can fail outright.
#[derive(Debug, thiserror::Error)]
pub enum InstallError
{
    /// Report or data directory could not be created.
    #[error("Failed to prepare installation directory: {0}")]
    Io(#[from] std::io::Error),

    /// The report store could not be initialized.
    #[error("Failed to initialize report store: {0}")]
    Store(#[from] StoreError),
}

/// Result type for installation operations.
pub type InstallResult<T> = Result<T, InstallError>;
