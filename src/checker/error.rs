// ABOUTME: Error types for batch image checks.
// ABOUTME: Separates resolution failures, probe failures, and cancellation.

use crate::runtime::DirectoryError;

/// Errors surfaced by a batch check.
///
/// Only `Resolution` prevents a batch from starting. `Probe` and `Cancelled`
/// always travel alongside a populated [`BatchCheckResult`](super::BatchCheckResult).
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// The container directory could not produce the container list.
    #[error("failed to resolve containers: {0}")]
    Resolution(#[from] DirectoryError),

    /// The first probe failure, in arrival order.
    #[error("checking image {image} failed: {message}")]
    Probe { image: String, message: String },

    /// The batch was cancelled before every probe reported back.
    #[error("check cancelled after {completed} of {dispatched} images")]
    Cancelled { completed: usize, dispatched: usize },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckErrorKind {
    Resolution,
    Probe,
    Cancelled,
}

impl CheckError {
    pub fn kind(&self) -> CheckErrorKind {
        match self {
            CheckError::Resolution(_) => CheckErrorKind::Resolution,
            CheckError::Probe { .. } => CheckErrorKind::Probe,
            CheckError::Cancelled { .. } => CheckErrorKind::Cancelled,
        }
    }

    /// Image whose probe produced this error, if any.
    pub fn image(&self) -> Option<&str> {
        match self {
            CheckError::Probe { image, .. } => Some(image),
            _ => None,
        }
    }
}
