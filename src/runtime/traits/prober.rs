// ABOUTME: Image prober trait for checking whether an image has moved upstream.
// ABOUTME: One call per image reference; failures may be returned or carried in the result.

use crate::checker::ImageCheckResult;
use crate::types::ParseImageRefError;
use async_trait::async_trait;

/// Determines whether a newer version of an image exists in its registry.
///
/// Implementations may report failure either by returning `Err` or by
/// returning a result whose `error` is set; the checker treats both alike.
#[async_trait]
pub trait ImageProber: Send + Sync {
    async fn check_update(&self, image: &str) -> Result<ImageCheckResult, ProbeError>;
}

/// Errors from probing a single image.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid image reference: {0}")]
    InvalidReference(#[from] ParseImageRefError),

    #[error("image not present locally: {0}")]
    NotLocal(String),

    #[error("image has no repository digest (built locally?): {0}")]
    NoRepoDigest(String),

    #[error("registry lookup failed for {image}: {reason}")]
    Registry { image: String, reason: String },

    #[error("runtime error: {0}")]
    Runtime(String),
}
