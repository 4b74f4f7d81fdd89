// ABOUTME: Container updater trait used after a check finds newer images.
// ABOUTME: Pulls the refreshed image and recreates containers on it.

use super::directory::ContainerInfo;
use crate::types::ContainerId;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait ContainerUpdater: Send + Sync {
    /// Pull the latest version of `image`.
    async fn pull(&self, image: &str) -> Result<(), UpdateError>;

    /// Replace `container` with a new one on the freshly pulled image,
    /// keeping its name and configuration. Returns the new container's ID.
    async fn recreate(
        &self,
        container: &ContainerInfo,
        stop_timeout: Duration,
    ) -> Result<ContainerId, UpdateError>;
}

/// Errors from pulling images or recreating containers.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("pull failed for {image}: {reason}")]
    PullFailed { image: String, reason: String },

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("recreating {container} failed: {reason}")]
    RecreateFailed { container: String, reason: String },

    #[error("recreating {container} failed ({reason}) and restoring the old container failed: {restore}")]
    RestoreFailed {
        container: String,
        reason: String,
        restore: String,
    },
}
