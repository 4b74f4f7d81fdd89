// ABOUTME: Per-image and per-batch check result records.
// ABOUTME: ImageCheckResult is produced once per probe; BatchCheckResult collects them.

use super::error::CheckError;
use super::summary::Summary;
use crate::runtime::ContainerInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Outcome of probing one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageCheckResult {
    /// Image reference exactly as the containers reported it.
    pub image: String,
    pub update_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_digest: Option<String>,
    pub checked_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl ImageCheckResult {
    /// The registry holds a different digest than the one running locally.
    pub fn updated(
        image: impl Into<String>,
        local_digest: impl Into<String>,
        remote_digest: impl Into<String>,
    ) -> Self {
        Self {
            update_available: true,
            local_digest: Some(local_digest.into()),
            remote_digest: Some(remote_digest.into()),
            ..Self::blank(image.into())
        }
    }

    /// The local image matches the registry.
    pub fn up_to_date(image: impl Into<String>, digest: Option<String>) -> Self {
        Self {
            local_digest: digest.clone(),
            remote_digest: digest,
            ..Self::blank(image.into())
        }
    }

    /// The probe could not decide.
    pub fn failed(image: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::blank(image.into())
        }
    }

    fn blank(image: String) -> Self {
        Self {
            image,
            update_available: false,
            error: None,
            local_digest: None,
            remote_digest: None,
            checked_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Updated and not failed.
    pub fn has_update(&self) -> bool {
        !self.is_failed() && self.update_available
    }
}

/// Everything a batch check produced.
///
/// `images` is in arrival order, which varies run to run. `error` holds the
/// first probe failure to arrive, or the cancellation that cut the batch
/// short; `summary` is valid either way.
#[derive(Debug, Serialize)]
pub struct BatchCheckResult {
    pub containers: Vec<ContainerInfo>,
    pub images: Vec<ImageCheckResult>,
    pub summary: Summary,
    #[serde(skip)]
    pub error: Option<CheckError>,
}

impl BatchCheckResult {
    pub(crate) fn empty(containers: Vec<ContainerInfo>) -> Self {
        Self {
            summary: Summary {
                total_containers: containers.len(),
                ..Summary::default()
            },
            containers,
            images: Vec::new(),
            error: None,
        }
    }

    pub fn error(&self) -> Option<&CheckError> {
        self.error.as_ref()
    }

    /// Split off the batch error, keeping the result in both arms.
    pub fn into_result(mut self) -> Result<Self, (Self, CheckError)> {
        match self.error.take() {
            Some(error) => Err((self, error)),
            None => Ok(self),
        }
    }

    /// Every dispatched probe reported back.
    pub fn is_complete(&self) -> bool {
        self.images.len() == self.summary.total_images
    }

    pub fn updated_images(&self) -> impl Iterator<Item = &ImageCheckResult> {
        self.images.iter().filter(|r| r.has_update())
    }

    pub fn failed_images(&self) -> impl Iterator<Item = &ImageCheckResult> {
        self.images.iter().filter(|r| r.is_failed())
    }

    /// Containers in this batch running `image`.
    pub fn containers_using<'a>(
        &'a self,
        image: &'a str,
    ) -> impl Iterator<Item = &'a ContainerInfo> + 'a {
        self.containers.iter().filter(move |c| c.image == image)
    }
}
