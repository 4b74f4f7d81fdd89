// ABOUTME: Summary counts derived from a finished list of image results.
// ABOUTME: Computed in one pass over the final list, never patched incrementally.

use super::result::ImageCheckResult;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Counts describing a completed or partially completed batch.
///
/// `updated`, `up_to_date`, and `failed` partition the collected results.
/// `total_images` is the number of probes dispatched, so a cancelled batch
/// shows fewer checked images than `total_images`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_containers: usize,
    pub total_images: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub failed: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl Summary {
    /// Derive a summary from the final result list.
    ///
    /// Depends only on the multiset of outcomes, never on their order.
    pub fn from_results(
        total_containers: usize,
        total_images: usize,
        results: &[ImageCheckResult],
        duration: Duration,
    ) -> Self {
        let mut summary = Summary {
            total_containers,
            total_images,
            duration,
            ..Summary::default()
        };

        for result in results {
            if result.is_failed() {
                summary.failed += 1;
            } else if result.update_available {
                summary.updated += 1;
            } else {
                summary.up_to_date += 1;
            }
        }

        summary
    }

    /// Number of images that reported back.
    pub fn checked(&self) -> usize {
        self.updated + self.up_to_date + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.checked() == self.total_images
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} containers, {} images: {} updated, {} up to date, {} failed in {:.1}s",
            self.total_containers,
            self.total_images,
            self.updated,
            self.up_to_date,
            self.failed,
            self.duration.as_secs_f64()
        )
    }
}
