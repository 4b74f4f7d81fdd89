// ABOUTME: Fan-out/fan-in orchestration for one batch of image probes.
// ABOUTME: One task per unique image; a single loop collects results and feeds the sink.

use super::error::CheckError;
use super::result::{BatchCheckResult, ImageCheckResult};
use super::sink::ResultSink;
use super::summary::Summary;
use crate::runtime::{ContainerInfo, ImageProber};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Tuning for a batch check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckOptions {
    /// Upper bound on probes in flight. `None` runs every probe at once.
    pub max_concurrency: Option<usize>,

    /// A probe running longer than this is recorded as failed.
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Option<Duration>,
}

/// Unique image references across `containers`, in first-seen order.
pub fn unique_images(containers: &[ContainerInfo]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(containers.len());
    containers
        .iter()
        .filter(|c| seen.insert(c.image.as_str()))
        .map(|c| c.image.clone())
        .collect()
}

/// Probes the images behind a container list concurrently.
pub struct BatchChecker {
    prober: Arc<dyn ImageProber>,
    options: CheckOptions,
}

impl BatchChecker {
    pub fn new(prober: Arc<dyn ImageProber>) -> Self {
        Self {
            prober,
            options: CheckOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    /// Check every distinct image used by `containers`.
    ///
    /// Each image is probed exactly once, in its own task. Results are
    /// appended in arrival order and handed to `sink` as they land, one call
    /// at a time. A failed probe still yields a result, and the first failure
    /// to arrive becomes the batch error; which one that is varies between
    /// runs when several probes fail.
    ///
    /// If `cancel` fires, in-flight probes are aborted and the result holds
    /// only what already arrived, with a [`CheckError::Cancelled`] error.
    pub async fn check_images(
        &self,
        containers: Vec<ContainerInfo>,
        sink: Option<&dyn ResultSink>,
        cancel: &CancellationToken,
    ) -> BatchCheckResult {
        let started = Instant::now();

        if containers.is_empty() {
            tracing::warn!("no matching containers found");
            return BatchCheckResult::empty(containers);
        }

        let images = unique_images(&containers);
        tracing::info!(
            containers = containers.len(),
            images = images.len(),
            "checking images for updates"
        );
        tracing::debug!(?images, "unique images");

        let permits = self
            .options
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::with_capacity(images.len());
        for image in &images {
            let handle = tasks.spawn(probe(
                Arc::clone(&self.prober),
                image.clone(),
                self.options.probe_timeout,
                permits.clone(),
            ));
            in_flight.insert(handle.id(), image.clone());
        }

        let mut collected = Collected::new(images.len(), sink);
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                joined = tasks.join_next_with_id() => {
                    let Some(joined) = joined else { break };
                    collected.record(joined, &mut in_flight);
                }
            }
        }

        if cancelled {
            // Probes that finished before the cancel still count.
            while let Some(joined) = tasks.try_join_next_with_id() {
                collected.record(joined, &mut in_flight);
            }
            tasks.abort_all();
        }
        let Collected {
            results: collected,
            first_error,
            ..
        } = collected;

        let summary = Summary::from_results(
            containers.len(),
            images.len(),
            &collected,
            started.elapsed(),
        );

        let error = if cancelled {
            tracing::warn!(
                completed = collected.len(),
                dispatched = images.len(),
                "image check cancelled"
            );
            Some(CheckError::Cancelled {
                completed: collected.len(),
                dispatched: images.len(),
            })
        } else {
            first_error
        };

        tracing::info!(
            updated = summary.updated,
            up_to_date = summary.up_to_date,
            failed = summary.failed,
            duration = ?summary.duration,
            "image check finished"
        );
        if summary.failed > 0 {
            tracing::warn!(failed = summary.failed, "some images could not be checked");
        }

        BatchCheckResult {
            containers,
            images: collected,
            summary,
            error,
        }
    }
}

/// Results gathered by the aggregating loop, the only writer.
struct Collected<'a> {
    results: Vec<ImageCheckResult>,
    first_error: Option<CheckError>,
    sink: Option<&'a dyn ResultSink>,
}

impl<'a> Collected<'a> {
    fn new(capacity: usize, sink: Option<&'a dyn ResultSink>) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
            first_error: None,
            sink,
        }
    }

    fn record(
        &mut self,
        joined: Result<(tokio::task::Id, ImageCheckResult), JoinError>,
        in_flight: &mut HashMap<tokio::task::Id, String>,
    ) {
        let result = match joined {
            Ok((id, result)) => {
                in_flight.remove(&id);
                result
            }
            Err(err) => abnormal_exit(&err, in_flight),
        };

        if self.first_error.is_none()
            && let Some(message) = &result.error
        {
            self.first_error = Some(CheckError::Probe {
                image: result.image.clone(),
                message: message.clone(),
            });
        }

        if let Some(sink) = self.sink {
            sink.on_result(&result);
        }
        self.results.push(result);
    }
}

/// Run one probe and always come back with a result for `image`.
async fn probe(
    prober: Arc<dyn ImageProber>,
    image: String,
    limit: Option<Duration>,
    permits: Option<Arc<Semaphore>>,
) -> ImageCheckResult {
    // The semaphore is never closed, so acquiring only waits.
    let _permit = match permits {
        Some(permits) => permits.acquire_owned().await.ok(),
        None => None,
    };

    tracing::debug!(%image, "probing image");
    let started = Instant::now();

    let outcome = match limit {
        Some(limit) => match tokio::time::timeout(limit, prober.check_update(&image)).await {
            Ok(outcome) => outcome.map_err(|e| e.to_string()),
            Err(_) => Err(format!(
                "probe timed out after {}",
                humantime::format_duration(limit)
            )),
        },
        None => prober.check_update(&image).await.map_err(|e| e.to_string()),
    };

    let mut result = match outcome {
        Ok(result) => result,
        Err(message) => ImageCheckResult::failed(&image, message),
    };
    // Keyed by the reference we dispatched, whatever the prober normalized it to.
    result.image = image;
    result.elapsed = started.elapsed();

    match &result.error {
        Some(error) => tracing::warn!(image = %result.image, %error, "image check failed"),
        None => tracing::debug!(
            image = %result.image,
            update_available = result.update_available,
            "image check complete"
        ),
    }

    result
}

/// Turn a panicked or aborted probe task into a failure record for its image.
fn abnormal_exit(
    err: &JoinError,
    in_flight: &mut HashMap<tokio::task::Id, String>,
) -> ImageCheckResult {
    let image = in_flight.remove(&err.id()).unwrap_or_default();
    let reason = if err.is_panic() {
        "probe task panicked"
    } else {
        "probe task was aborted"
    };
    tracing::error!(%image, reason, "probe task exited abnormally");
    ImageCheckResult::failed(image, reason)
}
