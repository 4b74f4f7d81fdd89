// ABOUTME: Test support utilities.
// ABOUTME: Scripted fakes for the container directory, image prober, and updater.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tidewatch::checker::ImageCheckResult;
use tidewatch::runtime::{
    ContainerDirectory, ContainerInfo, ContainerUpdater, DirectoryError, ImageProber, ProbeError,
    UpdateError,
};
use tidewatch::types::ContainerId;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::from_default_env().add_directive("tidewatch=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// What the fake prober does for one image.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Script {
    Updated,
    UpToDate,
    /// Return `Err`.
    Fail(String),
    /// Return `Ok` with the error field set.
    Report(String),
    Panic,
    /// Never finish.
    Hang,
}

/// Prober that follows a per-image script. Unscripted images are up to date.
#[derive(Default)]
pub struct FakeProber {
    scripts: HashMap<String, Script>,
    latency: HashMap<String, Duration>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[allow(dead_code)]
impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, image: &str, script: Script) -> Self {
        self.scripts.insert(image.to_string(), script);
        self
    }

    pub fn delay(mut self, image: &str, latency: Duration) -> Self {
        self.latency.insert(image.to_string(), latency);
        self
    }

    /// Total probe calls across all images.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn calls_for(&self, image: &str) -> usize {
        self.calls.lock().get(image).copied().unwrap_or(0)
    }

    pub fn probed(&self) -> HashSet<String> {
        self.calls.lock().keys().cloned().collect()
    }

    /// Most probes observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageProber for FakeProber {
    async fn check_update(&self, image: &str) -> Result<ImageCheckResult, ProbeError> {
        *self.calls.lock().entry(image.to_string()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(latency) = self.latency.get(image) {
            tokio::time::sleep(*latency).await;
        }

        match self.scripts.get(image).cloned().unwrap_or(Script::UpToDate) {
            Script::Updated => Ok(ImageCheckResult::updated(
                image,
                "sha256:local",
                "sha256:remote",
            )),
            Script::UpToDate => Ok(ImageCheckResult::up_to_date(
                image,
                Some("sha256:same".to_string()),
            )),
            Script::Fail(reason) => Err(ProbeError::Registry {
                image: image.to_string(),
                reason,
            }),
            Script::Report(reason) => Ok(ImageCheckResult::failed(image, reason)),
            Script::Panic => panic!("prober blew up on {image}"),
            Script::Hang => std::future::pending().await,
        }
    }
}

/// Directory over a fixed list of running containers.
#[derive(Default)]
pub struct FakeDirectory {
    containers: Vec<ContainerInfo>,
    unreachable: bool,
}

#[allow(dead_code)]
impl FakeDirectory {
    pub fn new(containers: Vec<ContainerInfo>) -> Self {
        Self {
            containers,
            unreachable: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            containers: Vec::new(),
            unreachable: true,
        }
    }

    fn guard(&self) -> Result<(), DirectoryError> {
        if self.unreachable {
            return Err(DirectoryError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerDirectory for FakeDirectory {
    async fn by_name(&self, names: &[String]) -> Result<Vec<ContainerInfo>, DirectoryError> {
        self.guard()?;
        Ok(self
            .containers
            .iter()
            .filter(|c| names.contains(&c.name))
            .cloned()
            .collect())
    }

    async fn by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<ContainerInfo>, DirectoryError> {
        self.guard()?;
        Ok(self
            .containers
            .iter()
            .filter(|c| c.labels.get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<ContainerInfo>, DirectoryError> {
        self.guard()?;
        Ok(self.containers.clone())
    }
}

/// Updater that records what it was asked to do.
#[derive(Default)]
pub struct RecordingUpdater {
    pub pulled: Mutex<Vec<String>>,
    pub recreated: Mutex<Vec<String>>,
    failing_pulls: HashSet<String>,
    failing_recreates: HashSet<String>,
}

#[allow(dead_code)]
impl RecordingUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_pull(mut self, image: &str) -> Self {
        self.failing_pulls.insert(image.to_string());
        self
    }

    pub fn fail_recreate(mut self, container: &str) -> Self {
        self.failing_recreates.insert(container.to_string());
        self
    }

    pub fn pulled(&self) -> Vec<String> {
        self.pulled.lock().clone()
    }

    pub fn recreated(&self) -> Vec<String> {
        self.recreated.lock().clone()
    }
}

#[async_trait]
impl ContainerUpdater for RecordingUpdater {
    async fn pull(&self, image: &str) -> Result<(), UpdateError> {
        if self.failing_pulls.contains(image) {
            return Err(UpdateError::PullFailed {
                image: image.to_string(),
                reason: "manifest unknown".to_string(),
            });
        }
        self.pulled.lock().push(image.to_string());
        Ok(())
    }

    async fn recreate(
        &self,
        container: &ContainerInfo,
        _stop_timeout: Duration,
    ) -> Result<ContainerId, UpdateError> {
        if self.failing_recreates.contains(&container.name) {
            return Err(UpdateError::RecreateFailed {
                container: container.name.clone(),
                reason: "port is already allocated".to_string(),
            });
        }
        self.recreated.lock().push(container.name.clone());
        Ok(ContainerId::new(format!("{}-new", container.id)))
    }
}

/// Containers named `c0..cN`, one per image in `images`.
#[allow(dead_code)]
pub fn containers_for(images: &[&str]) -> Vec<ContainerInfo> {
    images
        .iter()
        .enumerate()
        .map(|(i, image)| ContainerInfo::new(format!("id{i}"), format!("c{i}"), *image))
        .collect()
}
