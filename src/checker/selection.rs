// ABOUTME: Selection strategies: by name, by label, or all running containers.
// ABOUTME: Each resolves containers through the directory, then runs one batch.

use super::batch::{BatchChecker, CheckOptions};
use super::error::CheckError;
use super::result::BatchCheckResult;
use super::sink::ResultSink;
use crate::runtime::{ContainerDirectory, ContainerInfo, DirectoryError, ImageProber};
use nonempty::NonEmpty;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_LABEL_KEY: &str = "tidewatch.update";
pub const DEFAULT_LABEL_VALUE: &str = "true";

/// Which running containers a check covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Names(NonEmpty<String>),
    Label { key: String, value: String },
    All,
}

impl Selection {
    /// Containers labelled `tidewatch.update=true`.
    pub fn default_label() -> Self {
        Selection::Label {
            key: DEFAULT_LABEL_KEY.to_string(),
            value: DEFAULT_LABEL_VALUE.to_string(),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Names(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "containers {}", names.join(", "))
            }
            Selection::Label { key, value } => write!(f, "containers labelled {key}={value}"),
            Selection::All => f.write_str("all running containers"),
        }
    }
}

/// Resolves containers and checks their images.
pub struct Checker {
    directory: Arc<dyn ContainerDirectory>,
    batch: BatchChecker,
}

impl Checker {
    pub fn new(directory: Arc<dyn ContainerDirectory>, prober: Arc<dyn ImageProber>) -> Self {
        Self {
            directory,
            batch: BatchChecker::new(prober),
        }
    }

    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.batch = self.batch.with_options(options);
        self
    }

    pub fn batch(&self) -> &BatchChecker {
        &self.batch
    }

    /// Check the containers named by `selection`.
    pub async fn check(
        &self,
        selection: &Selection,
        sink: Option<&dyn ResultSink>,
        cancel: &CancellationToken,
    ) -> Result<BatchCheckResult, CheckError> {
        match selection {
            Selection::Names(names) => {
                let names: Vec<String> = names.iter().cloned().collect();
                self.check_by_name(&names, sink, cancel).await
            }
            Selection::Label { key, value } => {
                self.check_by_label(key, value, sink, cancel).await
            }
            Selection::All => self.check_all(sink, cancel).await,
        }
    }

    pub async fn check_by_name(
        &self,
        names: &[String],
        sink: Option<&dyn ResultSink>,
        cancel: &CancellationToken,
    ) -> Result<BatchCheckResult, CheckError> {
        tracing::info!(?names, "checking images by container name");
        let containers = resolve(self.directory.by_name(names), cancel).await?;
        Ok(self.batch.check_images(containers, sink, cancel).await)
    }

    pub async fn check_by_label(
        &self,
        key: &str,
        value: &str,
        sink: Option<&dyn ResultSink>,
        cancel: &CancellationToken,
    ) -> Result<BatchCheckResult, CheckError> {
        tracing::info!(label = %format!("{key}={value}"), "checking images by label");
        let containers = resolve(self.directory.by_label(key, value), cancel).await?;
        Ok(self.batch.check_images(containers, sink, cancel).await)
    }

    pub async fn check_all(
        &self,
        sink: Option<&dyn ResultSink>,
        cancel: &CancellationToken,
    ) -> Result<BatchCheckResult, CheckError> {
        tracing::info!("checking images of all running containers");
        let containers = resolve(self.directory.all(), cancel).await?;
        Ok(self.batch.check_images(containers, sink, cancel).await)
    }
}

async fn resolve(
    lookup: impl Future<Output = Result<Vec<ContainerInfo>, DirectoryError>>,
    cancel: &CancellationToken,
) -> Result<Vec<ContainerInfo>, CheckError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CheckError::Cancelled { completed: 0, dispatched: 0 }),
        containers = lookup => Ok(containers?),
    }
}
