// ABOUTME: Container directory trait for resolving which containers to check.
// ABOUTME: Selects running containers by name, by label, or all of them.

use crate::types::ContainerId;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// Resolves a selection into running containers.
///
/// Zero matches is an empty list, not an error. Errors are reserved for
/// failures talking to the runtime itself.
#[async_trait]
pub trait ContainerDirectory: Send + Sync {
    /// Running containers whose name is one of `names`.
    async fn by_name(&self, names: &[String]) -> Result<Vec<ContainerInfo>, DirectoryError>;

    /// Running containers carrying the label `key=value`.
    async fn by_label(&self, key: &str, value: &str)
    -> Result<Vec<ContainerInfo>, DirectoryError>;

    /// Every running container.
    async fn all(&self) -> Result<Vec<ContainerInfo>, DirectoryError>;
}

/// Snapshot of a running container and the image reference it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    /// Image reference as reported by the runtime (e.g. `nginx:latest`).
    pub image: String,
    pub labels: HashMap<String, String>,
}

impl ContainerInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: ContainerId::new(id),
            name: name.into(),
            image: image.into(),
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Errors from container directory lookups.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("cannot reach container runtime: {0}")]
    ConnectionFailed(String),

    #[error("permission denied by container runtime: {0}")]
    PermissionDenied(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
