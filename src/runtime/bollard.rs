// ABOUTME: Bollard-based container runtime implementation.
// ABOUTME: Lists containers, compares local and registry digests, and recreates containers.

use crate::checker::ImageCheckResult;
use crate::runtime::error::ConnectionError;
use crate::runtime::traits::{
    ContainerDirectory, ContainerInfo, ContainerUpdater, DirectoryError, ImageProber, ProbeError,
    UpdateError,
};
use crate::runtime::types::{RuntimeInfo, RuntimeType};
use crate::types::{ContainerId, ImageRef};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerCreateBody, EndpointSettings, NetworkingConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RenameContainerOptions, StartContainerOptions, StopContainerOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

/// Seconds bollard waits on a single API request.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Suffix given to a container while its replacement is being created.
const RETIRED_SUFFIX: &str = "tidewatch-old";

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_directory_error(e: bollard::errors::Error) -> DirectoryError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 401 || *status_code == 403 => {
            DirectoryError::PermissionDenied(message.clone())
        }
        bollard::errors::Error::IOError { .. }
        | bollard::errors::Error::HyperResponseError { .. }
        | bollard::errors::Error::RequestTimeoutError => {
            DirectoryError::ConnectionFailed(e.to_string())
        }
        _ => DirectoryError::Runtime(e.to_string()),
    }
}

fn map_local_image_error(e: bollard::errors::Error, image: &str) -> ProbeError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ProbeError::NotLocal(image.to_string())
        }
        _ => ProbeError::Runtime(format!("failed to inspect {image}: {e}")),
    }
}

fn map_recreate_error(e: bollard::errors::Error, container: &str) -> UpdateError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            UpdateError::NotFound(container.to_string())
        }
        _ => UpdateError::RecreateFailed {
            container: container.to_string(),
            reason: e.to_string(),
        },
    }
}

/// The error to report once the old container has been put back, or failed to be.
fn restore_outcome(
    container: &str,
    failure: UpdateError,
    restore: Result<(), bollard::errors::Error>,
) -> UpdateError {
    match restore {
        Ok(()) => failure,
        Err(restore) => UpdateError::RestoreFailed {
            container: container.to_string(),
            reason: match failure {
                UpdateError::RecreateFailed { reason, .. } => reason,
                other => other.to_string(),
            },
            restore: restore.to_string(),
        },
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container runtime implementation using bollard.
///
/// Supports both Docker and Podman via the Docker-compatible API. The client
/// is owned here and shared with the checker by `Arc`.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl BollardRuntime {
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Connect to the runtime socket and verify it answers.
    pub async fn connect(info: &RuntimeInfo) -> Result<Self, ConnectionError> {
        let client = Docker::connect_with_unix(
            &info.socket_path,
            REQUEST_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| ConnectionError::Connect {
            socket: info.socket_path.clone(),
            reason: e.to_string(),
        })?;

        client
            .ping()
            .await
            .map_err(|e| ConnectionError::Ping(e.to_string()))?;

        tracing::debug!(runtime = %info.runtime_type, socket = %info.socket_path, "connected to runtime");
        Ok(Self::new(client, info.runtime_type))
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    /// List running containers matching the given filters.
    async fn list_running(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerInfo>, DirectoryError> {
        let opts = ListContainersOptions {
            all: false,
            filters: Some(filters),
            ..Default::default()
        };

        // Podman reports "stopping" as a container state during shutdown, but bollard
        // doesn't recognize it and fails deserialization. Retry after a short delay
        // since "stopping" is a transient state.
        let mut last_error = None;
        for attempt in 0..3 {
            match self.client.list_containers(Some(opts.clone())).await {
                Ok(containers) => {
                    return Ok(containers
                        .into_iter()
                        .map(|c| ContainerInfo {
                            id: ContainerId::new(c.id.unwrap_or_default()),
                            name: c
                                .names
                                .unwrap_or_default()
                                .first()
                                .map(|n| n.trim_start_matches('/').to_string())
                                .unwrap_or_default(),
                            image: c.image.unwrap_or_default(),
                            labels: c.labels.unwrap_or_default(),
                        })
                        .collect());
                }
                Err(e) => {
                    let err_str = e.to_string();
                    if (err_str.contains("unknown variant `stopping`")
                        || err_str.contains("unknown variant `stopped`"))
                        && attempt < 2
                    {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        last_error = Some(err_str);
                        continue;
                    }
                    return Err(map_directory_error(e));
                }
            }
        }

        Err(DirectoryError::Runtime(
            last_error.unwrap_or_else(|| "list_containers failed".to_string()),
        ))
    }

    /// Repo digests of the local image that belong to `reference`'s repository.
    async fn local_digests(
        &self,
        image: &str,
        reference: &ImageRef,
    ) -> Result<Vec<String>, ProbeError> {
        let inspect = self
            .client
            .inspect_image(image)
            .await
            .map_err(|e| map_local_image_error(e, image))?;

        Ok(inspect
            .repo_digests
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| ImageRef::parse(entry).ok())
            .filter(|entry| entry.same_repository(reference))
            .filter_map(|entry| entry.digest().map(str::to_string))
            .collect())
    }

    async fn remote_digest(&self, image: &str) -> Result<String, ProbeError> {
        let registry_error = |reason: String| ProbeError::Registry {
            image: image.to_string(),
            reason,
        };

        let inspect = self
            .client
            .inspect_registry_image(image, None)
            .await
            .map_err(|e| registry_error(e.to_string()))?;

        inspect
            .descriptor
            .digest
            .ok_or_else(|| registry_error("registry returned no digest".to_string()))
    }

    /// Put a retired container back under its original name and start it.
    async fn restore(&self, old_id: &str, name: &str) -> Result<(), bollard::errors::Error> {
        self.client
            .rename_container(
                old_id,
                RenameContainerOptions {
                    name: name.to_string(),
                },
            )
            .await?;
        self.client
            .start_container(old_id, None::<StartContainerOptions>)
            .await
    }

    /// Create and start the replacement container.
    async fn create_replacement(
        &self,
        name: &str,
        body: ContainerCreateBody,
    ) -> Result<String, (Option<String>, bollard::errors::Error)> {
        let opts = CreateContainerOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let created = self
            .client
            .create_container(Some(opts), body)
            .await
            .map_err(|e| (None, e))?;

        self.client
            .start_container(&created.id, None::<StartContainerOptions>)
            .await
            .map_err(|e| (Some(created.id.clone()), e))?;

        Ok(created.id)
    }
}

#[async_trait]
impl ContainerDirectory for BollardRuntime {
    async fn by_name(&self, names: &[String]) -> Result<Vec<ContainerInfo>, DirectoryError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        // The runtime's name filter matches substrings; keep exact matches only.
        let filters = HashMap::from([("name".to_string(), names.to_vec())]);
        let mut containers = self.list_running(filters).await?;
        containers.retain(|c| names.contains(&c.name));

        for name in names {
            if !containers.iter().any(|c| &c.name == name) {
                tracing::warn!(container = %name, "no running container with this name");
            }
        }
        Ok(containers)
    }

    async fn by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<ContainerInfo>, DirectoryError> {
        let filters = HashMap::from([("label".to_string(), vec![format!("{key}={value}")])]);
        self.list_running(filters).await
    }

    async fn all(&self) -> Result<Vec<ContainerInfo>, DirectoryError> {
        self.list_running(HashMap::new()).await
    }
}

#[async_trait]
impl ImageProber for BollardRuntime {
    async fn check_update(&self, image: &str) -> Result<ImageCheckResult, ProbeError> {
        let reference = ImageRef::parse(image)?;
        if let Some(digest) = reference.digest() {
            return Ok(ImageCheckResult::up_to_date(image, Some(digest.to_string())));
        }

        let local = self.local_digests(image, &reference).await?;
        if local.is_empty() {
            return Err(ProbeError::NoRepoDigest(image.to_string()));
        }

        let remote = self.remote_digest(image).await?;
        if local.contains(&remote) {
            Ok(ImageCheckResult::up_to_date(image, Some(remote)))
        } else {
            Ok(ImageCheckResult::updated(image, local[0].clone(), remote))
        }
    }
}

#[async_trait]
impl ContainerUpdater for BollardRuntime {
    async fn pull(&self, image: &str) -> Result<(), UpdateError> {
        let pull_failed = |reason: String| UpdateError::PullFailed {
            image: image.to_string(),
            reason,
        };
        let reference = ImageRef::parse(image).map_err(|e| pull_failed(e.to_string()))?;
        if reference.is_pinned() {
            return Ok(());
        }

        let opts = CreateImageOptions {
            from_image: Some(reference.pull_name()),
            tag: reference.effective_tag().map(str::to_string),
            ..Default::default()
        };

        // Pull returns a stream of progress updates - consume it
        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| pull_failed(e.to_string()))?;
        }

        tracing::info!(%image, "pulled image");
        Ok(())
    }

    async fn recreate(
        &self,
        container: &ContainerInfo,
        stop_timeout: Duration,
    ) -> Result<ContainerId, UpdateError> {
        let old_id = container.id.as_str();
        let name = container.name.as_str();

        let details = self
            .client
            .inspect_container(old_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_recreate_error(e, name))?;

        let config = details.config.unwrap_or_default();
        let networking_config = details
            .network_settings
            .and_then(|settings| settings.networks)
            .map(|networks| NetworkingConfig {
                endpoints_config: Some(
                    networks
                        .into_iter()
                        .map(|(network, endpoint)| {
                            let endpoint = EndpointSettings {
                                aliases: endpoint.aliases,
                                ..Default::default()
                            };
                            (network, endpoint)
                        })
                        .collect(),
                ),
            });

        let body = ContainerCreateBody {
            image: Some(container.image.clone()),
            env: config.env,
            cmd: config.cmd,
            entrypoint: config.entrypoint,
            labels: config.labels,
            working_dir: config.working_dir,
            user: config.user,
            tty: config.tty,
            open_stdin: config.open_stdin,
            healthcheck: config.healthcheck,
            stop_signal: config.stop_signal,
            host_config: details.host_config,
            networking_config,
            ..Default::default()
        };

        tracing::info!(container = %name, image = %container.image, "recreating container");

        let opts = StopContainerOptions {
            t: Some(stop_timeout.as_secs() as i32),
            signal: None,
        };
        self.client
            .stop_container(old_id, Some(opts))
            .await
            .map_err(|e| map_recreate_error(e, name))?;

        let retired = format!("{name}-{RETIRED_SUFFIX}");
        if let Err(e) = self
            .client
            .rename_container(
                old_id,
                RenameContainerOptions {
                    name: retired.clone(),
                },
            )
            .await
        {
            tracing::warn!(container = %name, error = %e, "rename failed, restarting old container");
            let restart = self
                .client
                .start_container(old_id, None::<StartContainerOptions>)
                .await;
            return Err(restore_outcome(name, map_recreate_error(e, name), restart));
        }

        let new_id = match self.create_replacement(name, body).await {
            Ok(id) => id,
            Err((created, e)) => {
                tracing::warn!(container = %name, error = %e, "replacement failed, restoring old container");
                if let Some(created) = created {
                    let opts = RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    };
                    if let Err(remove) = self.client.remove_container(&created, Some(opts)).await {
                        tracing::warn!(container = %created, error = %remove, "failed to remove broken replacement");
                    }
                }
                let failure = UpdateError::RecreateFailed {
                    container: name.to_string(),
                    reason: e.to_string(),
                };
                return Err(restore_outcome(name, failure, self.restore(old_id, name).await));
            }
        };

        let opts = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.client.remove_container(old_id, Some(opts)).await {
            tracing::warn!(container = %retired, error = %e, "failed to remove retired container");
        }

        tracing::info!(container = %name, id = %new_id, "container recreated");
        Ok(ContainerId::new(new_id))
    }
}
