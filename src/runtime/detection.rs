// ABOUTME: Local container runtime detection.
// ABOUTME: Honors explicit config, otherwise checks Podman sockets first, then Docker.

use super::types::{RuntimeConfig, RuntimeInfo, RuntimeType};
use std::path::Path;

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Error during runtime detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("configured socket does not exist: {0}")]
    SocketMissing(String),
}

/// Resolve the runtime to use, preferring explicit configuration.
///
/// A configured socket without a runtime type is assumed to speak the
/// Docker API, which Podman also serves.
pub fn resolve_runtime(config: &RuntimeConfig) -> Result<RuntimeInfo, DetectionError> {
    let info = match (config.runtime, config.socket.as_ref()) {
        (Some(runtime_type), socket) => RuntimeInfo {
            runtime_type,
            socket_path: socket
                .cloned()
                .unwrap_or_else(|| default_socket_path(runtime_type)),
        },
        (None, Some(socket)) => RuntimeInfo {
            runtime_type: RuntimeType::Docker,
            socket_path: socket.clone(),
        },
        (None, None) => return detect_local(),
    };

    if !Path::new(&info.socket_path).exists() {
        return Err(DetectionError::SocketMissing(info.socket_path));
    }
    tracing::debug!(runtime = %info.runtime_type, socket = %info.socket_path, "using configured runtime");
    Ok(info)
}

/// Detect container runtime on the local system.
///
/// Detection order:
/// 1. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 2. Rootful Podman socket (`/run/podman/podman.sock`)
/// 3. Docker socket (`/var/run/docker.sock`)
pub fn detect_local() -> Result<RuntimeInfo, DetectionError> {
    let rootless = get_uid().map(|uid| format!("/run/user/{uid}/podman/podman.sock"));

    let candidates = rootless
        .into_iter()
        .map(|socket| (RuntimeType::Podman, socket))
        .chain([
            (RuntimeType::Podman, ROOTFUL_PODMAN.to_string()),
            (RuntimeType::Docker, DOCKER_SOCKET.to_string()),
        ]);

    for (runtime_type, socket_path) in candidates {
        if Path::new(&socket_path).exists() {
            tracing::debug!(runtime = %runtime_type, socket = %socket_path, "detected runtime");
            return Ok(RuntimeInfo {
                runtime_type,
                socket_path,
            });
        }
    }

    Err(DetectionError::NoRuntimeFound)
}

fn get_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(str::to_string)
            })
    })
}

fn default_socket_path(runtime: RuntimeType) -> String {
    match runtime {
        RuntimeType::Docker => DOCKER_SOCKET.to_string(),
        RuntimeType::Podman => ROOTFUL_PODMAN.to_string(),
    }
}
