// ABOUTME: Container runtime collaborators: listing containers, probing images, recreating.
// ABOUTME: Detects Docker or Podman locally and talks to it through bollard.

mod bollard;
mod detection;
mod error;
pub mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local, resolve_runtime};
pub use error::{ConnectionError, RuntimeError, RuntimeErrorKind};
pub use traits::*;
pub use types::{RuntimeConfig, RuntimeInfo, RuntimeType};
