// ABOUTME: Capability traits the checker and runner depend on.
// ABOUTME: Defines ContainerDirectory, ImageProber, and ContainerUpdater.

mod directory;
mod prober;
mod updater;

pub use directory::{ContainerDirectory, ContainerInfo, DirectoryError};
pub use prober::{ImageProber, ProbeError};
pub use updater::{ContainerUpdater, UpdateError};
