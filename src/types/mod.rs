// ABOUTME: Type-safe identifiers and parsed image references.
// ABOUTME: Keeps container and image IDs from being mixed up at compile time.

mod id;
mod image_ref;

pub use id::{ContainerId, ImageId};
pub use image_ref::{ImageRef, ParseImageRefError};
