// ABOUTME: Concurrent batch image-update checker.
// ABOUTME: Dedupes images across containers, probes them in parallel, and summarizes.

mod batch;
mod error;
mod result;
mod selection;
mod sink;
mod summary;

pub use batch::{BatchChecker, CheckOptions, unique_images};
pub use error::{CheckError, CheckErrorKind};
pub use result::{BatchCheckResult, ImageCheckResult};
pub use selection::{Checker, DEFAULT_LABEL_KEY, DEFAULT_LABEL_VALUE, Selection};
pub use sink::{CollectingSink, ResultSink};
pub use summary::Summary;
