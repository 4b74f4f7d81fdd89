// ABOUTME: Result sink capability invoked once per image result as it arrives.
// ABOUTME: Calls are serialized by the batch aggregator, never made concurrently.

use super::result::ImageCheckResult;
use parking_lot::Mutex;

/// Receives each image result as soon as its probe finishes.
///
/// The batch checker invokes the sink from its single aggregating loop, so
/// implementations never see concurrent calls from one batch.
pub trait ResultSink: Send + Sync {
    fn on_result(&self, result: &ImageCheckResult);
}

impl<F> ResultSink for F
where
    F: Fn(&ImageCheckResult) + Send + Sync,
{
    fn on_result(&self, result: &ImageCheckResult) {
        self(result)
    }
}

/// Sink that keeps every delivered result, in delivery order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Mutex<Vec<ImageCheckResult>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ImageCheckResult> {
        self.results.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }
}

impl ResultSink for CollectingSink {
    fn on_result(&self, result: &ImageCheckResult) {
        self.results.lock().push(result.clone());
    }
}
