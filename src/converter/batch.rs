//! Sequential batch conversion with per-file progress.
//!
//! Files are converted one at a time, in input order. A failure on one file
//! becomes a [`ConversionOutcome::Failure`] at that index and the batch moves
//! on; [`convert_batch`] itself never fails.

use log::{info, warn};
use serde::Serialize;

use super::client::ConvertApi;
use super::types::{ConversionFailure, ConversionOutcome, ConvertedImage};
use crate::error::Result;
use crate::request::ConvertRequest;

/// Receives batch events. Both methods default to no-ops.
///
/// Calls for index `i` always happen before any call for index `i + 1`.
pub trait BatchObserver: Send + Sync {
    /// Called with `fraction = 0.0` right before file `index` is sent.
    fn on_progress(&self, index: usize, fraction: f32) {
        let _ = (index, fraction);
    }

    /// Called once per file after its conversion has fully resolved,
    /// retries included.
    fn on_file_complete(&self, index: usize, outcome: &ConversionOutcome) {
        let _ = (index, outcome);
    }
}

pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Observer built from two closures.
pub struct FnObserver<P, C> {
    on_progress: P,
    on_file_complete: C,
}

impl<P, C> FnObserver<P, C>
where
    P: Fn(usize, f32) + Send + Sync,
    C: Fn(usize, &ConversionOutcome) + Send + Sync,
{
    pub fn new(on_progress: P, on_file_complete: C) -> Self {
        Self {
            on_progress,
            on_file_complete,
        }
    }
}

impl<P, C> BatchObserver for FnObserver<P, C>
where
    P: Fn(usize, f32) + Send + Sync,
    C: Fn(usize, &ConversionOutcome) + Send + Sync,
{
    fn on_progress(&self, index: usize, fraction: f32) {
        (self.on_progress)(index, fraction)
    }

    fn on_file_complete(&self, index: usize, outcome: &ConversionOutcome) {
        (self.on_file_complete)(index, outcome)
    }
}

/// Outcomes in input order plus counts.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct BatchResult {
    pub outcomes: Vec<ConversionOutcome>,
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchResult {
    fn with_capacity(total: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(total),
            successful: 0,
            failed: 0,
            total,
        }
    }

    fn push(&mut self, outcome: ConversionOutcome) {
        if outcome.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Failures paired with their input index.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &ConversionFailure)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_failure().map(|f| (i, f)))
    }
}

/// Converts `requests` one after another.
///
/// Dropping the returned future abandons the batch after the file currently
/// in flight; no partial result is returned in that case.
pub async fn convert_batch<A, O>(api: &A, requests: &[ConvertRequest], observer: &O) -> BatchResult
where
    A: ConvertApi + ?Sized,
    O: BatchObserver + ?Sized,
{
    run_batch(requests, observer, |request| api.convert_file(request)).await
}

/// Runs `op` over `requests` one after another, with the same ordering,
/// containment and observer guarantees as [`convert_batch`].
///
/// An `Err` from `op` becomes the failure outcome for that index.
#[tracing::instrument(skip_all, fields(total = requests.len()))]
pub async fn run_batch<'a, O, F, Fut>(
    requests: &'a [ConvertRequest],
    observer: &O,
    mut op: F,
) -> BatchResult
where
    O: BatchObserver + ?Sized,
    F: FnMut(&'a ConvertRequest) -> Fut,
    Fut: Future<Output = Result<ConvertedImage>>,
{
    let mut result = BatchResult::with_capacity(requests.len());

    for (index, request) in requests.iter().enumerate() {
        observer.on_progress(index, 0.0);

        let outcome = ConversionOutcome::from(op(request).await);
        if let ConversionOutcome::Failure(failure) = &outcome {
            warn!(
                "[{}/{}] {} failed: {}",
                index + 1,
                requests.len(),
                request.file.name(),
                failure.message
            );
        }

        result.push(outcome);
        if let Some(outcome) = result.outcomes.last() {
            observer.on_file_complete(index, outcome);
        }
    }

    info!(
        "Batch finished: {} succeeded, {} failed, {} total",
        result.successful, result.failed, result.total
    );
    result
}
