//! Progress reporting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Receives `(done, total, label)` as extraction advances.
///
/// Every planned request contributes three steps: before the request, after
/// its response is parsed, and after it is merged.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, done: usize, total: usize, label: Option<&str>);
}

impl<F> ProgressReporter for F
where
    F: Fn(usize, usize, Option<&str>) + Send + Sync,
{
    fn report(&self, done: usize, total: usize, label: Option<&str>) {
        self(done, total, label)
    }
}

pub(crate) const STEPS_PER_BATCH: usize = 3;

/// Shared step counter for one run.
pub(crate) struct ProgressTracker {
    reporter: Option<Arc<dyn ProgressReporter>>,
    done: AtomicUsize,
    total: usize,
}

impl ProgressTracker {
    pub(crate) fn new(reporter: Option<Arc<dyn ProgressReporter>>, batches: usize) -> Self {
        Self {
            reporter,
            done: AtomicUsize::new(0),
            total: (batches * STEPS_PER_BATCH).max(1),
        }
    }

    pub(crate) fn step(&self, label: Option<&str>) {
        let done = (self.done.fetch_add(1, Ordering::SeqCst) + 1).min(self.total);
        if let Some(reporter) = &self.reporter {
            reporter.report(done, self.total, label);
        }
    }

    /// Report completion if the steps did not already get there.
    pub(crate) fn finish(&self) {
        let done = self.done.swap(self.total, Ordering::SeqCst);
        if done < self.total {
            if let Some(reporter) = &self.reporter {
                reporter.report(self.total, self.total, None);
            }
        }
    }
}
