//! Progress reporting for pipeline runs.
//!
//! The pipeline reports one step per [`Stage`] through a
//! [`ProgressCallback`]. How progress is shown is up to the caller.

use std::sync::Arc;

/// Receives progress from a pipeline run or an input reader.
///
/// Called from the blocking worker that executes the run, so
/// implementations must be thread-safe.
pub trait ProgressCallback: Send + Sync {
    /// Work of `total` steps is starting. `None` if the number of steps is
    /// only known once the work is done, e.g. rows of a streamed file.
    fn begin(&self, total: Option<u64>);

    /// Names the step now running.
    fn step(&self, label: &str);

    /// `count` more steps are complete.
    fn advance(&self, count: u64);

    /// All steps are complete.
    fn done(&self, summary: &str);

    /// Names `stage` as the step now running.
    fn stage(&self, stage: Stage) {
        self.step(stage.label());
    }
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl NullProgress {
    /// A shareable handle, for holders of `Arc<dyn ProgressCallback>`.
    #[must_use]
    pub fn shared() -> Arc<dyn ProgressCallback> {
        Arc::new(Self)
    }
}

impl ProgressCallback for NullProgress {
    fn begin(&self, _total: Option<u64>) {}
    fn step(&self, _label: &str) {}
    fn advance(&self, _count: u64) {}
    fn done(&self, _summary: &str) {}
}

/// The ordered stages of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Filter,
    Index,
    Classify,
    Histogram,
    Palette,
    Assemble,
    Estimate,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: &[Self] = &[
        Self::Filter,
        Self::Index,
        Self::Classify,
        Self::Histogram,
        Self::Palette,
        Self::Assemble,
        Self::Estimate,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Filter => "filtering points to region",
            Self::Index => "indexing hexagons",
            Self::Classify => "classifying cell counts",
            Self::Histogram => "building histograms",
            Self::Palette => "assigning palette",
            Self::Assemble => "assembling features",
            Self::Estimate => "estimating export sizes",
        }
    }

    /// Total number of stages, for [`ProgressCallback::begin`].
    #[must_use]
    pub const fn count() -> u64 {
        Self::ALL.len() as u64
    }
}
