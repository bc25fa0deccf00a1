//! Progress reporting for case loading.
//!
//! A load is short and synchronous, so there is no cancellation: reporters
//! only observe. Updates carry the stage, an overall progress estimate and,
//! for per-variable work, the variable being processed.
//!
//! # Example
//!
//! ```rust,ignore
//! use case_prep::Loader;
//!
//! let loader = Loader::builder()
//!     .registry(registry)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    /// Reading the declared raw columns from the file
    Reading,
    /// Computing derived variables on raw values
    DerivingPre,
    /// Coercing variables and enforcing mandatory ones
    Coercing,
    /// Computing derived variables on cleaned values
    DerivingPost,
    /// Handing the warnings table to the report sink
    PublishingWarnings,
    /// Load completed successfully
    Complete,
    /// Load failed with an error
    Failed,
}

impl LoadStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Reading => "Reading File",
            Self::DerivingPre => "Deriving Variables (pre)",
            Self::Coercing => "Coercing Variables",
            Self::DerivingPost => "Deriving Variables (post)",
            Self::PublishingWarnings => "Publishing Warnings",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Share of the whole load taken by this stage (0.0 - 1.0).
    pub fn weight(&self) -> f32 {
        match self {
            Self::Reading => 0.30,
            Self::DerivingPre => 0.15,
            Self::Coercing => 0.35,
            Self::DerivingPost => 0.15,
            Self::PublishingWarnings => 0.05,
            Self::Complete | Self::Failed => 0.0,
        }
    }

    /// Cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Reading => 0.0,
            Self::DerivingPre => 0.30,
            Self::Coercing => 0.45,
            Self::DerivingPost => 0.80,
            Self::PublishingWarnings => 0.95,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// A progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: LoadStage,

    /// Variable being processed, when the stage works per variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(stage: LoadStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            variable: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Update for the `current`-th of `total` variables of a stage.
    pub fn for_variable(
        stage: LoadStage,
        variable: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            variable: Some(variable.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            progress: 1.0,
            stage_progress: 1.0,
            ..Self::new(LoadStage::Complete, 1.0, message)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            progress: 0.0,
            stage_progress: 0.0,
            ..Self::new(LoadStage::Failed, 0.0, message)
        }
    }
}

/// Receives progress updates during a load.
///
/// Implementations must be `Send + Sync` so a [`Loader`](crate::Loader) can
/// be moved to a worker thread together with its reporter.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_progress_update_new() {
        let update = ProgressUpdate::new(LoadStage::Coercing, 0.5, "Coercing...");
        assert_eq!(update.stage, LoadStage::Coercing);
        assert!(update.variable.is_none());
        assert_eq!(update.stage_progress, 0.5);
        assert!((update.progress - 0.625).abs() < 0.001);
    }

    #[test]
    fn test_progress_update_for_variable() {
        let update = ProgressUpdate::for_variable(LoadStage::Coercing, "EDAD", 2, 4, "Coercing EDAD");
        assert_eq!(update.variable, Some("EDAD".to_string()));
        assert_eq!(update.stage_progress, 0.5);
        assert_eq!(update.items_processed, Some(2));
        assert_eq!(update.items_total, Some(4));
    }

    #[test]
    fn test_terminal_updates() {
        let done = ProgressUpdate::complete("Done");
        assert_eq!(done.stage, LoadStage::Complete);
        assert_eq!(done.progress, 1.0);

        let failed = ProgressUpdate::failed("boom");
        assert_eq!(failed.stage, LoadStage::Failed);
        assert_eq!(failed.progress, 0.0);
    }

    #[test]
    fn test_stage_weights_sum() {
        let stages = [
            LoadStage::Reading,
            LoadStage::DerivingPre,
            LoadStage::Coercing,
            LoadStage::DerivingPost,
            LoadStage::PublishingWarnings,
        ];
        let total: f32 = stages.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 0.01, "Weights should sum to ~1.0");

        for pair in stages.windows(2) {
            let end = pair[0].base_progress() + pair[0].weight();
            assert!((end - pair[1].base_progress()).abs() < 0.001);
        }
    }

    #[test]
    fn test_stage_json_values() {
        let json = serde_json::to_string(&LoadStage::DerivingPre).expect("Should serialize");
        assert_eq!(json, "\"deriving_pre\"");

        let update = ProgressUpdate::for_variable(LoadStage::DerivingPost, "RIESGO", 1, 1, "x");
        let json = serde_json::to_string(&update).expect("Should serialize");
        assert!(json.contains("\"variable\":\"RIESGO\""));
    }

    #[test]
    fn test_closure_progress_reporter_across_threads() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let reporter = Arc::new(ClosureProgressReporter::new(move |_update| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let reporter_clone = reporter.clone();
        std::thread::spawn(move || {
            reporter_clone.report(ProgressUpdate::new(LoadStage::Reading, 0.5, "bg"));
        })
        .join()
        .expect("Thread should not panic");
        reporter.report(ProgressUpdate::complete("Done"));

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }
}
