//! Pipeline module.
//!
//! This module provides the loader, the preprocessor it runs, and progress
//! reporting.

mod loader;
mod preprocessor;
pub mod progress;

pub use loader::{LoadOutcome, Loader, LoaderBuilder};
pub use preprocessor::{ORIGINAL_SUFFIX, Preprocessor, original_column_name};
pub use progress::{ClosureProgressReporter, LoadStage, ProgressReporter, ProgressUpdate};
