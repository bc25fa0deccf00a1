//! Case-Table Loading and Preprocessing Library
//!
//! Loads tabular case data (one row per case, one column per variable) from
//! delimited files and brings it into a typed, validated form, built with
//! Rust and Polars.
//!
//! # Overview
//!
//! - **Variable registry**: every variable is declared with a type
//!   (int, float, bool, category, text), an optional mandatory flag and an
//!   optional derivation hook
//! - **Derived variables**: hooks run before coercion (on raw values) or
//!   after it (on typed values)
//! - **Coercion**: each column is snapshot as `<NAME>_ORIGINAL` and coerced
//!   to its declared type; unmatched values become missing
//! - **Mandatory variables**: cases missing one are warned about and dropped
//! - **Warnings**: per-case data-quality warnings are published as a table
//!   to a [`reporting::ReportSink`]
//! - **Combinators**: reusable hooks to merge redundant encodings of the
//!   same variable
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use case_prep::{CategoryLabels, Loader, VariableRegistry, VariableSpec};
//! use case_prep::reporting::ResultTree;
//!
//! let registry = VariableRegistry::new([
//!     VariableSpec::int("ID").mandatory(),
//!     VariableSpec::category("SEXO", CategoryLabels::nominal([(1.0, "Hombre"), (2.0, "Mujer")])),
//!     VariableSpec::float("EDAD"),
//! ])?;
//!
//! let mut loader = Loader::builder()
//!     .registry(registry)
//!     .case_id_columns(["ID"])
//!     .build()?;
//!
//! let mut results = ResultTree::new();
//! let df = loader.load("cases.csv", &mut results)?;
//!
//! println!("{} cases, {} warnings", df.height(), loader.warnings().len());
//! ```
//!
//! # Derived Variables
//!
//! The [`combinators`] module builds hooks for the common case of a
//! variable recorded twice:
//!
//! ```rust,ignore
//! use case_prep::combinators::{DEFAULT_NA_VALUES, combine_variables_bool};
//! use case_prep::variables::VariableSpec;
//!
//! let smoker = VariableSpec::bool("FUMADOR")
//!     .derived_pre(combine_variables_bool("FUMADOR_A", "FUMADOR_B", DEFAULT_NA_VALUES));
//! ```
//!
//! Registries can also be read from JSON with
//! [`VariableRegistry::from_path`].

pub mod combinators;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reporting;
pub mod types;
pub mod utils;
pub mod variables;
pub mod warnings;

// Re-exports for convenient access
pub use combinators::{
    DEFAULT_NA_VALUES, OnConflict, combine_variables, combine_variables_bool, logical_and,
    logical_or, multibool_to_enum,
};
pub use config::{ConfigValidationError, LoaderConfig, LoaderConfigBuilder};
pub use error::{CasePrepError, Result, ResultExt};
pub use pipeline::{
    ClosureProgressReporter, LoadOutcome, LoadStage, Loader, LoaderBuilder, Preprocessor,
    ProgressReporter, ProgressUpdate,
};
pub use reporting::{OutputWriter, ReportSink, ResultContainer, ResultTree};
pub use types::{
    ActionType, LoadSummary, PreprocessReport, PreprocessingAction, VariableSummary,
};
pub use variables::{
    CategoryLabels, DerivationHook, DerivationPhase, VarType, VariableRegistry, VariableSpec,
};
pub use warnings::{CaseIdFn, CaseRow, CaseWarning, WarningSink};
