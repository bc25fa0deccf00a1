//! Metadata-driven preprocessing of a loaded case table.
//!
//! The phase order is fixed:
//!
//! 1. derived variables of the pre phase, in registry order;
//! 2. for every column present at that point, in table order: snapshot to
//!    `<name>_ORIGINAL`, coerce by declared type, then, for mandatory
//!    variables, warn about and drop every case missing the value;
//! 3. derived variables of the post phase, in registry order.
//!
//! Dropping is global: a case dropped for one variable is gone for all the
//! variables processed after it.

use crate::error::{CasePrepError, Result};
use crate::pipeline::progress::{LoadStage, ProgressReporter, ProgressUpdate};
use crate::types::{ActionType, PreprocessReport, PreprocessingAction, VariableSummary};
use crate::utils::{bool_mask, count_missing, is_numeric_dtype, missing_mask, series_float_values};
use crate::variables::{CategoryLabels, DerivationPhase, VarType, VariableRegistry, VariableSpec};
use crate::warnings::{CASE_INDEX_COLUMN, CaseRow, WarningSink};
use polars::prelude::*;
use tracing::{debug, info};

/// Suffix of the columns holding pre-coercion values.
pub const ORIGINAL_SUFFIX: &str = "_ORIGINAL";

/// Name of the snapshot column of `name`.
pub fn original_column_name(name: &str) -> String {
    format!("{name}{ORIGINAL_SUFFIX}")
}

/// Applies a [`VariableRegistry`] to a table.
///
/// A table can be preprocessed only once: derivation hooks expect raw input,
/// so a table that already carries `_ORIGINAL` snapshots is rejected.
pub struct Preprocessor<'a> {
    registry: &'a VariableRegistry,
    progress: Option<&'a dyn ProgressReporter>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(registry: &'a VariableRegistry) -> Self {
        Self {
            registry,
            progress: None,
        }
    }

    pub fn with_progress(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = self.progress {
            reporter.report(update);
        }
    }

    /// Run all three phases on `df` in place.
    ///
    /// While the phases run, `df` carries a [`CASE_INDEX_COLUMN`] so cases
    /// keep their original row number after others are dropped.
    pub fn preprocess(&self, df: &mut DataFrame, sink: &mut WarningSink) -> Result<PreprocessReport> {
        self.ensure_not_preprocessed(df)?;

        let indexed = df.get_column_index(CASE_INDEX_COLUMN).is_none();
        if indexed {
            *df = df.with_row_index(CASE_INDEX_COLUMN.into(), None)?;
        }
        let result = self.run_phases(df, sink);
        if indexed {
            df.drop_in_place(CASE_INDEX_COLUMN)?;
        }
        result
    }

    fn run_phases(&self, df: &mut DataFrame, sink: &mut WarningSink) -> Result<PreprocessReport> {
        let warnings_at_start = sink.len();
        let mut report = PreprocessReport::new();
        report.rows_before = df.height();

        info!("Deriving pre-coercion variables...");
        report.derived_pre = self.compute_derived(df, sink, DerivationPhase::Pre, &mut report)?;

        info!("Coercing and validating variables...");
        let columns: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != CASE_INDEX_COLUMN)
            .map(|name| name.to_string())
            .collect();
        let total = columns.len();
        for (i, name) in columns.iter().enumerate() {
            self.report_progress(ProgressUpdate::for_variable(
                LoadStage::Coercing,
                name.as_str(),
                i,
                total,
                format!("Coercing {}", name),
            ));
            let summary = self.coerce_and_validate(df, name, sink, &mut report)?;
            report.variables.push(summary);
        }

        info!("Deriving post-coercion variables...");
        report.derived_post = self.compute_derived(df, sink, DerivationPhase::Post, &mut report)?;

        report.rows_after = df.height();
        report.warnings_recorded = sink.len() - warnings_at_start;
        info!(
            "Preprocessing done: {} of {} cases kept, {} warnings",
            report.rows_after, report.rows_before, report.warnings_recorded
        );
        Ok(report)
    }

    fn ensure_not_preprocessed(&self, df: &DataFrame) -> Result<()> {
        for name in df.get_column_names() {
            if let Some(base) = name.as_str().strip_suffix(ORIGINAL_SUFFIX)
                && self.registry.contains(base)
            {
                return Err(CasePrepError::AlreadyPreprocessed(name.to_string()));
            }
        }
        Ok(())
    }

    /// Run the hooks of one phase, storing each result under its variable.
    ///
    /// Returns the names of the computed variables in execution order.
    pub fn compute_derived(
        &self,
        df: &mut DataFrame,
        sink: &mut WarningSink,
        phase: DerivationPhase,
        report: &mut PreprocessReport,
    ) -> Result<Vec<String>> {
        let stage = match phase {
            DerivationPhase::Pre => LoadStage::DerivingPre,
            DerivationPhase::Post => LoadStage::DerivingPost,
        };
        let derived: Vec<_> = self.registry.derived_in(phase).collect();
        let total = derived.len();
        let mut computed = Vec::with_capacity(total);

        for (i, (spec, hook)) in derived.into_iter().enumerate() {
            let name = spec.name();
            self.report_progress(ProgressUpdate::for_variable(
                stage,
                name,
                i,
                total,
                format!("Deriving {}", name),
            ));

            let series = hook(&*df, sink).map_err(|e| CasePrepError::DerivationFailed {
                variable: name.to_string(),
                reason: e.to_string(),
            })?;
            if series.len() != df.height() {
                return Err(CasePrepError::DerivationFailed {
                    variable: name.to_string(),
                    reason: format!(
                        "hook returned {} values for a table of {} rows",
                        series.len(),
                        df.height()
                    ),
                });
            }

            let replaced = df.get_column_index(name).is_some();
            df.with_column(series.with_name(name.into()))?;
            debug!("Derived '{}' ({:?} phase, replaced: {})", name, phase, replaced);

            report.add_action(PreprocessingAction::new(
                ActionType::VariableDerived,
                name,
                format!("Computed {} during the {:?} phase", name, phase),
            ));
            computed.push(name.to_string());
        }

        Ok(computed)
    }

    /// Snapshot, coerce and, if mandatory, enforce one column.
    pub fn coerce_and_validate(
        &self,
        df: &mut DataFrame,
        name: &str,
        sink: &mut WarningSink,
        report: &mut PreprocessReport,
    ) -> Result<VariableSummary> {
        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| CasePrepError::UndeclaredVariable(name.to_string()))?;

        let original = df.column(name)?.as_materialized_series().clone();
        let mut summary =
            VariableSummary::new(name, spec.var_type().name(), original.dtype().to_string());
        summary.mandatory = spec.is_mandatory();
        summary.missing_before = count_missing(&original)?;

        df.with_column(original.clone().with_name(original_column_name(name).into()))?;

        let coerced = match spec.var_type() {
            VarType::Category(labels) => Some(coerce_category(&original, labels)?),
            VarType::Bool => Some(coerce_bool(&original)?),
            VarType::Int | VarType::Float => Some(coerce_number(&original)?),
            VarType::Text => None,
        };

        summary.missing_after_coercion = match coerced {
            Some(series) => {
                let missing = count_missing(&series)?;
                df.with_column(series)?;
                missing
            }
            None => summary.missing_before,
        };
        summary.values_invalidated = summary
            .missing_after_coercion
            .saturating_sub(summary.missing_before);

        if summary.values_invalidated > 0 {
            debug!(
                "'{}': {} values did not match the declared {} type",
                name,
                summary.values_invalidated,
                spec.var_type().name()
            );
            report.add_action(
                PreprocessingAction::new(
                    ActionType::ValuesCoerced,
                    name,
                    format!("{} values of {} set to missing", summary.values_invalidated, name),
                )
                .with_details(format!("declared type: {}", spec.var_type().name())),
            );
        }

        if spec.is_mandatory() {
            summary.rows_dropped = self.enforce_mandatory(df, spec, sink)?;
            if summary.rows_dropped > 0 {
                report.add_action(
                    PreprocessingAction::new(
                        ActionType::RowsDropped,
                        name,
                        format!("Dropped {} cases missing {}", summary.rows_dropped, name),
                    )
                    .with_details(format!("{} perdida", name)),
                );
            }

            if matches!(spec.var_type(), VarType::Int) {
                let cast = df
                    .column(name)?
                    .as_materialized_series()
                    .strict_cast(&DataType::Int64)?;
                df.with_column(cast)?;
                report.add_action(PreprocessingAction::new(
                    ActionType::TypeCast,
                    name,
                    format!("Cast {} to Int64", name),
                ));
            }
        }

        summary.final_dtype = df.column(name)?.dtype().to_string();
        Ok(summary)
    }

    /// Warn about and drop every case missing a mandatory variable.
    ///
    /// Returns the number of dropped cases.
    pub fn enforce_mandatory(
        &self,
        df: &mut DataFrame,
        spec: &VariableSpec,
        sink: &mut WarningSink,
    ) -> Result<usize> {
        let name = spec.name();
        let missing: Vec<bool> = missing_mask(df.column(name)?.as_materialized_series())?
            .into_iter()
            .map(|flag| flag.unwrap_or(true))
            .collect();

        let dropped = missing.iter().filter(|&&m| m).count();
        if dropped == 0 {
            return Ok(0);
        }

        for (i, _) in missing.iter().enumerate().filter(|(_, m)| **m) {
            sink.record(CaseRow::new(df, i), format!("{} perdida", name));
        }

        let keep: Vec<bool> = missing.iter().map(|m| !m).collect();
        *df = df.filter(&bool_mask(&keep))?;
        debug!("'{}' is mandatory: dropped {} cases", name, dropped);
        Ok(dropped)
    }
}

/// Map raw values to their canonical labels; unmatched values become missing.
fn coerce_category(series: &Series, labels: &CategoryLabels) -> Result<Series> {
    let mapped: Vec<Option<&str>> = if is_numeric_dtype(series.dtype()) {
        series_float_values(series)?
            .into_iter()
            .map(|v| v.and_then(|raw| labels.lookup_number(raw)))
            .collect()
    } else {
        let strings = series.cast(&DataType::String)?;
        strings
            .str()?
            .into_iter()
            .map(|v| {
                v.and_then(|raw| {
                    labels.lookup_text(raw).or_else(|| {
                        raw.trim()
                            .parse::<f64>()
                            .ok()
                            .and_then(|n| labels.lookup_number(n))
                    })
                })
            })
            .collect()
    };
    let labels_series = Series::new(series.name().clone(), mapped);
    Ok(labels_series.cast(&labels.dtype()?)?)
}

/// Parse values as numbers; anything unparsable becomes missing.
fn coerce_number(series: &Series) -> Result<Series> {
    Ok(Series::new(series.name().clone(), series_float_values(series)?))
}

/// Keep 0 and 1, turn everything else into missing.
fn coerce_bool(series: &Series) -> Result<Series> {
    let flags: Vec<Option<f64>> = series_float_values(series)?
        .into_iter()
        .map(|v| v.filter(|x| *x == 0.0 || *x == 1.0))
        .collect();
    Ok(Series::new(series.name().clone(), flags))
}
