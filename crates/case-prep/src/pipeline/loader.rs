//! Loading case tables from delimited files.
//!
//! This module provides the [`Loader`] struct and its builder. A load reads
//! the declared raw variables, runs the [`Preprocessor`], and publishes the
//! accumulated warnings to a [`ReportSink`].

use crate::config::LoaderConfig;
use crate::error::{CasePrepError, Result, ResultExt};
use crate::pipeline::preprocessor::Preprocessor;
use crate::pipeline::progress::{
    ClosureProgressReporter, LoadStage, ProgressReporter, ProgressUpdate,
};
use crate::reporting::ReportSink;
use crate::types::{LoadSummary, PreprocessReport};
use crate::variables::VariableRegistry;
use crate::warnings::{
    Case, CaseIdFn, CaseRow, CaseWarning, WarningSink, column_case_id, row_number_case_id,
};
use chrono::Local;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// The cleaned table of a load together with its summary.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub data: DataFrame,
    pub summary: LoadSummary,
}

/// Loads case files according to a variable registry.
///
/// Use [`Loader::builder()`] to create a loader.
///
/// Warnings accumulate across loads: every load publishes all the warnings
/// recorded so far. Use [`take_warnings`](Self::take_warnings) or
/// [`clear_warnings`](Self::clear_warnings) to start afresh.
///
/// # Example
///
/// ```rust,ignore
/// use case_prep::{Loader, VariableRegistry};
/// use case_prep::reporting::ResultTree;
///
/// let registry = VariableRegistry::from_path("variables.json")?;
/// let mut loader = Loader::builder()
///     .registry(registry)
///     .case_id_columns(["HOSPITAL", "NUM"])
///     .build()?;
///
/// let mut results = ResultTree::new();
/// let df = loader.load("cases.csv", &mut results)?;
/// results.dump("output")?;
/// ```
pub struct Loader {
    registry: Arc<VariableRegistry>,
    config: LoaderConfig,
    warnings: WarningSink,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

// A loader can be handed to a worker thread.
static_assertions::assert_impl_all!(Loader: Send);

impl Loader {
    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::default()
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Warnings recorded so far, across all loads.
    pub fn warnings(&self) -> &[CaseWarning] {
        self.warnings.warnings()
    }

    pub fn take_warnings(&mut self) -> Vec<CaseWarning> {
        self.warnings.take()
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    /// Record a warning on the loader's sink.
    ///
    /// Row cases are identified through the configured case-id function.
    pub fn add_warning<'a>(&mut self, case: impl Into<Case<'a>>, message: impl Into<String>) {
        self.warnings.record(case, message);
    }

    /// Case identifier of a row according to the loader's case-id function.
    pub fn case_id(&self, row: &CaseRow<'_>) -> String {
        self.warnings.case_id(row)
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    /// Load `path` and return the cleaned table.
    ///
    /// # Errors
    ///
    /// - [`CasePrepError::FileUnreadable`] if the file cannot be opened.
    /// - [`CasePrepError::ColumnNotFound`] if a raw variable is missing from
    ///   the header. Nothing is preprocessed in that case.
    /// - [`CasePrepError::DerivationFailed`] if a derivation hook fails.
    pub fn load(&mut self, path: impl AsRef<Path>, report_sink: &mut dyn ReportSink) -> Result<DataFrame> {
        self.load_detailed(path, report_sink).map(|outcome| outcome.data)
    }

    /// Like [`load`](Self::load), also returning a [`LoadSummary`].
    pub fn load_detailed(
        &mut self,
        path: impl AsRef<Path>,
        report_sink: &mut dyn ReportSink,
    ) -> Result<LoadOutcome> {
        match self.load_internal(path.as_ref(), report_sink) {
            Ok(outcome) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Loaded {} cases",
                    outcome.data.height()
                )));
                Ok(outcome)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Load error: {}", e);
                Err(e)
            }
        }
    }

    /// Preprocess a table that is already in memory.
    ///
    /// Warnings go to the loader's sink; nothing is published.
    pub fn preprocess(&mut self, df: &mut DataFrame) -> Result<PreprocessReport> {
        let mut preprocessor = Preprocessor::new(&self.registry);
        if let Some(reporter) = self.progress_reporter.as_deref() {
            preprocessor = preprocessor.with_progress(reporter);
        }
        preprocessor.preprocess(df, &mut self.warnings)
    }

    fn load_internal(&mut self, path: &Path, report_sink: &mut dyn ReportSink) -> Result<LoadOutcome> {
        let start_time = Instant::now();
        let started_at = Local::now().to_rfc3339();

        info!("Loading cases from {}", path.display());
        self.report_progress(ProgressUpdate::new(
            LoadStage::Reading,
            0.0,
            format!("Reading {}", path.display()),
        ));

        let mut df = self.read_raw(path)?;
        let rows_read = df.height();
        let columns_read = df.width();
        debug!("Read {} rows x {} columns", rows_read, columns_read);

        let report = self.preprocess(&mut df)?;

        self.report_progress(ProgressUpdate::new(
            LoadStage::PublishingWarnings,
            0.0,
            "Publishing warnings",
        ));
        let warnings_published = self.publish_warnings(report_sink)?;

        let summary = LoadSummary {
            source: path.display().to_string(),
            started_at,
            duration_ms: start_time.elapsed().as_millis() as u64,
            rows_read,
            columns_read,
            columns_after: df.width(),
            warnings_published,
            report,
        };
        info!(
            "Loaded {} of {} cases from {} ({} warnings)",
            summary.rows_kept(),
            rows_read,
            path.display(),
            warnings_published
        );

        Ok(LoadOutcome { data: df, summary })
    }

    /// Read the raw variables of the registry, in file order.
    fn read_raw(&self, path: &Path) -> Result<DataFrame> {
        let header = self
            .csv_options()
            .with_n_rows(Some(0))
            .into_reader_with_file_handle(open_case_file(path)?)
            .finish()
            .context(format!("Parsing header of {}", path.display()))?;

        let raw_names = self.registry.raw_variable_names();
        for name in &raw_names {
            if header.get_column_index(name).is_none() {
                return Err(CasePrepError::ColumnNotFound(name.to_string()));
            }
        }

        let wanted: HashSet<&str> = raw_names.into_iter().collect();
        let keep: Vec<PlSmallStr> = header
            .get_column_names()
            .into_iter()
            .filter(|name| wanted.contains(name.as_str()))
            .cloned()
            .collect();
        let ignored = header.width() - keep.len();
        if ignored > 0 {
            debug!("Ignoring {} undeclared columns", ignored);
        }

        self.csv_options()
            .with_columns(Some(keep.into()))
            .into_reader_with_file_handle(open_case_file(path)?)
            .finish()
            .context(format!("Parsing {}", path.display()))
    }

    fn csv_options(&self) -> CsvReadOptions {
        let null_values: Vec<PlSmallStr> = self
            .config
            .null_tokens()
            .into_iter()
            .map(PlSmallStr::from)
            .collect();
        let parse_options = CsvParseOptions::default()
            .with_separator(self.config.separator)
            .with_quote_char(self.config.quote_char)
            .with_null_values(Some(NullValues::AllColumns(null_values)));

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.config.infer_schema_length)
            .with_parse_options(parse_options)
    }

    /// Hand every accumulated warning to the report sink as one table.
    fn publish_warnings(&self, report_sink: &mut dyn ReportSink) -> Result<usize> {
        let rows = self.warnings.rows();
        let count = rows.len();
        report_sink
            .get_result(&self.config.warnings_container)?
            .add_table(
                &self.config.warnings_table_id,
                &self.config.warnings_title,
                self.config.warnings_headings.to_vec(),
                rows,
            )?;
        debug!(
            "Published {} warnings to {}.{}",
            count, self.config.warnings_container, self.config.warnings_table_id
        );
        Ok(count)
    }
}

fn open_case_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| CasePrepError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Builder for [`Loader`].
#[derive(Default)]
pub struct LoaderBuilder {
    registry: Option<Arc<VariableRegistry>>,
    config: Option<LoaderConfig>,
    case_id_fn: Option<CaseIdFn>,
    case_id_columns: Option<Vec<String>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(LoaderBuilder: Send);

impl LoaderBuilder {
    /// Set the variable registry (required).
    pub fn registry(mut self, registry: impl Into<Arc<VariableRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Identify cases with a custom function.
    ///
    /// Defaults to the 1-based row position in the table at the time the
    /// warning is recorded.
    pub fn case_id_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&CaseRow<'_>) -> String + Send + Sync + 'static,
    {
        self.case_id_fn = Some(Arc::new(f));
        self
    }

    /// Identify cases by the values of these variables, joined by `/`.
    pub fn case_id_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.case_id_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the loader.
    ///
    /// Fails if no registry was given, the configuration is invalid, or a
    /// case-id column is not a declared variable.
    pub fn build(self) -> Result<Loader> {
        let registry = self
            .registry
            .ok_or_else(|| CasePrepError::InvalidConfig("a variable registry is required".to_string()))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let case_id_fun = match (self.case_id_fn, self.case_id_columns) {
            (Some(f), _) => f,
            (None, Some(columns)) => {
                if let Some(missing) = columns.iter().find(|c| !registry.contains(c)) {
                    return Err(CasePrepError::InvalidConfig(format!(
                        "case id column '{}' is not a declared variable",
                        missing
                    )));
                }
                column_case_id(columns)
            }
            (None, None) => row_number_case_id(),
        };

        Ok(Loader {
            registry,
            config,
            warnings: WarningSink::new(case_id_fun),
            progress_reporter: self.progress_reporter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> VariableRegistry {
        VariableRegistry::new([
            VariableSpec::text("HOSP"),
            VariableSpec::float("EDAD").mandatory(),
        ])
        .unwrap()
    }

    #[test]
    fn test_builder_requires_registry() {
        let err = Loader::builder().build().err().unwrap();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_builder_rejects_undeclared_case_id_column() {
        let result = Loader::builder()
            .registry(registry())
            .case_id_columns(["NOPE"])
            .build();
        assert!(matches!(result, Err(CasePrepError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = LoaderConfig {
            warnings_table_id: "a.b".to_string(),
            ..Default::default()
        };
        let result = Loader::builder().registry(registry()).config(config).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_in_memory_preprocess_uses_case_id_columns() {
        let mut loader = Loader::builder()
            .registry(registry())
            .case_id_columns(["HOSP"])
            .build()
            .unwrap();
        let mut df = df!(
            "HOSP" => &["H1", "H2"],
            "EDAD" => &[Some(40.0), None],
        )
        .unwrap();

        loader.preprocess(&mut df).unwrap();

        assert_eq!(loader.warnings().len(), 1);
        assert_eq!(loader.warnings()[0].case_id, "H2");
        assert_eq!(loader.take_warnings().len(), 1);
        assert!(loader.warnings().is_empty());
    }

    #[test]
    fn test_custom_case_id_fn() {
        let loader = Loader::builder()
            .registry(registry())
            .case_id_fn(|row| format!("case-{}", row.index()))
            .build()
            .unwrap();
        let df = df!("HOSP" => &["H1"]).unwrap();
        assert_eq!(loader.case_id(&CaseRow::new(&df, 0)), "case-0");
    }

    #[test]
    fn test_progress_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut loader = Loader::builder()
            .registry(registry())
            .on_progress(move |_update| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let mut df = df!("HOSP" => &["H1"], "EDAD" => &[1.0]).unwrap();
        loader.preprocess(&mut df).unwrap();

        // One update per coerced column.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
