//! Per-case data-quality warnings.
//!
//! A warning ties a message to the case that triggered it. Callers usually
//! hold a row of the table rather than an identifier, so the sink resolves
//! rows through a caller-supplied case-id function.

use crate::utils::any_value_to_string;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Hidden column holding each case's row number in the table as first
/// preprocessed. Present only while preprocessing runs.
pub const CASE_INDEX_COLUMN: &str = "__case_index";

/// Builds a human-readable case identifier from a row.
pub type CaseIdFn = Arc<dyn Fn(&CaseRow<'_>) -> String + Send + Sync>;

/// Read-only view of one row of a table.
#[derive(Clone, Copy)]
pub struct CaseRow<'a> {
    df: &'a DataFrame,
    position: usize,
}

impl<'a> CaseRow<'a> {
    pub fn new(df: &'a DataFrame, position: usize) -> Self {
        Self { df, position }
    }

    /// Position of the row in the current table.
    pub fn position(&self) -> usize {
        self.position
    }

    /// 0-based row number of the case in the table as it was read.
    ///
    /// Stays the same after other cases are dropped. Falls back to
    /// [`position`](Self::position) outside preprocessing.
    pub fn index(&self) -> usize {
        self.get(CASE_INDEX_COLUMN)
            .and_then(|value| value.extract::<usize>())
            .unwrap_or(self.position)
    }

    /// Value of `column` in this row, `None` if the column does not exist.
    pub fn get(&self, column: &str) -> Option<AnyValue<'a>> {
        self.df.column(column).ok()?.get(self.position).ok()
    }

    /// Value of `column` rendered as text, `None` if absent or missing.
    pub fn get_string(&self, column: &str) -> Option<String> {
        self.get(column).and_then(|value| any_value_to_string(&value))
    }
}

impl fmt::Debug for CaseRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseRow")
            .field("position", &self.position)
            .finish()
    }
}

/// The case a warning is about.
#[derive(Debug, Clone)]
pub enum Case<'a> {
    /// An identifier given directly.
    Id(String),
    /// A row, identified through the sink's case-id function.
    Row(CaseRow<'a>),
}

impl From<&str> for Case<'_> {
    fn from(id: &str) -> Self {
        Case::Id(id.to_string())
    }
}

impl From<String> for Case<'_> {
    fn from(id: String) -> Self {
        Case::Id(id)
    }
}

impl<'a> From<CaseRow<'a>> for Case<'a> {
    fn from(row: CaseRow<'a>) -> Self {
        Case::Row(row)
    }
}

/// A recorded warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseWarning {
    pub case_id: String,
    pub message: String,
}

/// Case ids are the 1-based row number of the case in the table as read.
pub fn row_number_case_id() -> CaseIdFn {
    Arc::new(|row: &CaseRow<'_>| (row.index() + 1).to_string())
}

/// Case ids built from the values of `columns`, joined by `/`.
///
/// Missing values render as an empty string.
pub fn column_case_id<I, S>(columns: I) -> CaseIdFn
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    Arc::new(move |row: &CaseRow<'_>| {
        columns
            .iter()
            .map(|column| row.get_string(column).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("/")
    })
}

/// Append-only log of case warnings.
#[derive(Clone)]
pub struct WarningSink {
    case_id_fun: CaseIdFn,
    warnings: Vec<CaseWarning>,
}

impl Default for WarningSink {
    fn default() -> Self {
        Self::new(row_number_case_id())
    }
}

impl fmt::Debug for WarningSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarningSink")
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

impl WarningSink {
    pub fn new(case_id_fun: CaseIdFn) -> Self {
        Self {
            case_id_fun,
            warnings: Vec::new(),
        }
    }

    /// Identifier of a row according to the configured case-id function.
    pub fn case_id(&self, row: &CaseRow<'_>) -> String {
        (self.case_id_fun)(row)
    }

    /// Append a warning about `case`.
    pub fn record<'a>(&mut self, case: impl Into<Case<'a>>, message: impl Into<String>) {
        let case_id = match case.into() {
            Case::Id(id) => id,
            Case::Row(row) => self.case_id(&row),
        };
        self.warnings.push(CaseWarning {
            case_id,
            message: message.into(),
        });
    }

    pub fn warnings(&self) -> &[CaseWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Remove and return every recorded warning.
    pub fn take(&mut self) -> Vec<CaseWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn clear(&mut self) {
        self.warnings.clear();
    }

    /// Warnings as `(case, message)` table rows.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.warnings
            .iter()
            .map(|w| vec![w.case_id.clone(), w.message.clone()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        df!(
            "HOSP" => &["H1", "H2"],
            "NUM" => &[Some(10i64), None],
        )
        .unwrap()
    }

    #[test]
    fn test_record_literal_id() {
        let mut sink = WarningSink::default();
        sink.record("caso-7", "EDAD perdida");
        assert_eq!(
            sink.warnings(),
            &[CaseWarning {
                case_id: "caso-7".to_string(),
                message: "EDAD perdida".to_string(),
            }]
        );
    }

    #[test]
    fn test_record_row_uses_case_id_fun() {
        let df = sample_df();
        let mut sink = WarningSink::new(column_case_id(["HOSP", "NUM"]));
        sink.record(CaseRow::new(&df, 0), "first");
        sink.record(CaseRow::new(&df, 1), "second");

        assert_eq!(sink.warnings()[0].case_id, "H1/10");
        assert_eq!(sink.warnings()[1].case_id, "H2/");
    }

    #[test]
    fn test_default_case_id_is_row_number() {
        let df = sample_df();
        let mut sink = WarningSink::default();
        sink.record(CaseRow::new(&df, 1), "x");
        assert_eq!(sink.warnings()[0].case_id, "2");
    }

    #[test]
    fn test_row_number_follows_case_index_column() {
        let df = df!(
            CASE_INDEX_COLUMN => &[0u32, 2],
            "HOSP" => &["H1", "H3"],
        )
        .unwrap();
        let mut sink = WarningSink::default();
        sink.record(CaseRow::new(&df, 1), "x");

        assert_eq!(CaseRow::new(&df, 1).position(), 1);
        assert_eq!(sink.warnings()[0].case_id, "3");
    }

    #[test]
    fn test_append_order_and_no_dedup() {
        let mut sink = WarningSink::default();
        sink.record("a", "m");
        sink.record("a", "m");
        sink.record("b", "n");
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.rows()[2], vec!["b".to_string(), "n".to_string()]);

        let taken = sink.take();
        assert_eq!(taken.len(), 3);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_case_row_get_string() {
        let df = sample_df();
        let row = CaseRow::new(&df, 1);
        assert_eq!(row.get_string("HOSP"), Some("H2".to_string()));
        assert_eq!(row.get_string("NUM"), None);
        assert_eq!(row.get_string("NOPE"), None);
    }
}
