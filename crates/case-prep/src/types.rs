use serde::{Deserialize, Serialize};

// ============================================================================
// Preprocessing Report Types
// ============================================================================

/// What one preprocessing run did to a table.
///
/// Returned by [`Preprocessor::preprocess`](crate::Preprocessor::preprocess)
/// and embedded in the [`LoadSummary`] of a load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessReport {
    /// Number of rows when preprocessing started.
    pub rows_before: usize,
    /// Number of rows left after mandatory enforcement.
    pub rows_after: usize,

    /// Variables computed before coercion, in the order they ran.
    pub derived_pre: Vec<String>,
    /// Variables computed after coercion, in the order they ran.
    pub derived_post: Vec<String>,

    /// Per-variable summaries, in table order.
    pub variables: Vec<VariableSummary>,

    /// Audit trail of the steps taken.
    pub actions: Vec<PreprocessingAction>,

    /// Number of warnings recorded during this run.
    pub warnings_recorded: usize,
}

impl PreprocessReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows dropped by mandatory enforcement.
    pub fn rows_dropped(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }

    pub fn add_action(&mut self, action: PreprocessingAction) {
        self.actions.push(action);
    }

    /// Summary of one variable, if it went through coercion.
    pub fn variable(&self, name: &str) -> Option<&VariableSummary> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// Summary of a whole load: file reading plus preprocessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSummary {
    /// Path of the source file.
    pub source: String,
    /// Local time the load started, RFC 3339.
    pub started_at: String,
    /// Total execution time in milliseconds.
    pub duration_ms: u64,

    /// Number of rows read from the file.
    pub rows_read: usize,
    /// Number of columns read from the file.
    pub columns_read: usize,
    /// Number of columns in the returned table.
    pub columns_after: usize,

    /// Warnings published to the report sink (all accumulated ones).
    pub warnings_published: usize,

    pub report: PreprocessReport,
}

impl LoadSummary {
    pub fn rows_kept(&self) -> usize {
        self.report.rows_after
    }

    pub fn rows_dropped(&self) -> usize {
        self.report.rows_dropped()
    }

    /// Percentage of read rows that were dropped.
    pub fn rows_dropped_percentage(&self) -> f32 {
        if self.rows_read == 0 {
            0.0
        } else {
            (self.rows_dropped() as f32 / self.rows_read as f32) * 100.0
        }
    }
}

/// Summary of the coercion and validation of a single variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSummary {
    /// Name of the variable.
    pub name: String,
    /// Declared semantic type (`int`, `float`, `bool`, `category`, `text`).
    pub declared_type: String,
    /// Storage type before coercion.
    pub original_dtype: String,
    /// Storage type after coercion and casting.
    pub final_dtype: String,
    /// Whether missing values drop the case.
    pub mandatory: bool,
    /// Missing values before coercion.
    pub missing_before: usize,
    /// Missing values right after coercion.
    pub missing_after_coercion: usize,
    /// Present values turned into missing by coercion.
    pub values_invalidated: usize,
    /// Rows dropped because this variable was missing.
    pub rows_dropped: usize,
}

impl VariableSummary {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        original_dtype: impl Into<String>,
    ) -> Self {
        let original_dtype = original_dtype.into();
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            final_dtype: original_dtype.clone(),
            original_dtype,
            mandatory: false,
            missing_before: 0,
            missing_after_coercion: 0,
            values_invalidated: 0,
            rows_dropped: 0,
        }
    }
}

/// A single step taken during preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingAction {
    /// Type of action performed.
    pub action_type: ActionType,
    /// Variable the action applies to, or "dataset".
    pub target: String,
    /// Human-readable description of the action.
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PreprocessingAction {
    pub fn new(action_type: ActionType, target: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            action_type,
            target: target.into(),
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// A derived variable was computed.
    VariableDerived,
    /// Raw values were mapped to labels or flags.
    ValuesCoerced,
    /// Cases were dropped for a missing mandatory value.
    RowsDropped,
    /// A column was cast to its final storage type.
    TypeCast,
}

impl ActionType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::VariableDerived => "Variable Derived",
            Self::ValuesCoerced => "Values Coerced",
            Self::RowsDropped => "Rows Dropped",
            Self::TypeCast => "Type Cast",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
