//! Custom error types for the case loading pipeline.
//!
//! Only structural problems are errors: an unreadable file, a declared
//! variable missing from the header, a broken derivation. Data-quality
//! problems in individual cases never surface here; they are recorded as
//! warnings and the offending value or row is dropped.
//!
//! Errors are serializable so they can be reported as JSON by the CLI.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for loading and preprocessing case data.
#[derive(Error, Debug)]
pub enum CasePrepError {
    /// The source file could not be opened or read.
    #[error("Cannot read data file '{}': {source}", .path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// A derivation hook failed while computing a derived variable.
    #[error("Failed to derive variable '{variable}': {reason}")]
    DerivationFailed { variable: String, reason: String },

    /// The table already carries `_ORIGINAL` snapshots.
    #[error("Table was already preprocessed (found column '{0}')")]
    AlreadyPreprocessed(String),

    /// A column in the table has no entry in the variable registry.
    #[error("Column '{0}' is not declared in the variable registry")]
    UndeclaredVariable(String),

    /// The report sink has no result with the requested id.
    #[error("Result '{0}' not found")]
    ResultNotFound(String),

    /// The variable registry is malformed.
    #[error("Invalid variable registry: {0}")]
    InvalidRegistry(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CasePrepError>,
    },
}

impl CasePrepError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CasePrepError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code, suitable for machine-readable output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::FileUnreadable { .. } => "FILE_UNREADABLE",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::DerivationFailed { .. } => "DERIVATION_FAILED",
            Self::AlreadyPreprocessed(_) => "ALREADY_PREPROCESSED",
            Self::UndeclaredVariable(_) => "UNDECLARED_VARIABLE",
            Self::ResultNotFound(_) => "RESULT_NOT_FOUND",
            Self::InvalidRegistry(_) => "INVALID_REGISTRY",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error comes from the variable metadata rather than the data.
    ///
    /// Metadata errors are authoring bugs: retrying with another file will not help.
    pub fn is_metadata_error(&self) -> bool {
        match self {
            Self::DerivationFailed { .. }
            | Self::UndeclaredVariable(_)
            | Self::InvalidRegistry(_) => true,
            Self::WithContext { source, .. } => source.is_metadata_error(),
            _ => false,
        }
    }
}

impl Serialize for CasePrepError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("CasePrepError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for case loading operations.
pub type Result<T> = std::result::Result<T, CasePrepError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CasePrepError::Io(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CasePrepError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            CasePrepError::ColumnNotFound("EDAD".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
        assert_eq!(
            CasePrepError::DerivationFailed {
                variable: "FUMA".to_string(),
                reason: "boom".to_string(),
            }
            .error_code(),
            "DERIVATION_FAILED"
        );
    }

    #[test]
    fn test_file_unreadable_message_contains_path() {
        let error = CasePrepError::FileUnreadable {
            path: PathBuf::from("/no/such/file.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(error.to_string().contains("/no/such/file.csv"));
        assert_eq!(error.error_code(), "FILE_UNREADABLE");
    }

    #[test]
    fn test_is_metadata_error() {
        assert!(CasePrepError::UndeclaredVariable("X".to_string()).is_metadata_error());
        assert!(
            CasePrepError::InvalidRegistry("dup".to_string())
                .with_context("Loading metadata")
                .is_metadata_error()
        );
        assert!(!CasePrepError::ColumnNotFound("X".to_string()).is_metadata_error());
    }

    #[test]
    fn test_error_serialization() {
        let error = CasePrepError::ColumnNotFound("SEXO".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("SEXO"));
    }

    #[test]
    fn test_with_context() {
        let error =
            CasePrepError::ColumnNotFound("SEXO".to_string()).with_context("While loading");
        assert!(error.to_string().contains("While loading"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
    }
}
