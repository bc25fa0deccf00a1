//! Configuration types for loading case data.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic loader setup.

use serde::{Deserialize, Serialize};

/// Default marker treated as missing while parsing the source file.
pub const DEFAULT_FILE_NA_VALUES: [&str; 1] = [" "];

/// Tokens always read as missing unless `keep_default_na` is off.
pub const DEFAULT_NA_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Default id of the container receiving the warnings table.
pub const DEFAULT_WARNINGS_CONTAINER: &str = "root";

/// Default id of the warnings table inside its container.
pub const DEFAULT_WARNINGS_TABLE_ID: &str = "warnings";

/// Configuration for a [`Loader`](crate::Loader).
///
/// Use [`LoaderConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use case_prep::config::LoaderConfig;
///
/// let config = LoaderConfig::builder()
///     .na_values(["", " ", "NA"])
///     .separator(b';')
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Raw cell contents treated as missing while parsing.
    /// Default: `[" "]`
    pub na_values: Vec<String>,

    /// Whether [`DEFAULT_NA_TOKENS`] are read as missing on top of `na_values`.
    /// Default: true
    #[serde(default = "default_keep_default_na")]
    pub keep_default_na: bool,

    /// Field separator of the delimited file.
    /// Default: `,`
    pub separator: u8,

    /// Quote character of the delimited file, if any.
    /// Default: `"`
    pub quote_char: Option<u8>,

    /// Number of rows used to infer column types. `None` scans the whole file.
    /// Default: None
    pub infer_schema_length: Option<usize>,

    /// Id of the result container the warnings table is added to.
    /// Default: "root"
    pub warnings_container: String,

    /// Id of the warnings table inside its container.
    /// Default: "warnings"
    pub warnings_table_id: String,

    /// Display title of the warnings table.
    /// Default: "Warnings"
    pub warnings_title: String,

    /// Column headings of the warnings table (case, message).
    /// Default: `["Caso", ""]`
    pub warnings_headings: [String; 2],
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            na_values: DEFAULT_FILE_NA_VALUES.iter().map(|s| s.to_string()).collect(),
            keep_default_na: true,
            separator: b',',
            quote_char: Some(b'"'),
            infer_schema_length: None,
            warnings_container: DEFAULT_WARNINGS_CONTAINER.to_string(),
            warnings_table_id: DEFAULT_WARNINGS_TABLE_ID.to_string(),
            warnings_title: "Warnings".to_string(),
            warnings_headings: ["Caso".to_string(), String::new()],
        }
    }
}

fn default_keep_default_na() -> bool {
    true
}

impl LoaderConfig {
    /// Create a new configuration builder.
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    /// Every raw token read as missing: `na_values`, then the defaults
    /// when `keep_default_na` is set. Duplicates are removed.
    pub fn null_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::with_capacity(self.na_values.len());
        let defaults = DEFAULT_NA_TOKENS
            .iter()
            .filter(|_| self.keep_default_na)
            .map(|s| s.to_string());
        for token in self.na_values.iter().cloned().chain(defaults) {
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        tokens
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if matches!(self.separator, b'\n' | b'\r') {
            return Err(ConfigValidationError::InvalidSeparator(self.separator as char));
        }

        if self.quote_char == Some(self.separator) {
            return Err(ConfigValidationError::QuoteEqualsSeparator(
                self.separator as char,
            ));
        }

        if self.infer_schema_length == Some(0) {
            return Err(ConfigValidationError::InvalidInferSchemaLength);
        }

        if self.warnings_table_id.is_empty() || self.warnings_table_id.contains('.') {
            return Err(ConfigValidationError::InvalidResultId(
                self.warnings_table_id.clone(),
            ));
        }

        if self.warnings_container.is_empty() {
            return Err(ConfigValidationError::InvalidResultId(
                self.warnings_container.clone(),
            ));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid separator: {0:?}")]
    InvalidSeparator(char),

    #[error("Quote character cannot be the separator ({0:?})")]
    QuoteEqualsSeparator(char),

    #[error("Invalid infer_schema_length: 0 (use None to scan the whole file)")]
    InvalidInferSchemaLength,

    #[error("Invalid result id: '{0}' (must be non-empty, table ids cannot contain dots)")]
    InvalidResultId(String),
}

impl From<ConfigValidationError> for crate::error::CasePrepError {
    fn from(e: ConfigValidationError) -> Self {
        crate::error::CasePrepError::InvalidConfig(e.to_string())
    }
}

/// Builder for [`LoaderConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct LoaderConfigBuilder {
    na_values: Option<Vec<String>>,
    keep_default_na: Option<bool>,
    separator: Option<u8>,
    quote_char: Option<Option<u8>>,
    infer_schema_length: Option<usize>,
    warnings_container: Option<String>,
    warnings_table_id: Option<String>,
    warnings_title: Option<String>,
    warnings_headings: Option<[String; 2]>,
}

impl LoaderConfigBuilder {
    /// Set the raw values treated as missing while parsing.
    ///
    /// These replace the default `[" "]` entirely.
    pub fn na_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.na_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Read [`DEFAULT_NA_TOKENS`] as missing too (on by default).
    pub fn keep_default_na(mut self, keep: bool) -> Self {
        self.keep_default_na = Some(keep);
        self
    }

    /// Set the field separator.
    pub fn separator(mut self, separator: u8) -> Self {
        self.separator = Some(separator);
        self
    }

    /// Set the quote character (`None` disables quoting).
    pub fn quote_char(mut self, quote: Option<u8>) -> Self {
        self.quote_char = Some(quote);
        self
    }

    /// Limit type inference to the first `rows` rows.
    pub fn infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = Some(rows);
        self
    }

    /// Set the container that receives the warnings table.
    pub fn warnings_container(mut self, id: impl Into<String>) -> Self {
        self.warnings_container = Some(id.into());
        self
    }

    /// Set the id of the warnings table.
    pub fn warnings_table_id(mut self, id: impl Into<String>) -> Self {
        self.warnings_table_id = Some(id.into());
        self
    }

    /// Set the title of the warnings table.
    pub fn warnings_title(mut self, title: impl Into<String>) -> Self {
        self.warnings_title = Some(title.into());
        self
    }

    /// Set the headings of the warnings table.
    pub fn warnings_headings(mut self, case: impl Into<String>, message: impl Into<String>) -> Self {
        self.warnings_headings = Some([case.into(), message.into()]);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `LoaderConfig` or an error if validation fails.
    pub fn build(self) -> Result<LoaderConfig, ConfigValidationError> {
        let defaults = LoaderConfig::default();
        let config = LoaderConfig {
            na_values: self.na_values.unwrap_or(defaults.na_values),
            keep_default_na: self.keep_default_na.unwrap_or(defaults.keep_default_na),
            separator: self.separator.unwrap_or(defaults.separator),
            quote_char: self.quote_char.unwrap_or(defaults.quote_char),
            infer_schema_length: self.infer_schema_length.or(defaults.infer_schema_length),
            warnings_container: self.warnings_container.unwrap_or(defaults.warnings_container),
            warnings_table_id: self.warnings_table_id.unwrap_or(defaults.warnings_table_id),
            warnings_title: self.warnings_title.unwrap_or(defaults.warnings_title),
            warnings_headings: self.warnings_headings.unwrap_or(defaults.warnings_headings),
        };

        config.validate()?;
        Ok(config)
    }
}
