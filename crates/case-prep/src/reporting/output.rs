//! Writing load outputs to an output directory.

use crate::error::{Result, ResultExt};
use crate::reporting::ResultTree;
use crate::types::LoadSummary;
use polars::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the serialized load summary.
pub const SUMMARY_FILE_NAME: &str = "load_summary.json";

/// Writes the cleaned table, the result tree and the load summary.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
    output_name: String,
    separator: u8,
}

/// Paths of the files an [`OutputWriter`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub table: PathBuf,
    pub results: PathBuf,
    pub summary: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>, output_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            output_name: output_name.into(),
            separator: b',',
        }
    }

    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `<name>.csv` with the cleaned table.
    pub fn write_table(&self, df: &mut DataFrame) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .context(format!("Creating output directory {}", self.output_dir.display()))?;

        let path = self.output_dir.join(format!("{}.csv", self.output_name));
        let mut file = File::create(&path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(self.separator)
            .with_quote_char(b'"')
            .finish(df)
            .context(format!("Writing {}", path.display()))?;

        info!("Dataset saved: {}", path.display());
        Ok(path)
    }

    /// Write the load summary as pretty JSON.
    pub fn write_summary(&self, summary: &LoadSummary) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(SUMMARY_FILE_NAME);
        let mut file = File::create(&path)?;
        file.write_all(serde_json::to_string_pretty(summary)?.as_bytes())?;

        info!("Summary saved: {}", path.display());
        Ok(path)
    }

    /// Write every output of a load.
    pub fn write_all(
        &self,
        df: &mut DataFrame,
        results: &ResultTree,
        summary: Option<&LoadSummary>,
    ) -> Result<WrittenFiles> {
        let table = self.write_table(df)?;
        let results = results.dump(&self.output_dir)?;
        let summary = summary.map(|s| self.write_summary(s)).transpose()?;
        Ok(WrittenFiles {
            table,
            results,
            summary,
        })
    }
}
