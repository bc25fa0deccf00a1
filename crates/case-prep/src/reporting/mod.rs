//! Reporting: where load results go.
//!
//! A load publishes its warnings table through the [`ReportSink`] trait.
//! [`ResultTree`] is the in-memory implementation, dumped as `data.json`;
//! [`OutputWriter`] writes the cleaned table and the summaries next to it.
//!
//! # Example
//!
//! ```rust,ignore
//! use case_prep::reporting::{OutputWriter, ResultTree};
//!
//! let mut results = ResultTree::new();
//! let mut df = loader.load("cases.csv", &mut results)?;
//!
//! OutputWriter::new("output", "cases").write_all(&mut df, &results, None)?;
//! ```

mod output;
mod sink;
mod tree;

pub use output::{OutputWriter, SUMMARY_FILE_NAME, WrittenFiles};
pub use sink::{ReportSink, ResultContainer};
pub use tree::{
    ContainerSpec, Label, RESULTS_FILE_NAME, ROOT_RESULT_ID, ResultKind, ResultNode, ResultTree,
    TableData,
};
