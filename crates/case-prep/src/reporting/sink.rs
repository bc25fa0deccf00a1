use crate::error::Result;

/// A result that can hold child tables.
pub trait ResultContainer {
    /// Add (or replace) a table child with id `id`.
    fn add_table(
        &mut self,
        id: &str,
        title: &str,
        headings: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<()>;
}

/// Destination of the tables a load publishes.
pub trait ReportSink {
    /// Container result with the given id.
    ///
    /// Fails with [`ResultNotFound`](crate::CasePrepError::ResultNotFound) when
    /// no container has that id.
    fn get_result(&mut self, id: &str) -> Result<Box<dyn ResultContainer + '_>>;
}
