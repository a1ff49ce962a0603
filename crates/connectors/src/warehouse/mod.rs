use crate::error::ServiceError;
use async_trait::async_trait;
use model::records::record::Record;
use std::fmt;

pub mod bigquery;

/// `dataset.table` inside the warehouse project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        TableRef {
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// What a load does to rows already in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Add rows; existing rows are untouched.
    Append,
    /// Replace the table contents. Only used for keyed upserts where the
    /// caller has already merged the existing rows in.
    Truncate,
    /// Fail unless the table is empty or missing.
    Empty,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::Append => "WRITE_APPEND",
            WriteDisposition::Truncate => "WRITE_TRUNCATE",
            WriteDisposition::Empty => "WRITE_EMPTY",
        }
    }
}

/// The warehouse as seen by jobs: ad-hoc reads for watermarks and listings,
/// and bulk loads of JSON rows.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Runs a standard-SQL query and returns every row as a record.
    async fn query(&self, sql: &str) -> Result<Vec<Record>, ServiceError>;

    async fn table_exists(&self, table: &TableRef) -> Result<bool, ServiceError>;

    /// Loads `records` into `table`, returning the number of rows written.
    async fn load(
        &self,
        table: &TableRef,
        records: &[Record],
        disposition: WriteDisposition,
    ) -> Result<usize, ServiceError>;
}
