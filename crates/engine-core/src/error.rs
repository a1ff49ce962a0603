use connectors::error::ServiceError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while handing records or files to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Write to warehouse table {table} failed: {source}")]
    Warehouse {
        table: String,
        #[source]
        source: ServiceError,
    },

    #[error("Upload of {object} failed: {source}")]
    ObjectStore {
        object: String,
        #[source]
        source: ServiceError,
    },

    #[error("Posting report {filename} failed: {source}")]
    Chat {
        filename: String,
        #[source]
        source: ServiceError,
    },

    #[error("Failed to render report: {0}")]
    Render(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination lacks the capability the caller needed.
    #[error("{sink} sink does not accept {what}")]
    Unsupported {
        sink: &'static str,
        what: &'static str,
    },
}

impl SinkError {
    pub fn is_auth(&self) -> bool {
        match self {
            SinkError::Warehouse { source, .. }
            | SinkError::ObjectStore { source, .. }
            | SinkError::Chat { source, .. } => source.is_auth(),
            _ => false,
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for SinkError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        SinkError::Render(e.to_string())
    }
}
