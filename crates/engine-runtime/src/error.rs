use connectors::{
    error::{ServiceError, SourceError},
    file::csv::error::FileError,
};
use engine_config::error::ConfigError;
use engine_core::error::SinkError;
use std::fmt;
use thiserror::Error;

/// Top-level errors for a sync run.
#[derive(Debug, Error)]
pub enum JobError {
    /// The upstream API failed or answered with something unusable.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A warehouse read (listing, watermark, merge) or a client setup failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read input file: {0}")]
    File(#[from] FileError),

    /// Bad command-line input, such as an inverted date range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Coarse failure classes reported in logs and failure notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceUnavailable,
    AuthFailure,
    SinkWriteFailure,
    ConfigMissing,
    InvalidInput,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::SinkWriteFailure => "sink_write_failure",
            ErrorKind::ConfigMissing => "config_missing",
            ErrorKind::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Source(e) if e.is_auth() => ErrorKind::AuthFailure,
            JobError::Source(SourceError::Config(_)) => ErrorKind::ConfigMissing,
            JobError::Source(_) => ErrorKind::SourceUnavailable,
            JobError::Service(e) if e.is_auth() => ErrorKind::AuthFailure,
            JobError::Service(_) => ErrorKind::SourceUnavailable,
            JobError::Sink(e) if e.is_auth() => ErrorKind::AuthFailure,
            JobError::Sink(_) => ErrorKind::SinkWriteFailure,
            JobError::Config(_) => ErrorKind::ConfigMissing,
            JobError::File(_) | JobError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classifies_auth_first() {
        let expired = JobError::Source(SourceError::Auth("Expired token".into()));
        assert_eq!(expired.kind(), ErrorKind::AuthFailure);

        let forbidden = JobError::Sink(SinkError::Warehouse {
            table: "ccp.nurses".into(),
            source: ServiceError::Status {
                service: "bigquery",
                status: 403,
                body: String::new(),
            },
        });
        assert_eq!(forbidden.kind(), ErrorKind::AuthFailure);
    }

    #[test]
    fn test_kind_taxonomy() {
        let down = JobError::Source(SourceError::Status {
            url: "https://ccp.example".into(),
            status: 503,
            body: String::new(),
        });
        assert_eq!(down.kind(), ErrorKind::SourceUnavailable);
        assert_eq!(
            JobError::Sink(SinkError::Render("bad".into())).kind(),
            ErrorKind::SinkWriteFailure
        );
        assert_eq!(
            JobError::Config(ConfigError::Missing("SOURCE_PARAMS".into())).kind(),
            ErrorKind::ConfigMissing
        );
        assert_eq!(
            JobError::InvalidInput("start after end".into()).kind(),
            ErrorKind::InvalidInput
        );
    }
}
