use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving a job's configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required parameter or secret is absent.
    #[error("Missing configuration: {0}")]
    Missing(String),

    /// A value is present but unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {what}: {source}")]
    Yaml {
        what: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Source `{0}` is not defined in the params file")]
    UnknownSource(String),

    #[error("Source `{source_name}` has no `{environment}` environment")]
    UnknownEnvironment {
        source_name: String,
        environment: String,
    },
}

impl ConfigError {
    pub fn missing(what: impl Into<String>) -> Self {
        ConfigError::Missing(what.into())
    }
}
