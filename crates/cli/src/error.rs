use engine_config::error::ConfigError;
use engine_runtime::execution::executor::JobFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync failed: {0}")]
    Job(#[from] JobFailure),

    #[error("Failed to write the run summary: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}
