use crate::error::JobError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::core::identifiers::SourceName;

pub mod attachments;
pub mod ccp;
pub mod mlhp;
pub mod rest;
pub mod seed;

/// One linear fetch-transform-load pipeline. `now` is the run timestamp;
/// windows end there and extraction columns carry it.
#[async_trait]
pub trait Job: Send + Sync {
    fn source(&self) -> &SourceName;

    async fn run(&self, now: DateTime<Utc>) -> Result<(), JobError>;
}
