use crate::execution::{
    executor::{Executor, JobFailure, RunReport},
    factory,
    request::JobRequest,
};
use chrono::Utc;
use engine_config::settings::ConfigLoader;
use engine_core::metrics::Metrics;
use tracing::info;

pub mod error;
pub mod execution;
pub mod jobs;

/// Resolves the request's settings, builds the job and runs it once.
/// Failures, including configuration failures, are reported to the
/// notification channel before they are returned.
pub async fn run(loader: &ConfigLoader, request: JobRequest) -> Result<RunReport, JobFailure> {
    let source = request.source_name();
    let run = loader.run_settings(source);
    info!(source = %run.source, environment = %run.environment, "Preparing sync");

    let metrics = Metrics::new();
    let executor = Executor::new(
        run.source,
        run.run_url,
        factory::notifier(&loader.notifier(source)),
        metrics.clone(),
    );

    let job = match factory::build(loader, &request, &metrics) {
        Ok(job) => job,
        Err(e) => return Err(executor.fail(e).await),
    };
    executor.execute(job.as_ref(), Utc::now()).await
}
