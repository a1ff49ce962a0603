use crate::error::CliError;
use engine_core::{metrics::MetricsSnapshot, state::RunState};
use engine_runtime::execution::executor::RunReport;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    source: &'a str,
    state: RunState,
    metrics: MetricsSnapshot,
    elapsed_secs: f64,
}

fn summary_json(report: &RunReport) -> Result<String, CliError> {
    let summary = RunSummary {
        run_id: report.run_id.as_str(),
        source: report.source.as_str(),
        state: report.state,
        metrics: report.metrics,
        elapsed_secs: report.elapsed.as_secs_f64(),
    };
    Ok(serde_json::to_string_pretty(&summary)?)
}

pub async fn write_summary(report: &RunReport, path: &Path) -> Result<(), CliError> {
    tokio::fs::write(path, summary_json(report)?).await?;
    Ok(())
}
