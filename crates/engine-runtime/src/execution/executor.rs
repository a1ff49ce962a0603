use crate::{error::JobError, jobs::Job};
use chrono::{DateTime, Utc};
use engine_core::{
    metrics::{Metrics, MetricsSnapshot},
    notify::{Notification, Notifier},
    state::RunState,
};
use model::core::identifiers::{RunId, SourceName};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub source: SourceName,
    pub state: RunState,
    pub metrics: MetricsSnapshot,
    pub elapsed: Duration,
}

/// A failed run: the error plus how far the failure notice got.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct JobFailure {
    pub report: RunReport,
    #[source]
    pub error: JobError,
}

/// Drives one run through `running -> succeeded`, or
/// `running -> failed -> notified` when the failure notice goes out.
pub struct Executor {
    run_id: RunId,
    source: SourceName,
    run_url: Option<String>,
    notifier: Notifier,
    metrics: Metrics,
    started: Instant,
}

impl Executor {
    pub fn new(
        source: SourceName,
        run_url: Option<String>,
        notifier: Notifier,
        metrics: Metrics,
    ) -> Self {
        Executor {
            run_id: RunId::generate(),
            source,
            run_url,
            notifier,
            metrics,
            started: Instant::now(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn execute(&self, job: &dyn Job, now: DateTime<Utc>) -> Result<RunReport, JobFailure> {
        info!(run_id = %self.run_id, source = %job.source(), %now, "Starting sync");
        match job.run(now).await {
            Ok(()) => {
                let report = self.report(RunState::Succeeded);
                info!(
                    run_id = %self.run_id,
                    source = %self.source,
                    metrics = ?report.metrics,
                    elapsed_secs = report.elapsed.as_secs_f64(),
                    "Sync succeeded"
                );
                Ok(report)
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Records a failure, including one raised before the job could be
    /// built, and sends the failure notice.
    pub async fn fail(&self, error: JobError) -> JobFailure {
        let mut state = RunState::Failed;
        error!(
            run_id = %self.run_id,
            source = %self.source,
            kind = %error.kind(),
            error = %error,
            "Sync failed"
        );

        let notice = Notification::failure(self.source.clone(), &error, self.run_url.clone());
        if self.notifier.send(&notice).await && state.can_move_to(RunState::Notified) {
            state = RunState::Notified;
        }
        debug!(run_id = %self.run_id, state = %state, "Run finished");

        JobFailure {
            report: self.report(state),
            error,
        }
    }

    fn report(&self, state: RunState) -> RunReport {
        RunReport {
            run_id: self.run_id.clone(),
            source: self.source.clone(),
            state,
            metrics: self.metrics.snapshot(),
            elapsed: self.started.elapsed(),
        }
    }
}
