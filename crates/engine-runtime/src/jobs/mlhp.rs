//! MLHP sessions extract. Each registered user is synced from their own
//! watermark, the latest session date already loaded for them.

use crate::{error::JobError, jobs::Job};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use connectors::{source::mlhp::MlhpClient, warehouse::WriteDisposition};
use engine_config::error::ConfigError;
use engine_core::{connectors::sink::warehouse::WarehouseSink, metrics::Metrics, window};
use model::{
    core::identifiers::SourceName,
    records::{batch::RecordBatch, record::Record},
    window::lookback::Lookback,
};
use tracing::{debug, info};

/// Earliest day the API holds data for.
pub const MLHP_FLOOR: NaiveDate = match NaiveDate::from_ymd_opt(2023, 4, 1) {
    Some(day) => day,
    None => panic!("invalid MLHP floor date"),
};

pub const USERS: &str = "users";
pub const SESSIONS: &str = "sessions";
/// Sessions of this many users go into one load, to stay inside the
/// warehouse's daily table-append quota.
pub const USERS_PER_LOAD: usize = 10;

pub struct MlhpJob {
    pub source: SourceName,
    pub client: MlhpClient,
    pub sink: WarehouseSink,
    pub chunk_days: u32,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserMark {
    pub username: String,
    pub watermark: Option<DateTime<Utc>>,
}

impl MlhpJob {
    /// Every registered user with the latest session date loaded for them.
    async fn user_marks(&self) -> Result<Vec<UserMark>, JobError> {
        let warehouse = self.sink.warehouse();
        let users = self.sink.table(USERS);
        if !warehouse.table_exists(&users).await? {
            return Err(ConfigError::missing(format!(
                "warehouse table {users}; seed it with mlhp-seed-users"
            ))
            .into());
        }

        let sessions = self.sink.table(SESSIONS);
        let sql = if warehouse.table_exists(&sessions).await? {
            format!(
                "SELECT u.username AS username, MAX(s.session_date) AS watermark \
                 FROM `{users}` AS u LEFT JOIN `{sessions}` AS s ON s.username = u.username \
                 GROUP BY u.username ORDER BY u.username"
            )
        } else {
            format!("SELECT username FROM `{users}` ORDER BY username")
        };

        let rows = warehouse.query(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(UserMark {
                    username: row.get_str("username")?.to_string(),
                    watermark: row.timestamp("watermark"),
                })
            })
            .collect())
    }

    async fn flush(&self, pending: &mut Vec<Record>, now: DateTime<Utc>) -> Result<(), JobError> {
        if pending.is_empty() {
            return Ok(());
        }
        let batch = RecordBatch::new(SESSIONS, std::mem::take(pending), now);
        self.sink.write(batch, WriteDisposition::Append).await?;
        Ok(())
    }
}

#[async_trait]
impl Job for MlhpJob {
    fn source(&self) -> &SourceName {
        &self.source
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<(), JobError> {
        let marks = self.user_marks().await?;
        info!(users = marks.len(), chunk_days = self.chunk_days, "Syncing MLHP sessions");

        let lookback = Lookback::watermark();
        let mut pending = Vec::new();
        for (i, mark) in marks.iter().enumerate() {
            let window = window::for_lookback(now, &lookback, mark.watermark);
            let sessions = self
                .client
                .sessions(&mark.username, &window, MLHP_FLOOR, self.chunk_days)
                .await?;
            debug!(username = %mark.username, %window, sessions = sessions.len(), "Fetched user sessions");
            self.metrics.increment_fetched(sessions.len() as u64);
            pending.extend(sessions);

            if (i + 1) % USERS_PER_LOAD == 0 {
                self.flush(&mut pending, now).await?;
            }
        }
        self.flush(&mut pending, now).await
    }
}
