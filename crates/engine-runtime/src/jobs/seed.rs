//! One-off load of the registered MLHP users from the programme's CSV
//! export. Both tables are written with write-empty semantics, so a second
//! run fails instead of duplicating users.

use crate::{error::JobError, jobs::Job, jobs::mlhp::USERS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connectors::{file::csv::source::CsvSource, warehouse::WriteDisposition};
use engine_core::{connectors::sink::warehouse::WarehouseSink, metrics::Metrics};
use model::{
    core::identifiers::SourceName,
    records::{batch::RecordBatch, record::Record},
};
use std::{collections::HashSet, path::PathBuf};
use tracing::{info, warn};

pub const USERS_RAW: &str = "users_raw";

/// Identifier columns that must stay text (leading zeros, long digits).
const STRING_COLUMNS: [&str; 2] = ["nin_number", "mobile_no"];

const RENAMES: [(&str, &str); 7] = [
    ("old_district", "old_district_name"),
    ("new_district", "district_name"),
    ("mandal", "mandal_name"),
    ("ysr_clinicname", "ysr_clinic_name"),
    ("nin_number", "username"),
    ("sec_code", "secretariat_code"),
    ("mobile_no", "mobile_number"),
];

/// Seeded users start as never extracted.
const INITIAL_TODATE: &str = "2023-04-01";
const INITIAL_EXTRACTED_AT: &str = "2023-04-01T00:00:00Z";

pub struct SeedUsersJob {
    pub source: SourceName,
    pub file: PathBuf,
    pub sink: WarehouseSink,
    pub metrics: Metrics,
}

/// Renames the export's columns, adds the bookkeeping columns and keeps the
/// first row for each username.
pub fn user_rows(raw: &[Record], created_at: DateTime<Utc>) -> Vec<Record> {
    let created_at = created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let mut seen = HashSet::new();
    let mut users = Vec::with_capacity(raw.len());

    for row in raw {
        let mut user = Record::new();
        for (name, value) in row.fields() {
            let name = RENAMES
                .iter()
                .find(|(from, _)| *from == name.as_str())
                .map_or(name.as_str(), |(_, to)| *to);
            user.insert(name, value.clone());
        }
        user.insert("created_at", created_at.clone());
        user.insert("max_todate", INITIAL_TODATE);
        user.insert("_extracted_at", INITIAL_EXTRACTED_AT);
        user.insert("is_extracting", false);

        let username = user.get("username").map(ToString::to_string);
        if seen.insert(username) {
            users.push(user);
        }
    }
    users
}

#[async_trait]
impl Job for SeedUsersJob {
    fn source(&self) -> &SourceName {
        &self.source
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<(), JobError> {
        let csv = CsvSource::open(&self.file, &STRING_COLUMNS)?;
        let raw = csv.read_all()?;
        self.metrics.increment_fetched(raw.len() as u64);

        let users = user_rows(&raw, now);
        if users.len() < raw.len() {
            warn!(duplicates = raw.len() - users.len(), "Dropped duplicate usernames");
        }
        info!(file = %self.file.display(), users = users.len(), "Seeding MLHP users");

        self.sink
            .write(RecordBatch::new(USERS_RAW, raw, now), WriteDisposition::Empty)
            .await?;
        self.sink
            .write(RecordBatch::new(USERS, users, now), WriteDisposition::Empty)
            .await?;
        Ok(())
    }
}
