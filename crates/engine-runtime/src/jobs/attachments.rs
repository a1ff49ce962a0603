//! Copies inbound message attachments from the messaging API into the raw
//! bucket, one object per attachment plus one manifest per line.

use crate::{error::JobError, jobs::Job};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use connectors::{source::media::{MediaDownloader, media_filename}, warehouse::Warehouse};
use engine_core::{connectors::destination::Destination, metrics::Metrics, window};
use model::{
    core::identifiers::SourceName,
    records::record::Record,
    window::{lookback::LookbackHours, range::SyncWindow},
};
use serde_json::{Value, json};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, warn};

pub const MANIFEST_CONTENT_TYPE: &str = "application/x-ndjson";

pub struct AttachmentsJob {
    pub source: SourceName,
    pub analytics: Arc<dyn Warehouse>,
    /// Fully qualified `project.dataset.table` of the attachment listing.
    pub listing_table: String,
    pub downloader: MediaDownloader,
    pub line_headers: BTreeMap<String, BTreeMap<String, String>>,
    pub destination: Destination,
    pub manifest_prefix: String,
    pub hours: LookbackHours,
    pub metrics: Metrics,
}

/// The listing read from the analytics warehouse for `window`.
pub fn listing_query(table: &str, window: &SyncWindow) -> String {
    let lower = window
        .start
        .map(|start| format!("inserted_at >= TIMESTAMP('{}') AND ", sql_ts(start)))
        .unwrap_or_default();
    format!(
        "SELECT * FROM `{table}` WHERE {lower}inserted_at < TIMESTAMP('{}') \
         AND direction = 'inbound' AND media_type NOT IN ('location', 'sticker') \
         ORDER BY channel_phone",
        sql_ts(window.end)
    )
}

fn sql_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn manifest_name(prefix: &str, line: &str, window: &SyncWindow) -> String {
    let start = window
        .start
        .map(|s| s.format("%Y%m%d%H").to_string())
        .unwrap_or_else(|| "start".to_string());
    format!("{prefix}/{line}/{start}_{}.jsonl", window.end.format("%Y%m%d%H"))
}

/// String form of a listing cell; phone numbers may come back as numbers.
fn text(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl AttachmentsJob {
    /// Copies one attachment. `Ok(None)` means it was skipped.
    async fn transfer(&self, row: &Record) -> Result<Option<Value>, JobError> {
        let (Some(uri), Some(line), Some(media_type)) = (
            text(row, "uri"),
            text(row, "channel_phone"),
            text(row, "media_type"),
        ) else {
            warn!("Skipping attachment row without uri, channel_phone or media_type");
            return Ok(None);
        };
        let Some(headers) = self.line_headers.get(&line) else {
            warn!(%line, "Skipping attachment, no headers configured for line");
            return Ok(None);
        };
        let mime = text(row, "mime_type");
        let Some(body) = self.downloader.download(&uri, headers).await? else {
            return Ok(None);
        };

        let object = format!("{media_type}/{}", media_filename(&uri, mime.as_deref()));
        let content_type = mime.as_deref().unwrap_or("application/octet-stream");
        let bytes = body.len();
        self.destination.write_file(&object, content_type, body).await?;

        Ok(Some(json!({
            "object": object,
            "uri": uri,
            "channel_phone": line,
            "media_type": media_type,
            "mime_type": mime,
            "inserted_at": row.get("inserted_at").cloned().unwrap_or(Value::Null),
            "bytes": bytes,
        })))
    }

    async fn write_manifests(
        &self,
        window: &SyncWindow,
        manifests: BTreeMap<String, Vec<Value>>,
    ) -> Result<(), JobError> {
        for (line, entries) in manifests {
            let mut body = Vec::new();
            for entry in &entries {
                body.extend_from_slice(entry.to_string().as_bytes());
                body.push(b'\n');
            }
            let name = manifest_name(&self.manifest_prefix, &line, window);
            self.destination
                .write_file(&name, MANIFEST_CONTENT_TYPE, body)
                .await?;
            info!(%line, objects = entries.len(), manifest = %name, "Wrote manifest");
        }
        Ok(())
    }
}

#[async_trait]
impl Job for AttachmentsJob {
    fn source(&self) -> &SourceName {
        &self.source
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<(), JobError> {
        let window = window::hourly(now, self.hours);
        info!(%window, hours = self.hours.hours(), "Listing attachments");

        let rows = self
            .analytics
            .query(&listing_query(&self.listing_table, &window))
            .await?;
        self.metrics.increment_fetched(rows.len() as u64);
        info!(attachments = rows.len(), "Found attachments");

        let mut manifests: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for row in &rows {
            match self.transfer(row).await? {
                Some(entry) => {
                    let line = entry["channel_phone"].as_str().unwrap_or_default().to_string();
                    manifests.entry(line).or_default().push(entry);
                }
                None => self.metrics.increment_skipped(),
            }
        }

        self.write_manifests(&window, manifests).await
    }
}
