//! MLHP sessions API. Authenticates with `username`/`ApiKey` headers and
//! takes the inclusive date range as `fromdate`/`todate` headers.

use crate::{
    error::SourceError,
    http::{build_client, check_source, unavailable},
    source::{coerce_int, dump_json, json_body},
};
use chrono::{Days, NaiveDate};
use model::{records::record::Record, window::range::SyncWindow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

pub const DEFAULT_CHUNK_DAYS: u32 = 90;

#[derive(Clone, Deserialize)]
pub struct MlhpCredentials {
    pub url: String,
    pub key: String,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl fmt::Debug for MlhpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MlhpCredentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Splits `[first, last]` into consecutive inclusive ranges of at most
/// `chunk_days` days.
pub fn chunk_dates(first: NaiveDate, last: NaiveDate, chunk_days: u32) -> Vec<(NaiveDate, NaiveDate)> {
    let step = u64::from(chunk_days.max(1));
    let mut chunks = Vec::new();
    let mut from = first;
    while from <= last {
        let to = from
            .checked_add_days(Days::new(step - 1))
            .map_or(last, |to| to.min(last));
        chunks.push((from, to));
        match to.checked_add_days(Days::new(1)) {
            Some(next) => from = next,
            None => break,
        }
    }
    chunks
}

pub struct MlhpClient {
    client: Client,
    credentials: MlhpCredentials,
}

impl MlhpClient {
    pub fn new(credentials: MlhpCredentials) -> Result<Self, SourceError> {
        let client = build_client(credentials.proxy.as_deref())?;
        Ok(MlhpClient {
            client,
            credentials,
        })
    }

    async fn fetch_chunk(
        &self,
        username: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Value>, SourceError> {
        let url = &self.credentials.url;
        let resp = self
            .client
            .get(url)
            .header("username", username)
            .header("ApiKey", &self.credentials.key)
            .header("fromdate", from.format("%Y-%m-%d").to_string())
            .header("todate", to.format("%Y-%m-%d").to_string())
            .send()
            .await
            .map_err(unavailable(url))?;
        let resp = check_source(url, resp).await?;
        let body = json_body(url, resp).await?;

        let no_data = body.get("status").and_then(Value::as_str) == Some("Failed")
            && body.get("msg").and_then(Value::as_str) == Some("No Data Found");
        if no_data {
            return Ok(Vec::new());
        }
        match body.get("data") {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(SourceError::Malformed {
                url: url.clone(),
                message: "`data` is not an array".into(),
            }),
        }
    }

    /// All sessions `username` recorded on the days of `window`, one request
    /// per chunk. A backfill window starts at `floor`.
    pub async fn sessions(
        &self,
        username: &str,
        window: &SyncWindow,
        floor: NaiveDate,
        chunk_days: u32,
    ) -> Result<Vec<Record>, SourceError> {
        let Some((first, last)) = window.day_span(floor) else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for (from, to) in chunk_dates(first, last, chunk_days) {
            let items = self.fetch_chunk(username, from, to).await?;
            debug!(%username, %from, %to, rows = items.len(), "Fetched MLHP chunk");
            for item in items {
                let record = Record::from_value(item)
                    .ok_or_else(|| self.malformed("record is not a JSON object".into()))?;
                records.push(session_row(record, username).map_err(|m| self.malformed(m))?);
            }
        }
        Ok(records)
    }

    fn malformed(&self, message: String) -> SourceError {
        SourceError::Malformed {
            url: self.credentials.url.clone(),
            message,
        }
    }
}

pub fn session_row(mut record: Record, username: &str) -> Result<Record, String> {
    if let Some(id) = record.get("id").map(coerce_int) {
        record.insert("id", id);
    }
    if let Some(raw) = record.get_str("session_date") {
        let date = NaiveDate::parse_from_str(raw, "%d-%m-%Y")
            .map_err(|e| format!("bad session_date {raw:?}: {e}"))?;
        record.insert("session_date", date.format("%Y-%m-%d").to_string());
    }
    if let Some(sub) = record.get("subdata").map(dump_json) {
        record.insert("subdata", sub);
    }
    if !record.contains("username") {
        record.insert("username", username);
    }
    Ok(record)
}
