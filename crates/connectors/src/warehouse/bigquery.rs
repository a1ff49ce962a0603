use crate::{
    error::ServiceError,
    gcp::auth::TokenProvider,
    http::{check_service, http_error, service_client},
    warehouse::{TableRef, Warehouse, WriteDisposition},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use model::records::record::Record;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};
use uuid::Uuid;

const SERVICE: &str = "bigquery";
const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com";

#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project: String,
    pub location: Option<String>,
    pub base_url: String,
    pub poll_interval: Duration,
}

impl BigQueryConfig {
    pub fn new(project: impl Into<String>) -> Self {
        BigQueryConfig {
            project: project.into(),
            location: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
    job_reference: Option<JobReference>,
}

#[derive(Debug, Clone, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// BigQuery over its REST API.
pub struct BigQueryClient {
    config: BigQueryConfig,
    client: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl BigQueryClient {
    pub fn new(config: BigQueryConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, ServiceError> {
        Ok(BigQueryClient {
            config,
            client: service_client(SERVICE)?,
            tokens,
        })
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    fn api(&self, path: &str) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/{}",
            self.config.base_url, self.config.project, path
        )
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, ServiceError> {
        let token = self.tokens.access_token().await?;
        let mut req = self
            .client
            .get(self.api(&format!("queries/{}", job.job_id)))
            .bearer_auth(token)
            .query(&[
                ("timeoutMs", "60000"),
                ("formatOptions.useInt64Timestamp", "true"),
            ]);
        if let Some(location) = &job.location {
            req = req.query(&[("location", location.as_str())]);
        }
        if let Some(page_token) = page_token {
            req = req.query(&[("pageToken", page_token)]);
        }
        let resp = req.send().await.map_err(http_error(SERVICE))?;
        let resp = check_service(SERVICE, resp).await?;
        resp.json().await.map_err(http_error(SERVICE))
    }

    async fn wait_for_job(&self, job: JobReference) -> Result<(), ServiceError> {
        loop {
            let token = self.tokens.access_token().await?;
            let mut req = self
                .client
                .get(self.api(&format!("jobs/{}", job.job_id)))
                .bearer_auth(token);
            if let Some(location) = &job.location {
                req = req.query(&[("location", location.as_str())]);
            }
            let resp = req.send().await.map_err(http_error(SERVICE))?;
            let resp = check_service(SERVICE, resp).await?;
            let polled: Job = resp.json().await.map_err(http_error(SERVICE))?;

            if polled.status.state == "DONE" {
                return match polled.status.error_result {
                    Some(err) => Err(ServiceError::Api {
                        service: SERVICE,
                        message: format!("{}: {}", err.reason, err.message),
                    }),
                    None => Ok(()),
                };
            }
            debug!(job_id = %job.job_id, state = %polled.status.state, "Waiting for load job");
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn query(&self, sql: &str) -> Result<Vec<Record>, ServiceError> {
        debug!(sql = %sql, "Running warehouse query");
        let token = self.tokens.access_token().await?;
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": 60000,
            "formatOptions": { "useInt64Timestamp": true },
        });
        if let Some(location) = &self.config.location {
            body["location"] = json!(location);
        }

        let resp = self
            .client
            .post(self.api("queries"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(http_error(SERVICE))?;
        let resp = check_service(SERVICE, resp).await?;
        let mut page: QueryResponse = resp.json().await.map_err(http_error(SERVICE))?;

        let job = page.job_reference.clone().ok_or_else(|| ServiceError::Malformed {
            service: SERVICE,
            message: "query response has no job reference".into(),
        })?;
        let mut schema: Option<TableSchema> = None;
        let mut records = Vec::new();

        loop {
            if page.job_complete {
                if schema.is_none() {
                    schema = page.schema.take();
                }
                let fields = schema.as_ref().map(|s| s.fields.as_slice()).unwrap_or(&[]);
                for row in &page.rows {
                    records.push(row_to_record(fields, row));
                }
                match page.page_token.take() {
                    Some(next) => page = self.get_query_results(&job, Some(&next)).await?,
                    None => break,
                }
            } else {
                tokio::time::sleep(self.config.poll_interval).await;
                page = self.get_query_results(&job, None).await?;
            }
        }

        Ok(records)
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, ServiceError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .get(self.api(&format!(
                "datasets/{}/tables/{}",
                table.dataset, table.table
            )))
            .bearer_auth(token)
            .send()
            .await
            .map_err(http_error(SERVICE))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_service(SERVICE, resp).await?;
        Ok(true)
    }

    async fn load(
        &self,
        table: &TableRef,
        records: &[Record],
        disposition: WriteDisposition,
    ) -> Result<usize, ServiceError> {
        if records.is_empty() && disposition != WriteDisposition::Truncate {
            debug!(table = %table, "Nothing to load");
            return Ok(0);
        }

        let mut load = json!({
            "destinationTable": {
                "projectId": self.config.project,
                "datasetId": table.dataset,
                "tableId": table.table,
            },
            "sourceFormat": "NEWLINE_DELIMITED_JSON",
            "autodetect": true,
            "writeDisposition": disposition.as_str(),
        });
        if disposition == WriteDisposition::Append {
            load["schemaUpdateOptions"] = json!(["ALLOW_FIELD_ADDITION"]);
        }
        let mut job = json!({ "configuration": { "load": load } });
        if let Some(location) = &self.config.location {
            job["jobReference"] = json!({ "location": location });
        }

        let boundary = multipart_boundary();
        let body = multipart_body(&boundary, &job, records)?;
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs",
            self.config.base_url, self.config.project
        );
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .query(&[("uploadType", "multipart")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(http_error(SERVICE))?;
        let resp = check_service(SERVICE, resp).await?;
        let started: Job = resp.json().await.map_err(http_error(SERVICE))?;

        self.wait_for_job(started.job_reference).await?;
        info!(
            table = %table,
            rows = records.len(),
            disposition = disposition.as_str(),
            "Loaded rows into warehouse"
        );
        Ok(records.len())
    }
}

/// Fresh per request, so no row can contain it.
fn multipart_boundary() -> String {
    format!("sluice_load_{}", Uuid::new_v4().simple())
}

fn multipart_body(boundary: &str, job: &Value, records: &[Record]) -> Result<Vec<u8>, ServiceError> {
    let malformed = |e: serde_json::Error| ServiceError::Malformed {
        service: SERVICE,
        message: format!("failed to encode load request: {e}"),
    };

    let mut body = Vec::new();
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(&serde_json::to_vec(job).map_err(malformed)?);
    body.extend_from_slice(
        format!("\r\n--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes(),
    );
    for record in records {
        body.extend_from_slice(&serde_json::to_vec(record).map_err(malformed)?);
        body.push(b'\n');
    }
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Ok(body)
}

fn row_to_record(fields: &[FieldSchema], row: &TableRow) -> Record {
    let mut map = Map::new();
    for (field, cell) in fields.iter().zip(row.f.iter()) {
        map.insert(field.name.clone(), convert_cell(field, &cell.v));
    }
    Record::from(map)
}

fn convert_cell(field: &FieldSchema, v: &Value) -> Value {
    if v.is_null() {
        return Value::Null;
    }

    if field.mode.as_deref() == Some("REPEATED") {
        let scalar = FieldSchema {
            mode: None,
            ..field.clone()
        };
        return match v {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| convert_cell(&scalar, item.get("v").unwrap_or(&Value::Null)))
                    .collect(),
            ),
            other => other.clone(),
        };
    }

    let Some(s) = v.as_str() else {
        // RECORD cells arrive as `{"f": [...]}`.
        if let Some(cells) = v.get("f").and_then(Value::as_array) {
            let mut map = Map::new();
            for (sub, cell) in field.fields.iter().zip(cells) {
                map.insert(
                    sub.name.clone(),
                    convert_cell(sub, cell.get("v").unwrap_or(&Value::Null)),
                );
            }
            return Value::Object(map);
        }
        return v.clone();
    };

    match field.field_type.as_str() {
        "INTEGER" | "INT64" => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| json!(s)),
        "FLOAT" | "FLOAT64" => s.parse::<f64>().map(Value::from).unwrap_or_else(|_| json!(s)),
        "BOOLEAN" | "BOOL" => json!(s.eq_ignore_ascii_case("true")),
        "TIMESTAMP" => timestamp_cell(s).map(Value::from).unwrap_or_else(|| json!(s)),
        _ => json!(s),
    }
}

/// TIMESTAMP cells come back as integer microseconds (we ask for
/// `useInt64Timestamp`), or as float seconds from older endpoints.
fn timestamp_cell(s: &str) -> Option<String> {
    let ts = match s.parse::<i64>() {
        Ok(micros) => DateTime::<Utc>::from_timestamp_micros(micros)?,
        Err(_) => {
            let secs = s.parse::<f64>().ok()?;
            DateTime::<Utc>::from_timestamp_micros((secs * 1_000_000.0).round() as i64)?
        }
    };
    Some(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
