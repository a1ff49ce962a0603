//! CCP case-management extract: patient and nurse training sessions per
//! day, plus the nurses who ran or attended them.

use crate::{error::JobError, jobs::Job};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use connectors::{
    source::ccp::{CcpClient, session_phones, strip_raw_people},
    warehouse::WriteDisposition,
};
use engine_core::{
    connectors::{
        destination::Destination,
        sink::{
            report::{ReportOutput, ReportSink},
            warehouse::WarehouseSink,
        },
    },
    metrics::Metrics,
    window,
};
use model::{
    core::identifiers::SourceName,
    records::{batch::RecordBatch, record::Record},
    window::{lookback::Lookback, range::SyncWindow},
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

/// Earliest day the API holds data for.
pub const CCP_FLOOR: NaiveDate = match NaiveDate::from_ymd_opt(2023, 6, 1) {
    Some(day) => day,
    None => panic!("invalid CCP floor date"),
};

pub const NURSES: &str = "nurses";
pub const PATIENT_SESSIONS: &str = "patient_training_sessions";
pub const NURSE_SESSIONS: &str = "nurse_training_sessions";
const WATERMARK_COLUMN: &str = "date_of_session";

pub enum CcpOutput {
    /// Incremental load, windowed on the latest loaded session date.
    Warehouse(WarehouseSink),
    /// Spreadsheet of the last seven full days, or of the given inclusive
    /// date range.
    Report {
        output: ReportOutput,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    },
}

pub struct CcpJob {
    pub source: SourceName,
    pub client: CcpClient,
    pub output: CcpOutput,
    pub is_test: bool,
    pub metrics: Metrics,
}

struct CcpExtract {
    patient_sessions: Vec<Record>,
    nurse_sessions: Vec<Record>,
    nurses: Vec<Record>,
}

/// Inclusive report dates: the seven days before `today` unless overridden.
pub fn report_dates(
    today: NaiveDate,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate), JobError> {
    let first = start_date.unwrap_or(today - Days::new(7));
    let last = end_date.unwrap_or(today - Days::new(1));
    if first > last {
        return Err(JobError::InvalidInput(format!(
            "start date {first} is later than end date {last}"
        )));
    }
    if last > today {
        return Err(JobError::InvalidInput(format!(
            "end date {last} is later than today ({today})"
        )));
    }
    Ok((first, last))
}

fn day_window(first: NaiveDate, last: NaiveDate) -> SyncWindow {
    let midnight = |day: NaiveDate| day.and_time(chrono::NaiveTime::MIN).and_utc();
    SyncWindow::bounded(midnight(first), midnight(last + Days::new(1)))
}

/// Keeps one row per `key`, the last one seen, at the position of the first.
pub fn keep_latest(rows: impl IntoIterator<Item = Record>, key: &str) -> Vec<Record> {
    let mut out: Vec<Record> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let id = match row.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => Value::Null.to_string(),
        };
        match index.get(&id) {
            Some(&i) => out[i] = row,
            None => {
                index.insert(id, out.len());
                out.push(row);
            }
        }
    }
    out
}

impl CcpJob {
    async fn window(&self, now: DateTime<Utc>) -> Result<SyncWindow, JobError> {
        match &self.output {
            CcpOutput::Warehouse(sink) => {
                let watermark = window::read_watermark(
                    sink.warehouse(),
                    &sink.table(PATIENT_SESSIONS),
                    WATERMARK_COLUMN,
                )
                .await?;
                Ok(window::for_lookback(now, &Lookback::watermark(), watermark))
            }
            CcpOutput::Report {
                start_date,
                end_date,
                ..
            } => {
                let (first, last) = report_dates(now.date_naive(), *start_date, *end_date)?;
                Ok(day_window(first, last))
            }
        }
    }

    async fn extract(&self, days: &[NaiveDate]) -> Result<Option<CcpExtract>, JobError> {
        let session = self.client.login().await?;

        let mut patient_sessions = Vec::new();
        let mut nurse_sessions = Vec::new();
        for day in days {
            patient_sessions.extend(session.patient_training(*day).await?);
            nurse_sessions.extend(session.nurse_training(*day).await?);
        }
        self.metrics
            .increment_fetched((patient_sessions.len() + nurse_sessions.len()) as u64);

        if patient_sessions.is_empty() {
            info!("No patient training sessions found");
            return Ok(None);
        }

        let phones = session_phones(&patient_sessions, &nurse_sessions);
        info!(phones = phones.len(), "Fetching nurse details");
        let mut nurses = Vec::new();
        for phone in &phones {
            nurses.extend(session.nurse_details(phone).await?);
        }
        self.metrics.increment_fetched(nurses.len() as u64);

        for session in &mut nurse_sessions {
            strip_raw_people(session);
        }
        Ok(Some(CcpExtract {
            patient_sessions,
            nurse_sessions,
            nurses,
        }))
    }

    /// Existing nurse rows followed by the fresh ones, latest per username.
    async fn merge_nurses(
        &self,
        sink: &WarehouseSink,
        fresh: Vec<Record>,
    ) -> Result<Vec<Record>, JobError> {
        let table = sink.table(NURSES);
        if !sink.warehouse().table_exists(&table).await? {
            return Ok(fresh);
        }
        let existing = sink
            .warehouse()
            .query(&format!("SELECT * FROM `{table}`"))
            .await?;
        info!(existing = existing.len(), fresh = fresh.len(), "Merging nurses");
        Ok(keep_latest(existing.into_iter().chain(fresh), "username"))
    }
}

#[async_trait]
impl Job for CcpJob {
    fn source(&self) -> &SourceName {
        &self.source
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<(), JobError> {
        let window = self.window(now).await?;
        let days = window.days(CCP_FLOOR);
        let (Some(first), Some(last)) = (days.first().copied(), days.last().copied()) else {
            info!(%window, "No full days to fetch");
            return Ok(());
        };
        info!(%first, %last, "Fetching CCP data, inclusive");

        let Some(extract) = self.extract(&days).await? else {
            return Ok(());
        };

        let (mut destination, nurses) = match &self.output {
            CcpOutput::Warehouse(sink) => (
                Destination::Warehouse(sink.clone()),
                self.merge_nurses(sink, extract.nurses).await?,
            ),
            CcpOutput::Report { output, .. } => (
                Destination::Report(ReportSink::new(
                    output.clone(),
                    (first, last),
                    self.is_test,
                    self.metrics.clone(),
                )),
                extract.nurses,
            ),
        };

        // table order
        let batches = [
            (NURSE_SESSIONS, extract.nurse_sessions, WriteDisposition::Append),
            (NURSES, nurses, WriteDisposition::Truncate),
            (PATIENT_SESSIONS, extract.patient_sessions, WriteDisposition::Append),
        ];
        for (table, records, disposition) in batches {
            destination
                .write_batch(RecordBatch::new(table, records, now), disposition)
                .await?;
        }
        destination.finish().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use connectors::{
        chat::ChatTarget,
        source::ccp::CcpCredentials,
        warehouse::TableRef,
    };
    use engine_core::fakes::{FakeChat, FakeWarehouse};
    use serde_json::json;
    use std::sync::Arc;
    use tracing_test::traced_test;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method},
    };

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 3, 0, 0).unwrap()
    }

    async fn ccp_server(patient_rows: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(body_partial_json(json!({"login": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "success", "Auth-Key": "k1"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(body_partial_json(json!({"get_total_ccp_class_attendancedata": true, "date": "08-06-2024"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "success", "data": patient_rows})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(body_partial_json(json!({"get_total_ccp_class_attendancedata": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "success", "data": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(body_partial_json(json!({"get_total_nurse_training_sessiondata": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "failed", "error": "No data"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(body_partial_json(json!({"get_nurses_detailes_data": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "data": [{"username": "111", "name": "Asha", "user_created_dateandtime": "2023-07-01 10:00:00"}],
            })))
            .mount(&server)
            .await;
        server
    }

    fn client(server: &MockServer) -> CcpClient {
        CcpClient::new(CcpCredentials {
            url: format!("{}/api", server.uri()),
            username: "reporter".into(),
            password: "pw".into(),
            proxy: None,
        })
        .unwrap()
    }

    fn patient_row() -> Value {
        json!([{"date_of_session": "08-06-2024", "session_conducted_by": "111", "total_trained": "3"}])
    }

    #[test]
    fn test_report_dates() {
        let today = d(2024, 6, 10);
        assert_eq!(report_dates(today, None, None).unwrap(), (d(2024, 6, 3), d(2024, 6, 9)));
        assert_eq!(
            report_dates(today, Some(d(2024, 6, 1)), Some(d(2024, 6, 10))).unwrap(),
            (d(2024, 6, 1), d(2024, 6, 10))
        );
        assert!(matches!(
            report_dates(today, Some(d(2024, 6, 5)), Some(d(2024, 6, 4))),
            Err(JobError::InvalidInput(_))
        ));
        assert!(matches!(
            report_dates(today, None, Some(d(2024, 6, 11))),
            Err(JobError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_day_window_covers_last_day() {
        let window = day_window(d(2024, 6, 3), d(2024, 6, 9));
        assert_eq!(window.days(CCP_FLOOR).len(), 7);
        assert_eq!(window.day_span(CCP_FLOOR), Some((d(2024, 6, 3), d(2024, 6, 9))));
    }

    #[test]
    fn test_keep_latest_prefers_fresh_rows() {
        let rows = [
            json!({"username": "a", "v": 1}),
            json!({"username": "b", "v": 1}),
            json!({"username": "a", "v": 2}),
        ]
        .into_iter()
        .map(|v| Record::from_value(v).unwrap());
        let kept = keep_latest(rows, "username");
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].get("v"), Some(&json!(2)));
        assert_eq!(kept[1].get_str("username"), Some("b"));
    }

    #[tokio::test]
    async fn test_warehouse_run_merges_nurses() {
        let server = ccp_server(patient_row()).await;
        let warehouse = Arc::new(FakeWarehouse::default());
        let patients = TableRef::new("ccp", PATIENT_SESSIONS);
        warehouse.create_table(&patients);
        // latest loaded session: 2024-05-10, so the window opens on 2024-04-10
        warehouse.push_query_result(vec![
            Record::from_value(json!({"watermark": "2024-05-10"})).unwrap(),
        ]);
        let nurses = TableRef::new("ccp", NURSES);
        warehouse.seed(
            &nurses,
            vec![
                Record::from_value(json!({"username": "111", "name": "Old"})).unwrap(),
                Record::from_value(json!({"username": "222", "name": "Kept"})).unwrap(),
            ],
        );
        warehouse.push_query_result(warehouse.rows(&nurses));

        let job = CcpJob {
            source: SourceName::new("andhra_pradesh_ccp"),
            client: client(&server),
            output: CcpOutput::Warehouse(WarehouseSink::new(warehouse.clone(), "ccp", Metrics::new())),
            is_test: false,
            metrics: Metrics::new(),
        };
        job.run(now()).await.unwrap();

        let loads = warehouse.loads();
        let tables: Vec<_> = loads.iter().map(|l| l.table.table.as_str()).collect();
        assert_eq!(tables, vec![NURSES, PATIENT_SESSIONS]);
        assert_eq!(loads[0].disposition, WriteDisposition::Truncate);
        assert_eq!(loads[1].disposition, WriteDisposition::Append);

        let merged = warehouse.rows(&nurses);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].get_str("name"), Some("Asha"));
        assert_eq!(merged[1].get_str("name"), Some("Kept"));

        let sessions = warehouse.rows(&patients);
        assert_eq!(sessions[0].get("total_trained"), Some(&json!(3)));
        assert!(sessions[0].get_str("md5").is_some());

        let queries = warehouse.queries();
        assert!(queries[0].contains("MAX(`date_of_session`)"));
    }

    #[tokio::test]
    async fn test_no_patient_sessions_writes_nothing() {
        let server = ccp_server(json!([])).await;
        let warehouse = Arc::new(FakeWarehouse::default());

        let job = CcpJob {
            source: SourceName::new("andhra_pradesh_ccp"),
            client: client(&server),
            output: CcpOutput::Warehouse(WarehouseSink::new(warehouse.clone(), "ccp", Metrics::new())),
            is_test: false,
            metrics: Metrics::new(),
        };
        // backfill from the floor; keep the test window short
        let job_now = Utc.with_ymd_and_hms(2023, 6, 4, 0, 0, 0).unwrap();
        job.run(job_now).await.unwrap();
        assert!(warehouse.loads().is_empty());
    }

    #[tokio::test]
    async fn test_report_run_posts_spreadsheet() {
        let server = ccp_server(patient_row()).await;
        let chat = Arc::new(FakeChat::default());

        let job = CcpJob {
            source: SourceName::new("andhra_pradesh_ccp"),
            client: client(&server),
            output: CcpOutput::Report {
                output: ReportOutput::Chat {
                    client: chat.clone(),
                    target: ChatTarget::User("U-DEV".into()),
                },
                start_date: None,
                end_date: None,
            },
            is_test: true,
            metrics: Metrics::new(),
        };
        job.run(now()).await.unwrap();

        let files = chat.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1.filename, "data_20240603_20240609.xlsx");
        assert_eq!(
            files[0].1.initial_comment,
            "This is a test. Here are the data for 03 Jun 2024 - 09 Jun 2024."
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_report_run_without_chat_config_completes() {
        let server = ccp_server(patient_row()).await;
        let metrics = Metrics::new();
        let job = CcpJob {
            source: SourceName::new("andhra_pradesh_ccp"),
            client: client(&server),
            output: CcpOutput::Report {
                output: ReportOutput::Disabled {
                    reason: "SLACK_TOKEN is not set".into(),
                },
                start_date: None,
                end_date: None,
            },
            is_test: false,
            metrics: metrics.clone(),
        };
        job.run(now()).await.unwrap();

        assert_eq!(metrics.snapshot().files_written, 0);
        assert!(logs_contain("Report publishing is disabled"));
    }

    #[tokio::test]
    async fn test_inverted_dates_fail_before_any_request() {
        let server = MockServer::start().await;
        let chat = Arc::new(FakeChat::default());
        let job = CcpJob {
            source: SourceName::new("andhra_pradesh_ccp"),
            client: client(&server),
            output: CcpOutput::Report {
                output: ReportOutput::Chat {
                    client: chat.clone(),
                    target: ChatTarget::Channel("C1".into()),
                },
                start_date: Some(d(2024, 6, 9)),
                end_date: Some(d(2024, 6, 1)),
            },
            is_test: true,
            metrics: Metrics::new(),
        };
        assert!(matches!(job.run(now()).await, Err(JobError::InvalidInput(_))));
        assert!(server.received_requests().await.unwrap().is_empty());
        assert_eq!(chat.calls(), 0);
    }
}
