//! Spreadsheet report: buffers every table of a run, renders one workbook
//! with a worksheet per table, and publishes it to chat or a local file.

use crate::{error::SinkError, metrics::Metrics};
use chrono::NaiveDate;
use connectors::{
    chat::{ChatClient, ChatTarget, FileUpload},
    hash::canonical_json,
};
use model::records::batch::RecordBatch;
use rust_xlsxwriter::{Format, Workbook};
use serde_json::Value;
use std::{collections::BTreeMap, path::PathBuf, sync::Arc};
use tracing::{info, warn};

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Where a rendered report ends up.
#[derive(Clone)]
pub enum ReportOutput {
    Chat {
        client: Arc<dyn ChatClient>,
        target: ChatTarget,
    },
    /// A file path, or a directory to place the default file name in.
    Local { path: PathBuf },
    /// Chat is not configured; the report is not published.
    Disabled { reason: String },
}

/// `data_{first:%Y%m%d}_{last:%Y%m%d}.xlsx`
pub fn report_filename(first: NaiveDate, last: NaiveDate) -> String {
    format!("data_{}_{}.xlsx", first.format("%Y%m%d"), last.format("%Y%m%d"))
}

/// `10 Jun 2024`, or `03 Jun 2024 - 09 Jun 2024` for a range.
pub fn report_label(first: NaiveDate, last: NaiveDate) -> String {
    let mut label = first.format("%d %b %Y").to_string();
    if first != last {
        label.push_str(&last.format(" - %d %b %Y").to_string());
    }
    label
}

pub fn report_comment(label: &str, is_test: bool) -> String {
    let prefix = if is_test { "This is a test. " } else { "" };
    format!("{prefix}Here are the data for {label}.")
}

pub fn report_title(label: &str) -> String {
    format!("Data for {label}")
}

/// Renders one worksheet per table, in table-name order. The header row is
/// the union of record keys in first-seen order; absent and null cells stay
/// blank.
pub fn render_workbook(tables: &BTreeMap<String, RecordBatch>) -> Result<Vec<u8>, SinkError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for (name, batch) in tables {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;

        let columns = batch.columns();
        for (col, header) in columns.iter().enumerate() {
            sheet.write_string_with_format(0, column_index(col)?, header, &bold)?;
        }

        for (i, record) in batch.records.iter().enumerate() {
            let row = u32::try_from(i + 1)
                .map_err(|_| SinkError::Render(format!("table {name} has too many rows")))?;
            for (col, header) in columns.iter().enumerate() {
                let col = column_index(col)?;
                match record.get(header) {
                    None | Some(Value::Null) => {}
                    Some(Value::Bool(b)) => {
                        sheet.write_boolean(row, col, *b)?;
                    }
                    Some(Value::Number(n)) => match n.as_f64() {
                        Some(f) => {
                            sheet.write_number(row, col, f)?;
                        }
                        None => {
                            sheet.write_string(row, col, n.to_string())?;
                        }
                    },
                    Some(Value::String(s)) => {
                        sheet.write_string(row, col, s)?;
                    }
                    Some(nested) => {
                        sheet.write_string(row, col, canonical_json(nested))?;
                    }
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn column_index(col: usize) -> Result<u16, SinkError> {
    u16::try_from(col).map_err(|_| SinkError::Render(format!("too many columns ({col})")))
}

pub struct ReportSink {
    output: ReportOutput,
    first_day: NaiveDate,
    last_day: NaiveDate,
    is_test: bool,
    tables: BTreeMap<String, RecordBatch>,
    metrics: Metrics,
}

impl ReportSink {
    pub fn new(
        output: ReportOutput,
        (first_day, last_day): (NaiveDate, NaiveDate),
        is_test: bool,
        metrics: Metrics,
    ) -> Self {
        ReportSink {
            output,
            first_day,
            last_day,
            is_test,
            tables: BTreeMap::new(),
            metrics,
        }
    }

    pub fn filename(&self) -> String {
        report_filename(self.first_day, self.last_day)
    }

    /// Buffers `batch`; batches for the same table are concatenated.
    pub fn write(&mut self, batch: RecordBatch) -> usize {
        let rows = batch.len();
        match self.tables.get_mut(&batch.table) {
            Some(existing) => existing.records.extend(batch.records),
            None => {
                self.tables.insert(batch.table.clone(), batch);
            }
        }
        rows
    }

    /// Renders and publishes the workbook. Nothing is published when
    /// rendering fails.
    pub async fn finish(self) -> Result<(), SinkError> {
        if let ReportOutput::Disabled { reason } = &self.output {
            warn!(filename = %self.filename(), %reason, "Report publishing is disabled; skipping");
            return Ok(());
        }
        let bytes = render_workbook(&self.tables)?;
        let filename = self.filename();
        let label = report_label(self.first_day, self.last_day);
        let size = bytes.len() as u64;
        let rows: usize = self.tables.values().map(RecordBatch::len).sum();

        match self.output {
            ReportOutput::Chat { client, target } => {
                let upload = FileUpload {
                    filename: filename.clone(),
                    title: report_title(&label),
                    initial_comment: report_comment(&label, self.is_test),
                    bytes,
                };
                client
                    .upload_file(&target, upload)
                    .await
                    .map_err(|source| SinkError::Chat {
                        filename: filename.clone(),
                        source,
                    })?;
                info!(%filename, %target, rows, "Posted report");
            }
            ReportOutput::Local { path } => {
                let path = if path.is_dir() { path.join(&filename) } else { path };
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|source| SinkError::Io {
                        path: path.clone(),
                        source,
                    })?;
                info!(path = %path.display(), rows, "Wrote report");
            }
            ReportOutput::Disabled { .. } => return Ok(()),
        }
        self.metrics.increment_files(size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeChat;
    use chrono::{TimeZone, Utc};
    use model::records::record::Record;
    use serde_json::json;
    use tracing_test::traced_test;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn batch(table: &str, rows: Vec<Value>) -> RecordBatch {
        RecordBatch::new(
            table,
            rows.into_iter().map(|v| Record::from_value(v).unwrap()).collect(),
            Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_naming() {
        assert_eq!(report_filename(d(2024, 6, 3), d(2024, 6, 9)), "data_20240603_20240609.xlsx");
        assert_eq!(report_label(d(2024, 6, 3), d(2024, 6, 9)), "03 Jun 2024 - 09 Jun 2024");
        assert_eq!(report_label(d(2024, 6, 9), d(2024, 6, 9)), "09 Jun 2024");
        assert_eq!(
            report_comment("09 Jun 2024", true),
            "This is a test. Here are the data for 09 Jun 2024."
        );
        assert_eq!(report_comment("09 Jun 2024", false), "Here are the data for 09 Jun 2024.");
        assert_eq!(report_title("09 Jun 2024"), "Data for 09 Jun 2024");
    }

    #[test]
    fn test_render_produces_xlsx() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "nurses".to_string(),
            batch("nurses", vec![json!({"username": "a", "n": 1, "ok": true, "x": null})]),
        );
        tables.insert("empty".to_string(), batch("empty", vec![]));

        let bytes = render_workbook(&tables).unwrap();
        // xlsx files are zip archives
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_invalid_sheet_name_fails_render() {
        let mut tables = BTreeMap::new();
        tables.insert("bad/name".to_string(), batch("bad/name", vec![json!({"a": 1})]));
        assert!(matches!(render_workbook(&tables), Err(SinkError::Render(_))));
    }

    #[tokio::test]
    async fn test_finish_posts_to_chat() {
        let chat = Arc::new(FakeChat::default());
        let mut sink = ReportSink::new(
            ReportOutput::Chat {
                client: chat.clone(),
                target: ChatTarget::Channel("C1".into()),
            },
            (d(2024, 6, 3), d(2024, 6, 9)),
            true,
            Metrics::new(),
        );
        sink.write(batch("patient_training_sessions", vec![json!({"a": 1})]));
        sink.write(batch("patient_training_sessions", vec![json!({"a": 2})]));
        sink.finish().await.unwrap();

        let files = chat.files();
        assert_eq!(files.len(), 1);
        let (target, upload) = &files[0];
        assert_eq!(target, &ChatTarget::Channel("C1".into()));
        assert_eq!(upload.filename, "data_20240603_20240609.xlsx");
        assert_eq!(upload.title, "Data for 03 Jun 2024 - 09 Jun 2024");
        assert!(upload.initial_comment.starts_with("This is a test. "));
    }

    #[tokio::test]
    async fn test_render_failure_makes_no_chat_call() {
        let chat = Arc::new(FakeChat::default());
        let mut sink = ReportSink::new(
            ReportOutput::Chat {
                client: chat.clone(),
                target: ChatTarget::Channel("C1".into()),
            },
            (d(2024, 6, 3), d(2024, 6, 9)),
            false,
            Metrics::new(),
        );
        sink.write(batch("bad:name", vec![json!({"a": 1})]));

        assert!(sink.finish().await.is_err());
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_disabled_output_skips_publishing() {
        let metrics = Metrics::new();
        let mut sink = ReportSink::new(
            ReportOutput::Disabled {
                reason: "SLACK_TOKEN is not set".into(),
            },
            (d(2024, 6, 3), d(2024, 6, 9)),
            false,
            metrics.clone(),
        );
        sink.write(batch("nurses", vec![json!({"a": 1})]));
        sink.finish().await.unwrap();

        assert_eq!(metrics.snapshot().files_written, 0);
        assert!(logs_contain("Report publishing is disabled"));
    }

    #[tokio::test]
    async fn test_finish_writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ReportSink::new(
            ReportOutput::Local {
                path: dir.path().to_path_buf(),
            },
            (d(2024, 6, 9), d(2024, 6, 9)),
            true,
            Metrics::new(),
        );
        sink.write(batch("nurses", vec![json!({"a": 1})]));
        sink.finish().await.unwrap();

        assert!(dir.path().join("data_20240609_20240609.xlsx").exists());
    }
}
