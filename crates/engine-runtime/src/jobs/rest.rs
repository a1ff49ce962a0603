use crate::{error::JobError, jobs::Job};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connectors::{source::rest::RestSource, warehouse::WriteDisposition};
use engine_core::{connectors::sink::warehouse::WarehouseSink, metrics::Metrics, window};
use futures::TryStreamExt;
use model::{
    core::identifiers::SourceName,
    records::{batch::RecordBatch, record::Record},
    window::lookback::Lookback,
};
use std::pin::pin;
use tracing::info;

/// Rows per warehouse load.
pub const LOAD_BATCH_ROWS: usize = 5_000;

/// Generic JSON endpoint appended into one warehouse table.
pub struct RestJob {
    pub source: SourceName,
    pub endpoint: RestSource,
    pub sink: WarehouseSink,
    pub table: String,
    pub lookback: Lookback,
    pub watermark_column: Option<String>,
    pub metrics: Metrics,
}

impl RestJob {
    async fn watermark(&self) -> Result<Option<DateTime<Utc>>, JobError> {
        match (&self.lookback, &self.watermark_column) {
            (Lookback::Watermark { .. }, Some(column)) => Ok(window::read_watermark(
                self.sink.warehouse(),
                &self.sink.table(&self.table),
                column,
            )
            .await?),
            _ => Ok(None),
        }
    }

    async fn flush(&self, pending: &mut Vec<Record>, now: DateTime<Utc>) -> Result<(), JobError> {
        if pending.is_empty() {
            return Ok(());
        }
        let batch = RecordBatch::new(self.table.clone(), std::mem::take(pending), now);
        self.sink.write(batch, WriteDisposition::Append).await?;
        Ok(())
    }
}

#[async_trait]
impl Job for RestJob {
    fn source(&self) -> &SourceName {
        &self.source
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<(), JobError> {
        let watermark = self.watermark().await?;
        let window = window::for_lookback(now, &self.lookback, watermark);
        info!(url = self.endpoint.url(), %window, "Fetching records");

        let mut records = pin!(self.endpoint.records(window));
        let mut pending = Vec::new();
        while let Some(record) = records.try_next().await? {
            self.metrics.increment_fetched(1);
            pending.push(record);
            if pending.len() >= LOAD_BATCH_ROWS {
                self.flush(&mut pending, now).await?;
            }
        }
        self.flush(&mut pending, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use connectors::{source::rest::RestSourceConfig, warehouse::TableRef};
    use engine_core::fakes::FakeWarehouse;
    use model::window::lookback::LookbackHours;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap()
    }

    fn job(server: &MockServer, warehouse: Arc<FakeWarehouse>, lookback: Lookback) -> RestJob {
        let mut config = RestSourceConfig::new(server.uri(), "/v1/events");
        config.records_field = Some("data".into());
        config.page_size = 2;
        RestJob {
            source: SourceName::new("events_api"),
            endpoint: RestSource::new(config).unwrap(),
            sink: WarehouseSink::new(warehouse, "events", Metrics::new()),
            table: "events".into(),
            lookback,
            watermark_column: Some("updated_at".into()),
            metrics: Metrics::new(),
        }
    }

    async fn mount_pages(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"id": 1}, {"id": 2}]})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_watermark_window_and_append() {
        let server = MockServer::start().await;
        mount_pages(&server).await;
        let warehouse = Arc::new(FakeWarehouse::default());
        let table = TableRef::new("events", "events");
        warehouse.create_table(&table);
        warehouse.push_query_result(vec![
            Record::from_value(json!({"watermark": "2024-05-01T00:00:00Z"})).unwrap(),
        ]);

        job(&server, warehouse.clone(), Lookback::watermark())
            .run(now())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(
            requests[0]
                .url
                .query_pairs()
                .any(|(k, v)| k == "since" && v == "2024-04-01T00:00:00Z")
        );
        assert_eq!(warehouse.rows(&table).len(), 2);
        assert_eq!(warehouse.loads()[0].disposition, WriteDisposition::Append);
    }

    #[tokio::test]
    async fn test_hourly_lookback_skips_watermark_read() {
        let server = MockServer::start().await;
        mount_pages(&server).await;
        let warehouse = Arc::new(FakeWarehouse::default());

        job(
            &server,
            warehouse.clone(),
            Lookback::Hours {
                hours: LookbackHours::Weekend,
            },
        )
        .run(now())
        .await
        .unwrap();

        assert!(warehouse.queries().is_empty());
        let requests = server.received_requests().await.unwrap();
        assert!(
            requests[0]
                .url
                .query_pairs()
                .any(|(k, v)| k == "since" && v == "2024-06-06T21:00:00Z")
        );
    }
}
