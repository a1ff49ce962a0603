#![allow(dead_code)]

use connectors::{
    chat::slack::SlackClient,
    source::rest::{RestSource, RestSourceConfig},
    warehouse::TableRef,
};
use engine_config::{
    env::EnvManager, environment::Environment, params::ParamsFile, settings::ConfigLoader,
};
use engine_core::{
    connectors::sink::warehouse::WarehouseSink, fakes::FakeWarehouse, metrics::Metrics,
    notify::Notifier,
};
use engine_runtime::{execution::executor::Executor, jobs::rest::RestJob};
use model::{core::identifiers::SourceName, window::lookback::Lookback};
use serde_json::json;
use std::sync::Arc;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};


pub const SOURCE: &str = "events_api";
pub const DATASET: &str = "events";
pub const RUN_URL: &str = "https://github.com/acme/sync/actions/runs/42";

/// `params.yaml` for the REST source, prod only.
pub const PARAMS: &str = r#"
slack_channel_id: C-ALERTS
sources:
  - name: events_api
    environments:
      - name: prod
        dataset: events
        table: events
        lookback:
          unit: watermark
          overlap_days: 30
        watermark_column: updated_at
        endpoint:
          path: /v1/events
          records_field: data
"#;

pub fn events_table() -> TableRef {
    TableRef::new(DATASET, "events")
}

pub fn loader(vars: Vec<(&'static str, &'static str)>) -> ConfigLoader {
    ConfigLoader::new(
        ParamsFile::from_yaml(PARAMS).expect("params"),
        EnvManager::from_vars(vars),
        Some(Environment::Prod),
    )
}

/// A REST job over `api`, loading into a fake warehouse.
pub fn rest_job(api: &MockServer, warehouse: Arc<FakeWarehouse>, lookback: Lookback, metrics: &Metrics) -> RestJob {
    let mut config = RestSourceConfig::new(api.uri(), "/v1/events");
    config.records_field = Some("data".into());
    config.page_size = 2;
    RestJob {
        source: SourceName::new(SOURCE),
        endpoint: RestSource::new(config).expect("rest source"),
        sink: WarehouseSink::new(warehouse, DATASET, metrics.clone()),
        table: "events".into(),
        lookback,
        watermark_column: Some("updated_at".into()),
        metrics: metrics.clone(),
    }
}

/// Notifier posting to a mocked Slack API.
pub fn slack_notifier(slack: &MockServer) -> Notifier {
    let client = SlackClient::new("xoxb-test")
        .expect("slack client")
        .with_base_url(slack.uri());
    Notifier::new(Some(Arc::new(client)), Some("C-ALERTS".into()))
}

pub fn executor(notifier: Notifier, metrics: &Metrics) -> Executor {
    Executor::new(
        SourceName::new(SOURCE),
        Some(RUN_URL.into()),
        notifier,
        metrics.clone(),
    )
}

/// `pages` full pages of two events, then an empty page.
pub async fn mount_event_pages(api: &MockServer, pages: usize) {
    for page in 0..pages {
        let offset = (page * 2).to_string();
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .and(query_param("offset", offset.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": page * 2, "updated_at": "2024-06-09T10:00:00Z"},
                    {"id": page * 2 + 1, "updated_at": "2024-06-09T11:00:00Z"},
                ]
            })))
            .mount(api)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/v1/events"))
        .and(query_param("offset", (pages * 2).to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(api)
        .await;
}

pub async fn mount_slack_ok(slack: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(slack)
        .await;
}
