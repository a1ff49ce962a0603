//! Generic JSON REST source: one endpoint, offset/page/token pagination and
//! an optional time-window filter sent as query parameters.

use crate::{
    error::SourceError,
    http::{build_client, check_source, unavailable},
    source::json_body,
};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::{Stream, TryStreamExt, stream};
use model::{
    pagination::{
        cursor::{Cursor, PaginationStyle},
        page::FetchResult,
    },
    records::record::Record,
    window::range::SyncWindow,
};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, fmt, time::Instant};
use tracing::debug;

/// How requests to the endpoint authenticate.
#[derive(Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RestAuth {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        #[serde(default)]
        password: Option<String>,
    },
    Headers {
        headers: BTreeMap<String, String>,
    },
}

impl fmt::Debug for RestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestAuth::None => write!(f, "None"),
            RestAuth::Bearer { .. } => write!(f, "Bearer(<redacted>)"),
            RestAuth::Basic { username, .. } => write!(f, "Basic({username}, <redacted>)"),
            RestAuth::Headers { headers } => {
                f.debug_list().entries(headers.keys()).finish()
            }
        }
    }
}

impl RestAuth {
    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            RestAuth::None => req,
            RestAuth::Bearer { token } => req.bearer_auth(token),
            RestAuth::Basic { username, password } => req.basic_auth(username, password.as_ref()),
            RestAuth::Headers { headers } => headers
                .iter()
                .fold(req, |req, (name, value)| req.header(name, value)),
        }
    }
}

/// Names of the query parameters the endpoint understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub offset: String,
    pub page: String,
    pub limit: String,
    pub token: String,
    /// Lower bound of the window; omitted entirely on a backfill.
    pub since: String,
    /// Upper bound of the window; not sent when unset.
    pub until: Option<String>,
}

impl Default for QueryParams {
    fn default() -> Self {
        QueryParams {
            offset: "offset".into(),
            page: "page".into(),
            limit: "limit".into(),
            token: "cursor".into(),
            since: "since".into(),
            until: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestSourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub path: String,
    /// Dotted path to the record array; the body itself when unset.
    #[serde(default)]
    pub records_field: Option<String>,
    /// Dotted path to the continuation token for token pagination.
    #[serde(default = "default_next_token_field")]
    pub next_token_field: String,
    #[serde(default)]
    pub pagination: PaginationStyle,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub params: QueryParams,
    /// `strftime` format for window bounds; RFC 3339 when unset.
    #[serde(default)]
    pub timestamp_format: Option<String>,
    #[serde(default)]
    pub extra_query: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: RestAuth,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_next_token_field() -> String {
    "next_cursor".to_string()
}

fn default_page_size() -> usize {
    100
}

impl RestSourceConfig {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        RestSourceConfig {
            base_url: base_url.into(),
            path: path.into(),
            records_field: None,
            next_token_field: default_next_token_field(),
            pagination: PaginationStyle::default(),
            page_size: default_page_size(),
            params: QueryParams::default(),
            timestamp_format: None,
            extra_query: BTreeMap::new(),
            auth: RestAuth::None,
            proxy: None,
        }
    }

    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }
}

pub struct RestSource {
    config: RestSourceConfig,
    client: Client,
    url: String,
}

impl RestSource {
    pub fn new(config: RestSourceConfig) -> Result<Self, SourceError> {
        if config.page_size == 0 {
            return Err(SourceError::Config("page_size must be positive".into()));
        }
        let client = build_client(config.proxy.as_deref())?;
        let url = config.url();
        Ok(RestSource {
            config,
            client,
            url,
        })
    }

    fn format_bound(&self, ts: DateTime<Utc>) -> String {
        match &self.config.timestamp_format {
            Some(fmt) => ts.format(fmt).to_string(),
            None => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn query_for(&self, cursor: &Cursor, window: &SyncWindow) -> Vec<(String, String)> {
        let params = &self.config.params;
        let mut query: Vec<(String, String)> = self
            .config
            .extra_query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(start) = window.start {
            query.push((params.since.clone(), self.format_bound(start)));
        }
        if let Some(until) = &params.until {
            query.push((until.clone(), self.format_bound(window.end)));
        }

        let limit = self.config.page_size.to_string();
        match cursor {
            Cursor::None => query.push((params.limit.clone(), limit)),
            Cursor::Offset { offset } => {
                query.push((params.offset.clone(), offset.to_string()));
                query.push((params.limit.clone(), limit));
            }
            Cursor::Page { page } => {
                query.push((params.page.clone(), page.to_string()));
                query.push((params.limit.clone(), limit));
            }
            Cursor::Token { token } => {
                query.push((params.token.clone(), token.clone()));
                query.push((params.limit.clone(), limit));
            }
        }
        query
    }

    /// Requests the page at `cursor`.
    pub async fn fetch_page(
        &self,
        cursor: &Cursor,
        window: &SyncWindow,
    ) -> Result<FetchResult, SourceError> {
        let started = Instant::now();
        let req = self
            .client
            .get(&self.url)
            .query(&self.query_for(cursor, window));
        let resp = self
            .config
            .auth
            .apply(req)
            .send()
            .await
            .map_err(unavailable(&self.url))?;
        let resp = check_source(&self.url, resp).await?;
        let body = json_body(&self.url, resp).await?;

        let records = self.extract_records(&body)?;
        let next_cursor = match self.config.pagination {
            PaginationStyle::Token => lookup(&body, &self.config.next_token_field)
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(|t| Cursor::Token {
                    token: t.to_string(),
                }),
            _ => cursor.advance(records.len()),
        };

        debug!(url = %self.url, ?cursor, rows = records.len(), "Fetched page");
        Ok(FetchResult {
            records,
            next_cursor,
            took_ms: started.elapsed().as_millis(),
        })
    }

    fn extract_records(&self, body: &Value) -> Result<Vec<Record>, SourceError> {
        let malformed = |message: String| SourceError::Malformed {
            url: self.url.clone(),
            message,
        };
        let items = match &self.config.records_field {
            Some(field) => lookup(body, field)
                .ok_or_else(|| malformed(format!("missing field `{field}`")))?,
            None => body,
        };
        let Value::Array(items) = items else {
            return Err(malformed("expected an array of records".into()));
        };
        items
            .iter()
            .map(|item| {
                Record::from_value(item.clone())
                    .ok_or_else(|| malformed("record is not a JSON object".into()))
            })
            .collect()
    }

    async fn next_page(
        &self,
        cursor: Option<Cursor>,
        window: SyncWindow,
    ) -> Result<Option<(Vec<Record>, Option<Cursor>)>, SourceError> {
        let Some(cursor) = cursor else {
            return Ok(None);
        };
        let page = self.fetch_page(&cursor, &window).await?;
        if page.records.is_empty() {
            return Ok(None);
        }
        Ok(Some((page.records, page.next_cursor)))
    }

    /// Every record in `window`, page by page, until the endpoint returns an
    /// empty page (or, for token pagination, stops handing out tokens).
    pub fn records(
        &self,
        window: SyncWindow,
    ) -> impl Stream<Item = Result<Record, SourceError>> + '_ {
        stream::try_unfold(Some(self.config.pagination.initial()), move |cursor| {
            self.next_page(cursor, window)
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Record, SourceError>)))
        .try_flatten()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|p| !p.is_empty())
        .try_fold(body, |value, key| value.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use wiremock::{
        Mock, MockServer, Request, Respond, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    /// Serves `pages` full pages of `page_size` records, then empty pages.
    struct OffsetPages {
        pages: usize,
        page_size: usize,
        requests: Arc<AtomicUsize>,
        saw_since: Arc<AtomicUsize>,
    }

    impl Respond for OffsetPages {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let mut offset = 0;
            for (k, v) in request.url.query_pairs() {
                match k.as_ref() {
                    "offset" => offset = v.parse().unwrap_or(0),
                    "since" => {
                        self.saw_since.fetch_add(1, Ordering::SeqCst);
                    }
                    _ => {}
                }
            }
            let total = self.pages * self.page_size;
            let items: Vec<Value> = (offset..total.min(offset + self.page_size))
                .map(|i| json!({"id": i}))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({"data": {"items": items}}))
        }
    }

    fn window() -> SyncWindow {
        SyncWindow::bounded(
            Utc.with_ymd_and_hms(2024, 6, 9, 23, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap(),
        )
    }

    async fn offset_server(pages: usize, page_size: usize) -> (MockServer, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let server = MockServer::start().await;
        let requests = Arc::new(AtomicUsize::new(0));
        let saw_since = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .and(path("/v1/events"))
            .respond_with(OffsetPages {
                pages,
                page_size,
                requests: requests.clone(),
                saw_since: saw_since.clone(),
            })
            .mount(&server)
            .await;
        (server, requests, saw_since)
    }

    fn config(server: &MockServer, page_size: usize) -> RestSourceConfig {
        RestSourceConfig {
            records_field: Some("data.items".into()),
            page_size,
            ..RestSourceConfig::new(server.uri(), "/v1/events")
        }
    }

    #[tokio::test]
    async fn test_full_pages_then_empty_page() {
        let (server, requests, _) = offset_server(3, 5).await;
        let source = RestSource::new(config(&server, 5)).unwrap();

        let records: Vec<Record> = source.records(window()).try_collect().await.unwrap();

        assert_eq!(records.len(), 15);
        assert_eq!(requests.load(Ordering::SeqCst), 4);
        assert_eq!(records[14].get("id"), Some(&json!(14)));
    }

    #[tokio::test]
    async fn test_backfill_sends_no_lower_bound() {
        let (server, requests, saw_since) = offset_server(1, 5).await;
        let source = RestSource::new(config(&server, 5)).unwrap();
        let backfill = SyncWindow::unbounded(window().end);

        let records: Vec<Record> = source.records(backfill).try_collect().await.unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
        assert_eq!(saw_since.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_window_bounds_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(query_param("since", "2024-06-09T23:00:00Z"))
            .and(query_param("until", "2024-06-10T00:00:00Z"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = RestSourceConfig::new(server.uri(), "feed");
        cfg.params.until = Some("until".into());
        cfg.auth = RestAuth::Bearer {
            token: "secret".into(),
        };
        let source = RestSource::new(cfg).unwrap();
        let records: Vec<Record> = source.records(window()).try_collect().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_token_pagination_stops_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("cursor", "t2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 3}],
                "next_cursor": null,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 1}, {"id": 2}],
                "next_cursor": "t2",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = RestSourceConfig {
            records_field: Some("results".into()),
            pagination: PaginationStyle::Token,
            ..RestSourceConfig::new(server.uri(), "items")
        };
        let source = RestSource::new(cfg).unwrap();
        let records: Vec<Record> = source.records(window()).try_collect().await.unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_error_status_aborts_stream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let source = RestSource::new(RestSourceConfig::new(server.uri(), "x")).unwrap();
        let err = source
            .records(window())
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_non_array_payload_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"oops": 1})))
            .mount(&server)
            .await;

        let source = RestSource::new(RestSourceConfig::new(server.uri(), "x")).unwrap();
        let err = source
            .records(window())
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn test_auth_debug_is_redacted() {
        let auth = RestAuth::Bearer {
            token: "secret".into(),
        };
        assert!(!format!("{auth:?}").contains("secret"));
    }
}
