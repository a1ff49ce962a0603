use crate::error::{ServiceError, SourceError};
use reqwest::{Client, Proxy, Response};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Builds the HTTP client for one source. The proxy, when set, applies to
/// every request the source makes.
pub fn build_client(proxy: Option<&str>) -> Result<Client, SourceError> {
    let mut builder = Client::builder().timeout(DEFAULT_TIMEOUT);
    if let Some(url) = proxy {
        let proxy = Proxy::all(url)
            .map_err(|e| SourceError::Config(format!("invalid proxy url {url}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| SourceError::Config(format!("failed to build http client: {e}")))
}

pub fn service_client(service: &'static str) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|source| ServiceError::Http { service, source })
}

/// Turns a non-success status into [`SourceError::Status`], keeping the body
/// for the failure notification.
pub async fn check_source(url: &str, resp: Response) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SourceError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

pub async fn check_service(service: &'static str, resp: Response) -> Result<Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        service,
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

pub fn unavailable(url: &str) -> impl FnOnce(reqwest::Error) -> SourceError + '_ {
    move |source| SourceError::Unavailable {
        url: url.to_string(),
        source,
    }
}

pub fn http_error(service: &'static str) -> impl FnOnce(reqwest::Error) -> ServiceError {
    move |source| ServiceError::Http { service, source }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
