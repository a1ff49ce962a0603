use crate::{
    error::ServiceError,
    gcp::auth::TokenProvider,
    http::{check_service, http_error, service_client},
    object_store::ObjectStore,
};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

const SERVICE: &str = "gcs";
const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

pub struct GcsClient {
    client: Client,
    base_url: String,
    bucket: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GcsClient {
    pub fn new(bucket: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Result<Self, ServiceError> {
        Ok(GcsClient {
            client: service_client(SERVICE)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            bucket: bucket.into(),
            tokens,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn put_object(
        &self,
        name: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), ServiceError> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.bucket);
        let size = body.len();
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .query(&[("uploadType", "media"), ("name", name)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(http_error(SERVICE))?;
        check_service(SERVICE, resp).await?;
        debug!(object = %self.object_url(name), bytes = size, "Uploaded object");
        Ok(())
    }

    fn object_url(&self, name: &str) -> String {
        format!("gs://{}/{}", self.bucket, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::auth::StaticToken;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_bytes, header, method, path, query_param},
    };

    #[tokio::test]
    async fn test_put_object_uploads_media() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/media-bucket/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "image/abc.jpg"))
            .and(header("content-type", "image/jpeg"))
            .and(body_bytes(b"jpeg-bytes".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let gcs = GcsClient::new("media-bucket", Arc::new(StaticToken("t".into())))
            .unwrap()
            .with_base_url(server.uri());
        gcs.put_object("image/abc.jpg", "image/jpeg", b"jpeg-bytes".to_vec())
            .await
            .unwrap();
        assert_eq!(gcs.object_url("image/abc.jpg"), "gs://media-bucket/image/abc.jpg");
    }

    #[tokio::test]
    async fn test_put_object_forbidden_is_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let gcs = GcsClient::new("b", Arc::new(StaticToken("t".into())))
            .unwrap()
            .with_base_url(server.uri());
        let err = gcs.put_object("x", "text/plain", vec![]).await.unwrap_err();
        assert!(err.is_auth());
    }
}
