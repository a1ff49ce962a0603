//! Slack Web API client: plain messages plus the external-upload flow for
//! files (reserve an upload URL, send the bytes, then share the file).

use crate::{
    chat::{ChatClient, ChatTarget, FileUpload},
    error::ServiceError,
    http::{check_service, http_error, service_client},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

const SERVICE: &str = "slack";
const DEFAULT_BASE_URL: &str = "https://slack.com/api";

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    upload_url: String,
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct OpenResponse {
    channel: OpenedChannel,
}

#[derive(Debug, Deserialize)]
struct OpenedChannel {
    id: String,
}

pub struct SlackClient {
    client: Client,
    base_url: String,
    token: String,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: service_client(SERVICE)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Slack reports most failures as `200 {"ok": false, "error": ...}`.
    async fn decode<T: DeserializeOwned>(
        method: &str,
        resp: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let resp = check_service(SERVICE, resp).await?;
        let body: serde_json::Value = resp.json().await.map_err(http_error(SERVICE))?;
        let envelope: Envelope =
            serde_json::from_value(body.clone()).map_err(|e| ServiceError::Malformed {
                service: SERVICE,
                message: format!("{method}: {e}"),
            })?;
        if !envelope.ok {
            let error = envelope.error.unwrap_or_else(|| "unknown".to_string());
            return Err(match error.as_str() {
                "invalid_auth" | "not_authed" | "token_revoked" | "account_inactive" => {
                    ServiceError::Auth(format!("{method}: {error}"))
                }
                _ => ServiceError::Api {
                    service: SERVICE,
                    message: format!("{method} failed: {error}"),
                },
            });
        }
        serde_json::from_value(body).map_err(|e| ServiceError::Malformed {
            service: SERVICE,
            message: format!("{method}: {e}"),
        })
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ServiceError> {
        let resp = self
            .client
            .post(self.method_url(method))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(http_error(SERVICE))?;
        Self::decode(method, resp).await
    }

    async fn call_form<T: DeserializeOwned>(
        &self,
        method: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ServiceError> {
        let resp = self
            .client
            .post(self.method_url(method))
            .bearer_auth(&self.token)
            .form(form)
            .send()
            .await
            .map_err(http_error(SERVICE))?;
        Self::decode(method, resp).await
    }

    /// Resolves a target to a conversation id, opening a DM for users.
    async fn channel_id(&self, target: &ChatTarget) -> Result<String, ServiceError> {
        match target {
            ChatTarget::Channel(id) => Ok(id.clone()),
            ChatTarget::User(user) => {
                let opened: OpenResponse = self
                    .call_form("conversations.open", &[("users", user.as_str())])
                    .await?;
                Ok(opened.channel.id)
            }
        }
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    #[instrument(level = "debug", skip(self, text))]
    async fn post_message(&self, target: &ChatTarget, text: &str) -> Result<(), ServiceError> {
        let channel = self.channel_id(target).await?;
        let _: Envelope = self
            .call_json("chat.postMessage", json!({ "channel": channel, "text": text }))
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, file), fields(filename = %file.filename))]
    async fn upload_file(&self, target: &ChatTarget, file: FileUpload) -> Result<(), ServiceError> {
        let channel = self.channel_id(target).await?;
        let length = file.bytes.len().to_string();
        let reserved: UploadUrlResponse = self
            .call_form(
                "files.getUploadURLExternal",
                &[("filename", file.filename.as_str()), ("length", length.as_str())],
            )
            .await?;

        let resp = self
            .client
            .post(&reserved.upload_url)
            .body(file.bytes)
            .send()
            .await
            .map_err(http_error(SERVICE))?;
        check_service(SERVICE, resp).await?;
        debug!(file_id = %reserved.file_id, "Uploaded file bytes");

        let files = json!([{ "id": reserved.file_id, "title": file.title }]).to_string();
        let _: Envelope = self
            .call_form(
                "files.completeUploadExternal",
                &[
                    ("files", files.as_str()),
                    ("channel_id", channel.as_str()),
                    ("initial_comment", file.initial_comment.as_str()),
                ],
            )
            .await?;
        Ok(())
    }
}
