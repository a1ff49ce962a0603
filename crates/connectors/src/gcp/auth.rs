use crate::{
    error::ServiceError,
    http::{check_service, http_error},
};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::OnceCell;
use tracing::debug;

const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Service-account key as downloaded from the cloud console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Supplies the bearer token for Google API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, ServiceError>;
}

/// Exchanges a service-account key for an access token once per process.
/// Runs are far shorter than the token lifetime, so the token is never
/// refreshed.
pub struct ServiceAccountTokenProvider {
    key: ServiceAccountKey,
    client: reqwest::Client,
    token: OnceCell<String>,
}

impl ServiceAccountTokenProvider {
    pub fn new(key: ServiceAccountKey) -> Result<Self, ServiceError> {
        Ok(Self {
            key,
            client: crate::http::service_client("oauth")?,
            token: OnceCell::new(),
        })
    }

    fn signed_assertion(&self) -> Result<String, ServiceError> {
        let now = chrono::Utc::now().timestamp();
        let claims = GrantClaims {
            iss: &self.key.client_email,
            scope: SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| ServiceError::Auth(format!("invalid service account key: {e}")))?;
        encode(&header, &claims, &key)
            .map_err(|e| ServiceError::Auth(format!("failed to sign token grant: {e}")))
    }

    async fn exchange(&self) -> Result<String, ServiceError> {
        let assertion = self.signed_assertion()?;
        debug!(client_email = %self.key.client_email, "Exchanging service account grant");

        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(http_error("oauth"))?;
        let resp = check_service("oauth", resp)
            .await
            .map_err(|e| ServiceError::Auth(e.to_string()))?;
        let token: TokenResponse = resp.json().await.map_err(http_error("oauth"))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, ServiceError> {
        self.token
            .get_or_try_init(|| self.exchange())
            .await
            .cloned()
    }
}

/// Fixed token, for tests and for environments that inject one directly.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, ServiceError> {
        Ok(self.0.clone())
    }
}
