use thiserror::Error;

/// Errors raised while pulling records from an upstream API.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level failure reaching the upstream API.
    #[error("Request to {url} failed: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with a non-success status.
    #[error("{url} responded with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Bad or expired credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The body could not be understood.
    #[error("Malformed payload from {url}: {message}")]
    Malformed { url: String, message: String },

    /// The source was configured with values it cannot use.
    #[error("Invalid source configuration: {0}")]
    Config(String),
}

/// Errors raised by the warehouse, object-store and chat clients.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} responded with status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The service accepted the call but reported a failure in its body.
    #[error("{service} rejected the request: {message}")]
    Api {
        service: &'static str,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unexpected {service} response: {message}")]
    Malformed {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ServiceError::Auth(_) | ServiceError::Status { status: 401 | 403, .. }
        )
    }
}

impl SourceError {
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            SourceError::Auth(_) | SourceError::Status { status: 401 | 403, .. }
        )
    }
}
