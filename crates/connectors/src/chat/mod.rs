use crate::error::ServiceError;
use async_trait::async_trait;
use std::fmt;

pub mod slack;

/// Where a chat message or file goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    Channel(String),
    /// A user id; delivered through a direct-message conversation.
    User(String),
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTarget::Channel(id) => write!(f, "channel {id}"),
            ChatTarget::User(id) => write!(f, "user {id}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub title: String,
    pub initial_comment: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn post_message(&self, target: &ChatTarget, text: &str) -> Result<(), ServiceError>;

    async fn upload_file(&self, target: &ChatTarget, file: FileUpload) -> Result<(), ServiceError>;
}
