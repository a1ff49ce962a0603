use crate::error::ServiceError;
use async_trait::async_trait;

pub mod gcs;

/// Flat write-only blob storage: objects are addressed by name inside one
/// bucket fixed at construction.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        name: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), ServiceError>;

    /// Bucket-qualified name for logs, e.g. `gs://bucket/name`.
    fn object_url(&self, name: &str) -> String;
}
