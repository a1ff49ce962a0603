use crate::{error::SinkError, metrics::Metrics};
use connectors::object_store::ObjectStore;
use std::sync::Arc;
use tracing::debug;

/// Writes named objects into a bucket. Writing an existing name replaces it.
#[derive(Clone)]
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    metrics: Metrics,
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>, metrics: Metrics) -> Self {
        ObjectStoreSink { store, metrics }
    }

    pub async fn put(&self, name: &str, content_type: &str, body: Vec<u8>) -> Result<(), SinkError> {
        let size = body.len() as u64;
        self.store
            .put_object(name, content_type, body)
            .await
            .map_err(|source| SinkError::ObjectStore {
                object: self.store.object_url(name),
                source,
            })?;
        self.metrics.increment_files(size);
        debug!(object = %self.store.object_url(name), bytes = size, "Stored object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeObjectStore;

    #[tokio::test]
    async fn test_put_overwrites_and_counts() {
        let store = Arc::new(FakeObjectStore::default());
        let metrics = Metrics::new();
        let sink = ObjectStoreSink::new(store.clone(), metrics.clone());

        sink.put("image/a.jpg", "image/jpeg", vec![1, 2]).await.unwrap();
        sink.put("image/a.jpg", "image/jpeg", vec![3]).await.unwrap();

        assert_eq!(store.names(), vec!["image/a.jpg"]);
        assert_eq!(store.object("image/a.jpg").unwrap().1, vec![3]);
        assert_eq!(metrics.snapshot().files_written, 2);
    }

    #[tokio::test]
    async fn test_failure_names_object() {
        let store = Arc::new(FakeObjectStore::default());
        store.fail_uploads();
        let sink = ObjectStoreSink::new(store, Metrics::new());

        let err = sink.put("audio/b.ogg", "audio/ogg", vec![]).await.unwrap_err();
        assert!(err.to_string().contains("mem://audio/b.ogg"));
    }
}
