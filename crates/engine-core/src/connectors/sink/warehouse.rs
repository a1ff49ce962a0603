use crate::{error::SinkError, metrics::Metrics};
use connectors::warehouse::{TableRef, Warehouse, WriteDisposition};
use model::records::batch::RecordBatch;
use std::sync::Arc;
use tracing::info;

/// Loads record batches into tables of one warehouse dataset, stamping the
/// extraction columns on every row.
#[derive(Clone)]
pub struct WarehouseSink {
    warehouse: Arc<dyn Warehouse>,
    dataset: String,
    metrics: Metrics,
}

impl WarehouseSink {
    pub fn new(warehouse: Arc<dyn Warehouse>, dataset: impl Into<String>, metrics: Metrics) -> Self {
        WarehouseSink {
            warehouse,
            dataset: dataset.into(),
            metrics,
        }
    }

    pub fn table(&self, name: &str) -> TableRef {
        TableRef::new(self.dataset.clone(), name)
    }

    /// The warehouse itself, for watermark and merge reads.
    pub fn warehouse(&self) -> &dyn Warehouse {
        self.warehouse.as_ref()
    }

    pub async fn write(
        &self,
        batch: RecordBatch,
        disposition: WriteDisposition,
    ) -> Result<usize, SinkError> {
        let table = self.table(&batch.table);
        if batch.is_empty() {
            info!(table = %table, "No rows to write");
            return Ok(0);
        }

        let batch = batch.with_extraction_columns();
        let written = self
            .warehouse
            .load(&table, &batch.records, disposition)
            .await
            .map_err(|source| SinkError::Warehouse {
                table: table.to_string(),
                source,
            })?;
        self.metrics.increment_rows(written as u64);
        info!(table = %table, rows = written, disposition = disposition.as_str(), "Wrote batch");
        Ok(written)
    }
}
