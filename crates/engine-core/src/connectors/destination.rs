use crate::{
    connectors::sink::{
        Capability, object_store::ObjectStoreSink, report::ReportSink, warehouse::WarehouseSink,
    },
    error::SinkError,
};
use connectors::warehouse::WriteDisposition;
use model::records::batch::RecordBatch;

/// The sink a job writes into. Each variant accepts either rows or files.
pub enum Destination {
    Warehouse(WarehouseSink),
    ObjectStore(ObjectStoreSink),
    Report(ReportSink),
}

impl Destination {
    pub fn name(&self) -> &'static str {
        match self {
            Destination::Warehouse(_) => "warehouse",
            Destination::ObjectStore(_) => "object-store",
            Destination::Report(_) => "report",
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Destination::Warehouse(_) | Destination::Report(_) => Capability::Rows,
            Destination::ObjectStore(_) => Capability::Files,
        }
    }

    pub fn accepts(&self, capability: Capability) -> bool {
        self.capability() == capability
    }

    /// Hands a batch to the sink. Reports buffer it and ignore `disposition`;
    /// every rendered report replaces the previous file.
    pub async fn write_batch(
        &mut self,
        batch: RecordBatch,
        disposition: WriteDisposition,
    ) -> Result<usize, SinkError> {
        match self {
            Destination::Warehouse(sink) => sink.write(batch, disposition).await,
            Destination::Report(sink) => Ok(sink.write(batch)),
            Destination::ObjectStore(_) => Err(SinkError::Unsupported {
                sink: "object-store",
                what: "record batches",
            }),
        }
    }

    pub async fn write_file(
        &self,
        name: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), SinkError> {
        match self {
            Destination::ObjectStore(sink) => sink.put(name, content_type, body).await,
            _ => Err(SinkError::Unsupported {
                sink: self.name(),
                what: "files",
            }),
        }
    }

    /// Flushes buffered output. Only reports buffer.
    pub async fn finish(self) -> Result<(), SinkError> {
        match self {
            Destination::Report(sink) => sink.finish().await,
            Destination::Warehouse(_) | Destination::ObjectStore(_) => Ok(()),
        }
    }
}
