use crate::file::csv::{error::FileError, metadata::CsvMetadata};
use csv::{ReaderBuilder, StringRecord};
use model::{
    pagination::{cursor::Cursor, page::FetchResult},
    records::record::Record,
};
use std::path::Path;
use tracing::info;

/// A CSV file loaded into memory and served as typed records.
pub struct CsvSource {
    pub meta: CsvMetadata,
    rows: Vec<StringRecord>,
}

impl CsvSource {
    pub fn open(path: &Path, string_columns: &[&str]) -> Result<Self, FileError> {
        if !path.exists() {
            return Err(FileError::NotFound(path.to_path_buf()));
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b',')
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(FileError::MissingHeader(path.to_path_buf()));
        }
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let meta = CsvMetadata::infer(&name, &headers, &rows, ',', string_columns);
        info!(file = %path.display(), rows = rows.len(), columns = meta.columns.len(), "Read CSV file");
        Ok(CsvSource { meta, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn fetch(&self, batch_size: usize, cursor: &Cursor) -> Result<FetchResult, FileError> {
        let start = std::time::Instant::now();
        let offset = match cursor {
            Cursor::None => 0,
            Cursor::Offset { offset } => *offset,
            other => {
                return Err(FileError::UnsupportedCursor(format!("{other:?}")));
            }
        };

        let records: Vec<Record> = self
            .rows
            .iter()
            .skip(offset)
            .take(batch_size)
            .map(|row| self.to_record(row))
            .collect();

        let next_offset = offset + records.len();
        let next_cursor = (next_offset < self.rows.len()).then_some(Cursor::Offset {
            offset: next_offset,
        });
        Ok(FetchResult {
            records,
            next_cursor,
            took_ms: start.elapsed().as_millis(),
        })
    }

    /// Every row, in file order.
    pub fn read_all(&self) -> Result<Vec<Record>, FileError> {
        let mut records = Vec::with_capacity(self.rows.len());
        let mut cursor = Cursor::None;
        loop {
            let page = self.fetch(1000, &cursor)?;
            let done = page.reached_end();
            let next = page.next_cursor.clone();
            records.extend(page.records);
            match next {
                Some(next) if !done => cursor = next,
                _ => break,
            }
        }
        Ok(records)
    }

    fn to_record(&self, row: &StringRecord) -> Record {
        let mut record = Record::new();
        for col in &self.meta.columns {
            let cell = row.get(col.ordinal).unwrap_or("");
            record.insert(col.name.clone(), col.data_type.get_value(cell));
        }
        record
    }
}
