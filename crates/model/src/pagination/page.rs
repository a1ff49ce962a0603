use crate::{pagination::cursor::Cursor, records::record::Record};

/// One page returned by a source.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub records: Vec<Record>,
    /// Where the next request starts; `None` once the source is exhausted.
    pub next_cursor: Option<Cursor>,
    pub took_ms: u128,
}

impl FetchResult {
    pub fn reached_end(&self) -> bool {
        self.records.is_empty() || self.next_cursor.is_none()
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }
}
