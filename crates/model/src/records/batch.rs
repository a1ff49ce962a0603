use crate::records::record::Record;
use chrono::{DateTime, Utc};

/// Records bound for one destination table (or one worksheet of a report).
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub table: String,
    pub records: Vec<Record>,
    /// Run timestamp stamped into every row as `_extracted_at`.
    pub extracted_at: DateTime<Utc>,
}

impl RecordBatch {
    pub fn new(table: impl Into<String>, records: Vec<Record>, extracted_at: DateTime<Utc>) -> Self {
        RecordBatch {
            table: table.into(),
            records,
            extracted_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Column names in first-seen order across all records.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    /// Adds the `_extracted_at` / `_extracted_uuid` bookkeeping columns.
    /// Rows read back from the sink keep the stamp they were loaded with.
    pub fn with_extraction_columns(mut self) -> Self {
        let extracted_at = self.extracted_at.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        for record in &mut self.records {
            if record.contains("_extracted_at") {
                continue;
            }
            record.insert("_extracted_at", extracted_at.clone());
            record.insert("_extracted_uuid", uuid::Uuid::new_v4().to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> Record {
        Record::from_value(v).unwrap()
    }

    #[test]
    fn test_columns_keep_first_seen_order() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let batch = RecordBatch::new(
            "t",
            vec![rec(json!({"a": 1})), rec(json!({"c": 3, "a": 4})), rec(json!({"b": 2}))],
            ts,
        );
        assert_eq!(batch.columns(), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_extraction_columns_are_unique_per_row() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let batch = RecordBatch::new("t", vec![rec(json!({"x": 1})), rec(json!({"x": 2}))], ts)
            .with_extraction_columns();

        let first = &batch.records[0];
        let second = &batch.records[1];
        assert_eq!(first.get_str("_extracted_at"), Some("2024-06-10T12:00:00Z"));
        assert_ne!(
            first.get_str("_extracted_uuid"),
            second.get_str("_extracted_uuid")
        );
    }
}
