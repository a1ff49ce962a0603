use csv::StringRecord;
use serde::Serialize;
use serde_json::Value;

/// Type a CSV column is read as, inferred from every cell in the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellType {
    Integer,
    Float,
    Boolean,
    String,
}

impl CellType {
    /// Narrowest type every non-empty cell parses as.
    pub fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> CellType {
        let mut int = true;
        let mut float = true;
        let mut boolean = true;
        let mut any = false;
        for cell in cells.map(str::trim).filter(|c| !c.is_empty()) {
            any = true;
            int &= cell.parse::<i64>().is_ok();
            float &= cell.parse::<f64>().is_ok();
            boolean &= cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false");
        }
        match (any, int, float, boolean) {
            (false, ..) => CellType::String,
            (_, true, ..) => CellType::Integer,
            (_, _, true, _) => CellType::Float,
            (_, _, _, true) => CellType::Boolean,
            _ => CellType::String,
        }
    }

    /// Empty cells read as null.
    pub fn get_value(&self, cell: &str) -> Value {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match self {
            CellType::Integer => trimmed.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            CellType::Float => trimmed.parse::<f64>().map(Value::from).unwrap_or(Value::Null),
            CellType::Boolean => Value::Bool(trimmed.eq_ignore_ascii_case("true")),
            CellType::String => Value::String(cell.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CsvColumnMetadata {
    pub name: String,
    pub data_type: CellType,
    pub ordinal: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CsvMetadata {
    pub name: String,
    pub columns: Vec<CsvColumnMetadata>,
    pub delimiter: char,
    pub has_header: bool,
}

impl CsvMetadata {
    /// Builds column metadata from the header row and all data rows.
    /// Columns listed in `string_columns` (by normalized name) are never
    /// inferred, so identifiers with leading zeros survive.
    pub fn infer(
        name: &str,
        headers: &StringRecord,
        rows: &[StringRecord],
        delimiter: char,
        string_columns: &[&str],
    ) -> CsvMetadata {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(ordinal, header)| {
                let name = normalize_col_name(header);
                let data_type = if string_columns.iter().any(|c| normalize_col_name(c) == name) {
                    CellType::String
                } else {
                    CellType::infer(rows.iter().map(|r| r.get(ordinal).unwrap_or("")))
                };
                CsvColumnMetadata {
                    name,
                    data_type,
                    ordinal,
                }
            })
            .collect();

        CsvMetadata {
            name: name.to_string(),
            columns,
            delimiter,
            has_header: true,
        }
    }
}

pub fn normalize_col_name(name: &str) -> String {
    name.trim()
        .replace([' ', '-', '.', '(', ')', ','], "_")
        .to_lowercase()
}
