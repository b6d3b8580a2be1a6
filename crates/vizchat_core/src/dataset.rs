use csv::ReaderBuilder;
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::sync::Arc;

/// Rows shown to the model when generating or critiquing a chart. Prompts
/// embed only this sample; the full dataset is injected into the final spec.
pub const SAMPLE_ROWS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV has no header row")]
    MissingHeader,
}

/// The active tabular dataset: a fixed ordered set of column names and an
/// ordered sequence of rows mapping column name to scalar value.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl Dataset {
    /// Parse a delimited tabular file. The first record is the header; every
    /// following record must have the same width (ragged rows are an error).
    pub fn from_csv(bytes: &[u8]) -> Result<Self, IngestError> {
        let mut reader = ReaderBuilder::new().from_reader(bytes);
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_matches('"').to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(IngestError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row = Map::new();
            for (name, cell) in columns.iter().zip(record.iter()) {
                row.insert(name.clone(), coerce_cell(cell));
            }
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sample(&self) -> &[Map<String, Value>] {
        &self.rows[..self.rows.len().min(SAMPLE_ROWS)]
    }

    /// Render the sample as a markdown table for prompt embedding.
    pub fn sample_table(&self) -> String {
        let mut out = String::new();
        out.push_str("| ");
        out.push_str(&self.columns.join(" | "));
        out.push_str(" |\n| ");
        out.push_str(&vec!["---"; self.columns.len()].join(" | "));
        out.push_str(" |\n");
        for row in self.sample() {
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|c| display_cell(row.get(c).unwrap_or(&Value::Null)))
                .collect();
            out.push_str("| ");
            out.push_str(&cells.join(" | "));
            out.push_str(" |\n");
        }
        out
    }

    /// Every row as a JSON object, in upload order.
    pub fn values(&self) -> Vec<Value> {
        self.rows.iter().cloned().map(Value::Object).collect()
    }
}

fn coerce_cell(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(trimmed.to_string())
}

fn display_cell(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Process-wide dataset store. Each upload swaps in a fresh immutable
/// snapshot; readers clone the `Arc` at entry and keep that view for the
/// whole request even if an upload lands mid-flight.
#[derive(Default)]
pub struct DatasetStore {
    current: RwLock<Option<Arc<Dataset>>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored dataset wholesale, discarding the previous one.
    pub fn replace(&self, dataset: Dataset) -> Arc<Dataset> {
        let dataset = Arc::new(dataset);
        *self.current.write() = Some(Arc::clone(&dataset));
        dataset
    }

    pub fn snapshot(&self) -> Option<Arc<Dataset>> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CSV: &str = "name,age,score\nalice,30,91.5\nbob,25,88\n";

    #[test]
    fn parses_csv_with_coerced_cells() {
        let ds = Dataset::from_csv(CSV.as_bytes()).unwrap();
        assert_eq!(ds.columns, vec!["name", "age", "score"]);
        assert_eq!(ds.rows.len(), 2);
        assert_eq!(ds.rows[0]["name"], json!("alice"));
        assert_eq!(ds.rows[0]["age"], json!(30));
        assert_eq!(ds.rows[0]["score"], json!(91.5));
    }

    #[test]
    fn coerces_bools_and_blanks() {
        let ds = Dataset::from_csv("flag,note\nTRUE,\nfalse,hello\n".as_bytes()).unwrap();
        assert_eq!(ds.rows[0]["flag"], json!(true));
        assert_eq!(ds.rows[0]["note"], Value::Null);
        assert_eq!(ds.rows[1]["flag"], json!(false));
        assert_eq!(ds.rows[1]["note"], json!("hello"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Dataset::from_csv("a,b\n1,2\n3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::Csv(_)));
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = Dataset::from_csv(b"").unwrap_err();
        assert!(matches!(err, IngestError::MissingHeader));
    }

    #[test]
    fn header_only_csv_is_an_empty_dataset() {
        let ds = Dataset::from_csv("a,b,c\n".as_bytes()).unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.columns.len(), 3);
    }

    #[test]
    fn sample_is_bounded_at_five_rows() {
        let mut csv = String::from("n\n");
        for i in 0..10 {
            csv.push_str(&format!("{i}\n"));
        }
        let ds = Dataset::from_csv(csv.as_bytes()).unwrap();
        assert_eq!(ds.rows.len(), 10);
        assert_eq!(ds.sample().len(), SAMPLE_ROWS);
        assert_eq!(ds.values().len(), 10);
    }

    #[test]
    fn sample_table_renders_markdown() {
        let ds = Dataset::from_csv(CSV.as_bytes()).unwrap();
        let table = ds.sample_table();
        assert!(table.starts_with("| name | age | score |"));
        assert!(table.contains("| alice | 30 | 91.5 |"));
    }

    #[test]
    fn replace_swaps_the_stored_dataset_wholesale() {
        let store = DatasetStore::new();
        assert!(store.snapshot().is_none());

        store.replace(Dataset::from_csv("a,b\n1,2\n".as_bytes()).unwrap());
        store.replace(Dataset::from_csv("x,y,z\n1,2,3\n".as_bytes()).unwrap());
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.columns, vec!["x", "y", "z"]);
    }

    #[test]
    fn snapshots_survive_a_concurrent_replace() {
        let store = DatasetStore::new();
        store.replace(Dataset::from_csv("a\n1\n2\n".as_bytes()).unwrap());
        let held = store.snapshot().unwrap();

        store.replace(Dataset::from_csv("b\n9\n".as_bytes()).unwrap());
        assert_eq!(held.columns, vec!["a"]);
        assert_eq!(held.rows.len(), 2);
        assert_eq!(store.snapshot().unwrap().columns, vec!["b"]);
    }
}
