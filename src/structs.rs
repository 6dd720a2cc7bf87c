use crate::error::{PipelineError, Result};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Scalar cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }

    /// Total order used for sorting: nulls, booleans, numbers, then text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            // Debug keeps the trailing ".0" so floats read back as floats
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// In-memory table: ordered columns and rows of scalar values in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Appends a row, padding a short row with nulls.
    ///
    /// # Errors
    /// Returns `PipelineError::Data` if the row has more values than there are columns.
    pub fn push_row(&mut self, mut row: Vec<Value>) -> Result<()> {
        if row.len() > self.columns.len() {
            return Err(PipelineError::Data(format!(
                "row has {} values but dataset has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
        Ok(())
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Iterates rows as records that pair each value with its column name.
    pub fn records(&self) -> impl Iterator<Item = RecordRef<'_>> {
        self.rows.iter().map(|values| RecordRef {
            columns: &self.columns,
            values,
        })
    }

    pub(crate) fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }
}

/// Borrowed view of one row, serialized as a JSON object in column order.
#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RecordRef<'a> {
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for RecordRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for record in self.records() {
            seq.serialize_element(&record)?;
        }
        seq.end()
    }
}

/// Format of fetched content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Json,
    Text,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Json => "json",
            SourceFormat::Text => "text",
        })
    }
}

/// Format of a written output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Excel,
    Json,
    Text,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Csv => "CSV",
            OutputFormat::Excel => "Excel",
            OutputFormat::Json => "JSON",
            OutputFormat::Text => "Text",
        })
    }
}

/// A single (format, destination) pair to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub format: OutputFormat,
    pub path: PathBuf,
    /// Excel sheet name or text report heading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl OutputTarget {
    pub fn new(format: OutputFormat, path: impl Into<PathBuf>) -> Self {
        Self {
            format,
            path: path.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Destination path, with relative paths resolved against `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            base_dir.join(&self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut ds = Dataset::new(vec!["name".into(), "score".into()]);
        ds.push_row(vec!["ada".into(), Value::Int(3)]).unwrap();
        ds.push_row(vec!["bob".into()]).unwrap();
        ds
    }

    #[test]
    fn push_row_pads_short_rows() {
        let ds = sample();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1, "score"), Some(&Value::Null));
        assert_eq!(ds.get(0, "name"), Some(&Value::Text("ada".into())));
        assert_eq!(ds.get(0, "missing"), None);
    }

    #[test]
    fn push_row_rejects_long_rows() {
        let mut ds = Dataset::new(vec!["a".into()]);
        let err = ds.push_row(vec![Value::Int(1), Value::Int(2)]).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
        assert!(ds.is_empty());
    }

    #[test]
    fn floats_display_with_decimal_point() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(369.33).to_string(), "369.33");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }

    #[test]
    fn serializes_records_in_column_order() {
        let mut ds = Dataset::new(vec!["z".into(), "a".into()]);
        ds.push_row(vec![Value::Int(1), Value::Float(0.5)]).unwrap();
        let json = serde_json::to_string(&ds).unwrap();
        assert_eq!(json, r#"[{"z":1,"a":0.5}]"#);

        let ds = sample();
        let json = serde_json::to_string(&ds).unwrap();
        assert_eq!(
            json,
            r#"[{"name":"ada","score":3},{"name":"bob","score":null}]"#
        );
    }

    #[test]
    fn sort_cmp_orders_mixed_values() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Float(2.5),
            Value::Null,
            Value::Int(3),
            Value::Int(1),
            Value::Bool(false),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(false),
                Value::Int(1),
                Value::Float(2.5),
                Value::Int(3),
                Value::Text("b".into()),
            ]
        );
    }

    #[test]
    fn output_target_resolves_relative_paths() {
        let target = OutputTarget::new(OutputFormat::Csv, "out.csv");
        assert_eq!(
            target.resolve(Path::new("data/processed")),
            PathBuf::from("data/processed/out.csv")
        );
        let abs = OutputTarget::new(OutputFormat::Json, "/tmp/out.json");
        assert_eq!(abs.resolve(Path::new("data")), PathBuf::from("/tmp/out.json"));
    }
}
