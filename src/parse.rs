use crate::error::{PipelineError, Result};
use crate::structs::{Dataset, SourceFormat, Value};
use csv::{ReaderBuilder, Trim};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// Parses fetched bytes into a `Dataset` according to the expected source format.
///
/// Bytes are decoded as UTF-8, replacing invalid sequences.
///
/// # Errors
/// Returns `PipelineError::Parse` if the content is structurally malformed.
pub fn parse(content: &[u8], format: SourceFormat) -> Result<Dataset> {
    let text = String::from_utf8_lossy(content);
    match format {
        SourceFormat::Csv => parse_csv(&text),
        SourceFormat::Json => parse_json(&text),
        SourceFormat::Text => parse_text(&text),
    }
}

/// First record is the header. Cells are trimmed, stray quotes stripped and
/// values coerced. Short rows are padded with nulls, long rows are rejected.
pub fn parse_csv(text: &str) -> Result<Dataset> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::parse(SourceFormat::Csv, e))?
        .clone();
    if headers.is_empty() || headers.iter().all(|h| clean_cell(h).is_empty()) {
        return Err(PipelineError::parse(SourceFormat::Csv, "no header row"));
    }

    let columns = unique_columns(headers.iter().map(clean_cell));
    let mut dataset = Dataset::new(columns);

    for record in reader.records() {
        let record = record.map_err(|e| PipelineError::parse(SourceFormat::Csv, e))?;
        if record.iter().all(|cell| clean_cell(cell).is_empty()) {
            continue;
        }
        if record.len() > headers.len() {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            return Err(PipelineError::parse(
                SourceFormat::Csv,
                format!(
                    "line {}: {} fields but header has {}",
                    line,
                    record.len(),
                    headers.len()
                ),
            ));
        }
        let row = record.iter().map(|cell| coerce(clean_cell(cell))).collect();
        dataset.push_row(row)?;
    }

    Ok(dataset)
}

/// Accepts an array of objects or a single object. Columns appear in order of
/// first appearance; missing keys become null and nested values compact JSON text.
pub fn parse_json(text: &str) -> Result<Dataset> {
    let parsed: JsonValue =
        serde_json::from_str(text).map_err(|e| PipelineError::parse(SourceFormat::Json, e))?;

    let objects = match parsed {
        JsonValue::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                JsonValue::Object(map) => Ok(map),
                other => Err(PipelineError::parse(
                    SourceFormat::Json,
                    format!("element {} is {}, expected an object", i, json_kind(&other)),
                )),
            })
            .collect::<Result<Vec<_>>>()?,
        JsonValue::Object(map) => vec![map],
        other => {
            return Err(PipelineError::parse(
                SourceFormat::Json,
                format!(
                    "top-level {} is not an array of objects",
                    json_kind(&other)
                ),
            ));
        }
    };

    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for object in &objects {
        for key in object.keys() {
            if !index.contains_key(key) {
                index.insert(key.clone(), columns.len());
                columns.push(key.clone());
            }
        }
    }

    let width = columns.len();
    let mut dataset = Dataset::new(columns);
    for object in objects {
        let mut row = vec![Value::Null; width];
        for (key, value) in object {
            row[index[&key]] = from_json(value);
        }
        dataset.push_row(row)?;
    }

    Ok(dataset)
}

/// One `line` column, one row per input line. Lines are kept verbatim.
pub fn parse_text(text: &str) -> Result<Dataset> {
    let mut dataset = Dataset::new(vec!["line".to_string()]);
    for line in text.lines() {
        dataset.push_row(vec![Value::Text(line.to_string())])?;
    }
    Ok(dataset)
}

/// Converts a raw text cell to the narrowest scalar that represents it exactly.
pub fn coerce(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        // keep "007" or "+5" as text
        if i.to_string() == raw {
            return Value::Int(i);
        }
        return Value::Text(raw.to_string());
    }
    if looks_numeric(raw) {
        if let Ok(x) = raw.parse::<f64>() {
            if x.is_finite() {
                return Value::Float(x);
            }
        }
    }
    Value::Text(raw.to_string())
}

fn looks_numeric(raw: &str) -> bool {
    raw.bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
        && raw.bytes().any(|b| b.is_ascii_digit())
}

fn clean_cell(cell: &str) -> &str {
    let cell = cell.trim();
    if cell.len() >= 2 && cell.starts_with('"') && cell.ends_with('"') {
        cell[1..cell.len() - 1].trim()
    } else {
        cell
    }
}

/// Blank names become `column_N`; a repeated name gets the first free `_2`, `_3`, ...
/// suffix, checked against every name already taken, generated ones included.
fn unique_columns<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut columns = Vec::new();
    for (i, name) in names.enumerate() {
        let base = if name.is_empty() {
            format!("column_{}", i + 1)
        } else {
            name.to_string()
        };
        let mut candidate = base.clone();
        let mut suffix = 2;
        while taken.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        taken.insert(candidate.clone());
        columns.push(candidate);
    }
    columns
}

fn from_json(value: JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        JsonValue::String(s) => Value::Text(s),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => Value::Text(nested.to_string()),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
