use crate::emit;
use crate::error::{PipelineError, Result, Stage};
use crate::structs::{Dataset, Value};
use log::{Level, Log};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z']+").expect("word pattern is valid"));

/// A single derivation applied to a dataset. Steps run in the order listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformStep {
    /// Per column: number of integer cells, their sum and mean (2 decimals).
    /// Produces `[label, count, total, mean]`.
    ColumnTotals {
        label: String,
        /// Columns to skip, matched case-insensitively
        #[serde(default)]
        exclude: Vec<String>,
        #[serde(default)]
        names: TotalsNames,
        /// Count only integers >= 0
        #[serde(default)]
        non_negative: bool,
    },
    /// Occurrences of each distinct value, in first-seen order.
    CountBy { column: String },
    /// Most common lowercase words across text cells. Empty `columns` means all.
    WordFrequency {
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default = "default_min_len")]
        min_len: usize,
        #[serde(default = "default_top")]
        top: usize,
    },
    /// Character and word counts over all text cells.
    TextMetrics,
    /// Single row holding the number of input rows under `label`.
    RowCount { label: String },
    Sort {
        column: String,
        #[serde(default)]
        descending: bool,
    },
    Select { columns: Vec<String> },
}

/// Output column names of `column_totals` after the label column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalsNames {
    pub count: String,
    pub total: String,
    pub mean: String,
}

impl Default for TotalsNames {
    fn default() -> Self {
        Self {
            count: "count".to_string(),
            total: "total".to_string(),
            mean: "mean".to_string(),
        }
    }
}

fn default_min_len() -> usize {
    1
}

fn default_top() -> usize {
    20
}

impl TransformStep {
    pub fn name(&self) -> &'static str {
        match self {
            TransformStep::ColumnTotals { .. } => "column_totals",
            TransformStep::CountBy { .. } => "count_by",
            TransformStep::WordFrequency { .. } => "word_frequency",
            TransformStep::TextMetrics => "text_metrics",
            TransformStep::RowCount { .. } => "row_count",
            TransformStep::Sort { .. } => "sort",
            TransformStep::Select { .. } => "select",
        }
    }

    /// # Errors
    /// Returns `PipelineError::Transform` if the step names a column the dataset lacks.
    pub fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        match self {
            TransformStep::ColumnTotals {
                label,
                exclude,
                names,
                non_negative,
            } => column_totals(dataset, label, exclude, names, *non_negative),
            TransformStep::CountBy { column } => count_by(dataset, column),
            TransformStep::WordFrequency {
                columns,
                min_len,
                top,
            } => word_frequency(dataset, columns, *min_len, *top),
            TransformStep::TextMetrics => text_metrics(dataset),
            TransformStep::RowCount { label } => row_count(dataset, label),
            TransformStep::Sort { column, descending } => sort_by(dataset, column, *descending),
            TransformStep::Select { columns } => select(dataset, columns),
        }
    }
}

/// Runs `steps` in order, starting from a copy of `dataset`.
pub fn apply_steps(dataset: &Dataset, steps: &[TransformStep], logger: &dyn Log) -> Result<Dataset> {
    let mut current = dataset.clone();
    for step in steps {
        current = step.apply(&current).inspect_err(|e| {
            emit!(logger, Level::Error, Stage::Transform, "{} failed: {}", step.name(), e);
        })?;
        emit!(
            logger,
            Level::Debug,
            Stage::Transform,
            "{} -> {} rows x {} columns",
            step.name(),
            current.len(),
            current.columns().len()
        );
    }
    Ok(current)
}

/// Lowercased `[a-zA-Z']+` tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

fn require_column(dataset: &Dataset, column: &str) -> Result<usize> {
    dataset
        .column_index(column)
        .ok_or_else(|| PipelineError::Transform(format!("Column not found: {}", column)))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn column_totals(
    dataset: &Dataset,
    label: &str,
    exclude: &[String],
    names: &TotalsNames,
    non_negative: bool,
) -> Result<Dataset> {
    let mut out = Dataset::new(vec![
        label.to_string(),
        names.count.clone(),
        names.total.clone(),
        names.mean.clone(),
    ]);

    for (idx, column) in dataset.columns().iter().enumerate() {
        if exclude.iter().any(|e| e.eq_ignore_ascii_case(column)) {
            continue;
        }
        let values: Vec<i64> = dataset
            .rows()
            .iter()
            .filter_map(|row| match row[idx] {
                Value::Int(i) if !non_negative || i >= 0 => Some(i),
                _ => None,
            })
            .collect();
        // columns without a single integer are not summarised
        if values.is_empty() {
            continue;
        }
        let total = values
            .iter()
            .try_fold(0i64, |acc, &v| acc.checked_add(v))
            .ok_or_else(|| {
                PipelineError::Transform(format!("Total of column {} overflows i64", column))
            })?;
        let mean = round2(total as f64 / values.len() as f64);
        out.push_row(vec![
            Value::Text(column.clone()),
            Value::Int(values.len() as i64),
            Value::Int(total),
            Value::Float(mean),
        ])?;
    }
    Ok(out)
}

fn row_count(dataset: &Dataset, label: &str) -> Result<Dataset> {
    let mut out = Dataset::new(vec![label.to_string()]);
    out.push_row(vec![Value::Int(dataset.len() as i64)])?;
    Ok(out)
}

/// Counts keyed by value, preserving first-seen order.
struct Tally<K> {
    order: Vec<(K, i64)>,
    index: HashMap<String, usize>,
}

impl<K> Tally<K> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, key: String, item: K) {
        match self.index.get(&key) {
            Some(&i) => self.order[i].1 += 1,
            None => {
                self.index.insert(key, self.order.len());
                self.order.push((item, 1));
            }
        }
    }

    /// Count descending; ties keep first-seen order.
    fn most_common(mut self, top: usize) -> Vec<(K, i64)> {
        self.order.sort_by(|a, b| b.1.cmp(&a.1));
        self.order.truncate(top);
        self.order
    }
}

fn count_by(dataset: &Dataset, column: &str) -> Result<Dataset> {
    let idx = require_column(dataset, column)?;
    let mut tally = Tally::new();
    for row in dataset.rows() {
        let value = &row[idx];
        tally.add(format!("{:?}", value), value.clone());
    }

    let mut out = Dataset::new(vec![column.to_string(), "count".to_string()]);
    for (value, count) in tally.order {
        out.push_row(vec![value, Value::Int(count)])?;
    }
    Ok(out)
}

fn text_cells<'a>(dataset: &'a Dataset, indices: &'a [usize]) -> impl Iterator<Item = &'a str> {
    dataset
        .rows()
        .iter()
        .flat_map(move |row| indices.iter().filter_map(move |&i| row[i].as_text()))
}

fn resolve_columns(dataset: &Dataset, columns: &[String]) -> Result<Vec<usize>> {
    if columns.is_empty() {
        return Ok((0..dataset.columns().len()).collect());
    }
    columns
        .iter()
        .map(|c| require_column(dataset, c))
        .collect()
}

fn word_frequency(dataset: &Dataset, columns: &[String], min_len: usize, top: usize) -> Result<Dataset> {
    let indices = resolve_columns(dataset, columns)?;
    let mut tally = Tally::new();
    for cell in text_cells(dataset, &indices) {
        for word in tokenize(cell) {
            if word.chars().count() >= min_len {
                tally.add(word.clone(), word);
            }
        }
    }

    let mut out = Dataset::new(vec!["word".to_string(), "count".to_string()]);
    for (word, count) in tally.most_common(top) {
        out.push_row(vec![Value::Text(word), Value::Int(count)])?;
    }
    Ok(out)
}

fn text_metrics(dataset: &Dataset) -> Result<Dataset> {
    let indices: Vec<usize> = (0..dataset.columns().len()).collect();
    let text = text_cells(dataset, &indices).collect::<Vec<_>>().join("\n");

    let mut out = Dataset::new(vec!["metric".to_string(), "value".to_string()]);
    out.push_row(vec![
        "characters".into(),
        Value::Int(text.chars().count() as i64),
    ])?;
    out.push_row(vec![
        "word_count".into(),
        Value::Int(tokenize(&text).len() as i64),
    ])?;
    Ok(out)
}

fn sort_by(dataset: &Dataset, column: &str, descending: bool) -> Result<Dataset> {
    let idx = require_column(dataset, column)?;
    let columns = dataset.columns().to_vec();
    let mut rows = dataset.clone().into_rows();
    rows.sort_by(|a, b| {
        let ord = a[idx].sort_cmp(&b[idx]);
        if descending { ord.reverse() } else { ord }
    });

    let mut out = Dataset::new(columns);
    for row in rows {
        out.push_row(row)?;
    }
    Ok(out)
}

fn select(dataset: &Dataset, columns: &[String]) -> Result<Dataset> {
    let indices = columns
        .iter()
        .map(|c| require_column(dataset, c))
        .collect::<Result<Vec<_>>>()?;

    let mut out = Dataset::new(columns.to_vec());
    for row in dataset.rows() {
        out.push_row(indices.iter().map(|&i| row[i].clone()).collect())?;
    }
    Ok(out)
}
