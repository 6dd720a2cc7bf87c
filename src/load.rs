use crate::emit;
use crate::error::{PipelineError, Result, Stage};
use crate::structs::{Dataset, OutputFormat, OutputTarget, Value};
use chrono::Local;
use csv::Writer;
use log::{Level, Log};
use rust_xlsxwriter::{Format, Workbook};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const DEFAULT_SHEET_NAME: &str = "Sheet1";
const EXCEL_MAX_ROWS: usize = 1_048_576;
const EXCEL_MAX_COLS: usize = 16_384;

/// Writes a dataset to CSV with a header row.
///
/// Nulls become empty cells; floats keep their decimal point.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_csv(dataset: &Dataset, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(dataset.columns())?;
    for row in dataset.rows() {
        writer.write_record(row.iter().map(Value::to_string))?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes a dataset to a pretty-formatted JSON array of objects.
///
/// # Errors
/// Returns error if file cannot be created or serialization fails.
pub fn write_json(dataset: &Dataset, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, dataset)?;
    writer.flush()?;
    Ok(())
}

/// Writes a dataset to a single-sheet Excel workbook with a bold header row.
///
/// # Errors
/// Returns error if the dataset exceeds sheet limits or the workbook cannot be saved.
pub fn write_excel(dataset: &Dataset, output_path: &Path, sheet_name: Option<&str>) -> Result<()> {
    if dataset.len() + 1 > EXCEL_MAX_ROWS || dataset.columns().len() > EXCEL_MAX_COLS {
        return Err(PipelineError::Data(format!(
            "{} rows x {} columns exceeds worksheet limits",
            dataset.len(),
            dataset.columns().len()
        )));
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sanitize_sheet_name(sheet_name.unwrap_or(DEFAULT_SHEET_NAME)))?;

    let header = Format::new().set_bold();
    for (col, name) in dataset.columns().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header)?;
    }

    for (r, row) in dataset.rows().iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let c = c as u16;
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    worksheet.write_boolean(r, c, *b)?;
                }
                Value::Int(i) => {
                    worksheet.write_number(r, c, *i as f64)?;
                }
                Value::Float(x) => {
                    worksheet.write_number(r, c, *x)?;
                }
                Value::Text(s) => {
                    worksheet.write_string(r, c, s)?;
                }
            }
        }
    }

    workbook.save(output_path)?;
    Ok(())
}

/// Writes a dataset as tab-separated lines, optionally under a heading block.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_text(dataset: &Dataset, output_path: &Path, title: Option<&str>) -> Result<()> {
    let file = File::create(output_path)?;
    let mut out = BufWriter::new(file);

    if let Some(title) = title {
        writeln!(out, "{}", title)?;
        writeln!(
            out,
            "Generated: {}",
            Local::now().format("%Y-%m-%dT%H:%M:%S")
        )?;
        writeln!(out, "{}", "-".repeat(60))?;
    }

    writeln!(out, "{}", dataset.columns().join("\t"))?;
    for row in dataset.rows() {
        let line = row
            .iter()
            .map(|v| flatten_cell(&v.to_string()))
            .collect::<Vec<_>>()
            .join("\t");
        writeln!(out, "{}", line)?;
    }

    out.flush()?;
    Ok(())
}

/// Writes one target, creating its parent directory. Returns the path written.
pub fn write_target(dataset: &Dataset, target: &OutputTarget, base_dir: &Path) -> Result<PathBuf> {
    let path = target.resolve(base_dir);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    match target.format {
        OutputFormat::Csv => write_csv(dataset, &path)?,
        OutputFormat::Excel => write_excel(dataset, &path, target.title.as_deref())?,
        OutputFormat::Json => write_json(dataset, &path)?,
        OutputFormat::Text => write_text(dataset, &path, target.title.as_deref())?,
    }
    Ok(path)
}

/// Outcome of writing one dataset to several targets.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, PipelineError)>,
}

impl WriteReport {
    pub fn attempted(&self) -> usize {
        self.written.len() + self.failed.len()
    }

    /// # Errors
    /// Returns `PipelineError::TargetsFailed` if any target failed.
    pub fn into_result(self) -> Result<Vec<PathBuf>> {
        if self.failed.is_empty() {
            Ok(self.written)
        } else {
            Err(PipelineError::TargetsFailed {
                failed: self.failed.len(),
                total: self.attempted(),
            })
        }
    }

    pub fn merge(&mut self, other: WriteReport) {
        self.written.extend(other.written);
        self.failed.extend(other.failed);
    }
}

/// Writes every target in turn. A failed target is logged and the rest are
/// still attempted.
pub fn write_all(
    dataset: &Dataset,
    targets: &[OutputTarget],
    base_dir: &Path,
    logger: &dyn Log,
) -> WriteReport {
    let mut report = WriteReport::default();
    for target in targets {
        match write_target(dataset, target, base_dir) {
            Ok(path) => {
                emit!(
                    logger,
                    Level::Info,
                    Stage::Write,
                    "Wrote {}: {}",
                    target.format,
                    path.display()
                );
                report.written.push(path);
            }
            Err(e) => {
                let path = target.resolve(base_dir);
                emit!(
                    logger,
                    Level::Error,
                    Stage::Write,
                    "Failed to write {} {}: {}",
                    target.format,
                    path.display(),
                    e
                );
                report.failed.push((path, e));
            }
        }
    }
    report
}

/// Excel sheet names: at most 31 chars, none of `[]:*?/\`, not blank.
fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .take(31)
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim().to_string();
    if cleaned.is_empty() {
        DEFAULT_SHEET_NAME.to_string()
    } else {
        cleaned
    }
}

fn flatten_cell(cell: &str) -> String {
    cell.replace(['\t', '\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryLogger;
    use crate::parse::{parse_csv, parse_json};
    use tempfile::TempDir;

    fn people() -> Dataset {
        let mut ds = Dataset::new(vec!["name".into(), "age".into()]);
        ds.push_row(vec!["Alice".into(), Value::Int(30)]).unwrap();
        ds.push_row(vec!["Bob".into(), Value::Int(25)]).unwrap();
        ds.push_row(vec!["Carol, Jr.".into(), Value::Int(41)]).unwrap();
        ds
    }

    fn mixed() -> Dataset {
        let mut ds = Dataset::new(vec![
            "id".into(),
            "ratio".into(),
            "active".into(),
            "note".into(),
        ]);
        ds.push_row(vec![
            Value::Int(1),
            Value::Float(2.0),
            Value::Bool(true),
            Value::Null,
        ])
        .unwrap();
        ds.push_row(vec![
            Value::Int(-4),
            Value::Float(0.125),
            Value::Bool(false),
            "quote \"here\"".into(),
        ])
        .unwrap();
        ds
    }

    #[test]
    fn csv_has_header_plus_one_line_per_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("people.csv");
        write_csv(&people(), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "name,age");
        assert_eq!(lines[3], "\"Carol, Jr.\",41");
    }

    #[test]
    fn csv_round_trip_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.csv");
        let original = mixed();
        write_csv(&original, &path).unwrap();

        let reparsed = parse_csv(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn json_round_trip_is_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.json");
        let original = mixed();
        write_json(&original, &path).unwrap();

        let reparsed = parse_json(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reparsed, original);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["ratio"], serde_json::json!(2.0));
        assert!(raw[0]["note"].is_null());
    }

    #[test]
    fn text_writes_heading_and_tab_separated_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        let mut ds = Dataset::new(vec!["word".into(), "count".into()]);
        ds.push_row(vec!["multi\nline".into(), Value::Int(2)]).unwrap();
        write_text(&ds, &path, Some("Text Report for: sample")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Text Report for: sample");
        assert!(lines[1].starts_with("Generated: "));
        assert_eq!(lines[2], "-".repeat(60));
        assert_eq!(lines[3], "word\tcount");
        assert_eq!(lines[4], "multi line\t2");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn text_without_title_is_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("people.txt");
        write_text(&people(), &path, None).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "name\tage\nAlice\t30\nBob\t25\nCarol, Jr.\t41\n");
    }

    #[test]
    fn excel_writes_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.xlsx");
        write_excel(&mixed(), &path, Some("Mixed: [values]")).unwrap();

        let bytes = fs::read(&path).unwrap();
        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn sheet_names_follow_excel_rules() {
        assert_eq!(sanitize_sheet_name("AirTravel Summary"), "AirTravel Summary");
        assert_eq!(sanitize_sheet_name("a/b:c?"), "a_b_c_");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), 31);
        assert_eq!(sanitize_sheet_name("  "), DEFAULT_SHEET_NAME);
    }

    #[test]
    fn write_all_is_best_effort() {
        let dir = TempDir::new().unwrap();
        // a regular file where a directory is expected makes this target unwritable
        fs::write(dir.path().join("blocked"), "not a directory").unwrap();
        let targets = vec![
            OutputTarget::new(OutputFormat::Csv, "ok/people.csv"),
            OutputTarget::new(OutputFormat::Json, "blocked/people.json"),
            OutputTarget::new(OutputFormat::Text, "ok/people.txt"),
        ];
        let logger = MemoryLogger::new();

        let report = write_all(&people(), &targets, dir.path(), &logger);

        assert_eq!(report.attempted(), 3);
        assert_eq!(report.written.len(), 2);
        assert!(dir.path().join("ok/people.csv").exists());
        assert!(dir.path().join("ok/people.txt").exists());
        assert_eq!(report.failed[0].0, dir.path().join("blocked/people.json"));
        assert!(logger.contains(Level::Info, "Wrote CSV"));
        assert!(logger.contains(Level::Error, "Failed to write JSON"));

        let err = report.into_result().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TargetsFailed {
                failed: 1,
                total: 3
            }
        ));
    }
}
