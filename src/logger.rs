use crate::config::LogConfig;
use crate::error::Result;
use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Logs a formatted message through an explicit `&dyn Log`, tagged with a pipeline stage.
///
/// ```ignore
/// emit!(logger, Level::Info, Stage::Fetch, "Fetching: {}", url);
/// ```
#[macro_export]
macro_rules! emit {
    ($logger:expr, $level:expr, $stage:expr, $($arg:tt)+) => {
        ::log::Log::log(
            $logger,
            &::log::Record::builder()
                .level($level)
                .target($stage.as_str())
                .args(format_args!($($arg)+))
                .build(),
        )
    };
}

/// Logging context: console (stderr) and/or size-rotated file.
pub struct PipelineLogger {
    level: LevelFilter,
    console: bool,
    file: Option<Mutex<RotatingFile>>,
}

impl PipelineLogger {
    /// Builds the logger from config, creating the log directory if needed.
    ///
    /// # Errors
    /// Returns error if the log file cannot be opened.
    pub fn new(config: &LogConfig) -> Result<Self> {
        let file = match &config.file {
            Some(path) => Some(Mutex::new(RotatingFile::open(
                path,
                config.max_bytes,
                config.retention,
            )?)),
            None => None,
        };
        Ok(Self {
            level: config.level,
            console: config.console,
            file,
        })
    }

    pub fn console(level: LevelFilter) -> Self {
        Self {
            level,
            console: true,
            file: None,
        }
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.file
            .as_ref()
            .and_then(|f| f.lock().ok().map(|f| f.path.clone()))
    }
}

impl Log for PipelineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(Local::now(), record);
        if self.console {
            eprintln!("{}", line);
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                // A broken log file must not take the pipeline down with it
                let _ = file.append(&line);
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.file.flush();
            }
        }
    }
}

impl Drop for PipelineLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// `YYYY-MM-DD HH:MM:SS.mmm | LEVEL | target | message`
pub fn format_line(timestamp: DateTime<Local>, record: &Record) -> String {
    format!(
        "{} | {:<5} | {} | {}",
        timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        record.level(),
        record.target(),
        record.args()
    )
}

struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    retention: usize,
}

impl RotatingFile {
    fn open(path: &Path, max_bytes: u64, retention: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
            retention,
        })
    }

    fn append(&mut self, line: &str) -> std::io::Result<()> {
        let len = line.len() as u64 + 1;
        if self.max_bytes > 0 && self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        writeln!(self.file, "{}", line)?;
        self.written += len;
        Ok(())
    }

    /// Shifts `log.1 .. log.N-1` up by one, moves the live file to `log.1`
    /// and starts a fresh one. The oldest file beyond retention is removed.
    fn rotate(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        if self.retention == 0 {
            fs::remove_file(&self.path)?;
        } else {
            let oldest = rotated_path(&self.path, self.retention);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for i in (1..self.retention).rev() {
                let from = rotated_path(&self.path, i);
                if from.exists() {
                    fs::rename(&from, rotated_path(&self.path, i + 1))?;
                }
            }
            fs::rename(&self.path, rotated_path(&self.path, 1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

pub fn rotated_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

/// In-memory sink, handy for asserting on what a component logged.
#[derive(Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<(Level, String, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured `(level, target, message)` triples, oldest first.
    pub fn entries(&self) -> Vec<(Level, String, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(l, _, msg)| *l == level && msg.contains(needle))
    }
}

impl Log for MemoryLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use tempfile::TempDir;

    fn file_config(path: PathBuf, max_bytes: u64, retention: usize) -> LogConfig {
        LogConfig {
            file: Some(path),
            console: false,
            level: LevelFilter::Info,
            max_bytes,
            retention,
        }
    }

    #[test]
    fn writes_formatted_lines_and_filters_level() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let logger = PipelineLogger::new(&file_config(path.clone(), 0, 5)).unwrap();

        emit!(&logger, Level::Info, Stage::Fetch, "Fetching: {}", "http://x");
        emit!(&logger, Level::Debug, Stage::Fetch, "hidden");
        emit!(&logger, Level::Error, Stage::Write, "boom");
        logger.flush();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("| INFO  | fetch | Fetching: http://x"));
        assert!(lines[1].ends_with("| ERROR | write | boom"));
        assert_eq!(logger.file_path(), Some(path));
    }

    #[test]
    fn rotates_and_keeps_retention() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        let logger = PipelineLogger::new(&file_config(path.clone(), 64, 2)).unwrap();

        for i in 0..20 {
            emit!(&logger, Level::Info, Stage::Pipeline, "message number {}", i);
        }
        logger.flush();

        assert!(path.exists());
        assert!(rotated_path(&path, 1).exists());
        assert!(rotated_path(&path, 2).exists());
        assert!(!rotated_path(&path, 3).exists());
        let live = fs::read_to_string(&path).unwrap();
        assert!(live.contains("message number 19"));
    }

    #[test]
    fn memory_logger_captures_target() {
        let logger = MemoryLogger::new();
        emit!(&logger, Level::Warn, Stage::Parse, "short row {}", 3);
        let entries = logger.entries();
        assert_eq!(
            entries,
            vec![(Level::Warn, "parse".to_string(), "short row 3".to_string())]
        );
        assert!(logger.contains(Level::Warn, "short row"));
    }
}
