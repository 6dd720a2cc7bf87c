use crate::emit;
use crate::error::{PipelineError, Result, Stage};
use crate::extract::DEFAULT_TIMEOUT_SECS;
use crate::structs::{OutputFormat, OutputTarget, SourceFormat};
use crate::transform::{TotalsNames, TransformStep};
use log::{Level, LevelFilter, Log};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const AIRTRAVEL_CSV_URL: &str = "https://people.sc.fsu.edu/~jburkardt/data/csv/airtravel.csv";
pub const POSTS_JSON_URL: &str = "https://jsonplaceholder.typicode.com/posts";
pub const README_TEXT_URL: &str = "https://raw.githubusercontent.com/psf/requests/main/README.md";

/// Top-level pipeline configuration. Every field has a default, so a config
/// file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base directory for relative output target paths
    pub output_dir: PathBuf,
    /// Where raw fetched payloads are kept; `None` disables raw copies
    pub raw_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub log: LogConfig,
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub file: Option<PathBuf>,
    pub console: bool,
    pub level: LevelFilter,
    /// Rotate the log file once it would grow past this size (0 disables)
    pub max_bytes: u64,
    /// Number of rotated files kept
    pub retention: usize,
}

/// One source URL and the views derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub url: String,
    pub format: SourceFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_file: Option<String>,
    #[serde(default)]
    pub views: Vec<ViewConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<TransformStep>,
    pub outputs: Vec<OutputTarget>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("logs").join("harvester.log")),
            console: true,
            level: LevelFilter::Info,
            max_bytes: 1024 * 1024,
            retention: 5,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data").join("processed"),
            raw_dir: Some(PathBuf::from("data").join("raw")),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            log: LogConfig::default(),
            jobs: default_jobs(),
        }
    }
}

/// Yearly passenger totals over the month rows, digits-only cells counted.
fn airtravel_totals() -> TransformStep {
    TransformStep::ColumnTotals {
        label: "year".into(),
        exclude: vec!["month".into()],
        names: TotalsNames {
            count: "months_counted".into(),
            total: "total_passengers".into(),
            mean: "avg_per_month".into(),
        },
        non_negative: true,
    }
}

fn default_jobs() -> Vec<JobConfig> {
    vec![
        JobConfig {
            name: "airtravel".into(),
            url: AIRTRAVEL_CSV_URL.into(),
            format: SourceFormat::Csv,
            raw_file: Some("airtravel.csv".into()),
            views: vec![
                ViewConfig {
                    name: "yearly_totals".into(),
                    steps: vec![airtravel_totals()],
                    outputs: vec![
                        OutputTarget::new(OutputFormat::Csv, "airtravel_yearly_totals.csv"),
                        OutputTarget::new(OutputFormat::Excel, "summary.xlsx")
                            .with_title("AirTravel Summary"),
                    ],
                },
                ViewConfig {
                    name: "totals_ranking".into(),
                    steps: vec![
                        airtravel_totals(),
                        TransformStep::Select {
                            columns: vec!["year".into(), "total_passengers".into()],
                        },
                        TransformStep::Sort {
                            column: "total_passengers".into(),
                            descending: true,
                        },
                    ],
                    outputs: vec![
                        OutputTarget::new(OutputFormat::Excel, "totals_ranking.xlsx")
                            .with_title("Totals Ranking"),
                    ],
                },
            ],
        },
        JobConfig {
            name: "posts".into(),
            url: POSTS_JSON_URL.into(),
            format: SourceFormat::Json,
            raw_file: Some("posts.json".into()),
            views: vec![
                ViewConfig {
                    name: "post_count".into(),
                    steps: vec![TransformStep::RowCount {
                        label: "post_count".into(),
                    }],
                    outputs: vec![OutputTarget::new(OutputFormat::Json, "post_count.json")],
                },
                ViewConfig {
                    name: "posts_per_user".into(),
                    steps: vec![TransformStep::CountBy {
                        column: "userId".into(),
                    }],
                    outputs: vec![OutputTarget::new(
                        OutputFormat::Json,
                        "posts_per_user.json",
                    )],
                },
                ViewConfig {
                    name: "posts_top_words".into(),
                    steps: vec![TransformStep::WordFrequency {
                        columns: vec!["title".into(), "body".into()],
                        min_len: 4,
                        top: 15,
                    }],
                    outputs: vec![OutputTarget::new(OutputFormat::Json, "posts_top_words.json")],
                },
            ],
        },
        JobConfig {
            name: "readme".into(),
            url: README_TEXT_URL.into(),
            format: SourceFormat::Text,
            raw_file: Some("requests_readme.txt".into()),
            views: vec![
                ViewConfig {
                    name: "readme_metrics".into(),
                    steps: vec![TransformStep::TextMetrics],
                    outputs: vec![
                        OutputTarget::new(OutputFormat::Text, "text_metrics.txt")
                            .with_title("Text Metrics for: psf/requests README"),
                    ],
                },
                ViewConfig {
                    name: "readme_top_words".into(),
                    steps: vec![TransformStep::WordFrequency {
                        columns: Vec::new(),
                        min_len: 5,
                        top: 20,
                    }],
                    outputs: vec![
                        OutputTarget::new(OutputFormat::Text, "text_report.txt")
                            .with_title("Text Report for: psf/requests README"),
                    ],
                },
            ],
        },
    ]
}

impl PipelineConfig {
    /// Loads `path` when given, else the defaults. Failures are logged under
    /// the config stage before being returned.
    pub fn load(path: Option<&Path>, logger: &dyn Log) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path),
            None => {
                let config = Self::default();
                config.validate().map(|_| config)
            }
        };
        config.inspect_err(|e| {
            emit!(logger, Level::Error, Stage::Config, "{}", e);
        })
    }

    /// Loads a JSON config file; omitted fields fall back to defaults.
    ///
    /// # Errors
    /// Returns `PipelineError::Config` if the file cannot be read, is not valid
    /// JSON for this schema, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Config(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(PipelineError::Config("no jobs configured".into()));
        }
        let mut names = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "duplicate job name: {}",
                    job.name
                )));
            }
            if job.url.trim().is_empty() {
                return Err(PipelineError::Config(format!(
                    "job {} has an empty url",
                    job.name
                )));
            }
            if job.views.is_empty() {
                return Err(PipelineError::Config(format!(
                    "job {} has no views",
                    job.name
                )));
            }
            for view in &job.views {
                if view.outputs.is_empty() {
                    return Err(PipelineError::Config(format!(
                        "view {}/{} has no output targets",
                        job.name, view.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn target_count(&self) -> usize {
        self.jobs
            .iter()
            .flat_map(|j| &j.views)
            .map(|v| v.outputs.len())
            .sum()
    }
}
