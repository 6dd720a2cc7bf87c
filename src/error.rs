use std::fmt;

use crate::structs::SourceFormat;

/// Pipeline stage an event or error belongs to. Doubles as the log target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Fetch,
    Parse,
    Transform,
    Write,
    Pipeline,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Transform => "transform",
            Stage::Write => "write",
            Stage::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error taxonomy used for exit reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Parse,
    Io,
    Config,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Network Error: {url}: {source}")]
    Network { url: String, source: reqwest::Error },
    #[error("HTTP Status Error: {url} returned {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("Parse Error ({format}): {message}")]
    Parse {
        format: SourceFormat,
        message: String,
    },
    #[error("Transform Error: {0}")]
    Transform(String),
    #[error("Data Error: {0}")]
    Data(String),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Excel Error: {0}")]
    Excel(#[from] rust_xlsxwriter::XlsxError),
    #[error("Config Error: {0}")]
    Config(String),
    #[error("{failed} of {total} output targets failed")]
    TargetsFailed { failed: usize, total: usize },
}

impl PipelineError {
    pub fn parse(format: SourceFormat, message: impl fmt::Display) -> Self {
        PipelineError::Parse {
            format,
            message: message.to_string(),
        }
    }

    /// Stage an error is reported under.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Transform(_) => Stage::Transform,
            other => match other.kind() {
                ErrorKind::Network => Stage::Fetch,
                ErrorKind::Parse => Stage::Parse,
                ErrorKind::Io => Stage::Write,
                ErrorKind::Config => Stage::Config,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Network { .. } | PipelineError::HttpStatus { .. } => ErrorKind::Network,
            PipelineError::Parse { .. } | PipelineError::Transform(_) | PipelineError::Data(_) => {
                ErrorKind::Parse
            }
            PipelineError::Io(_)
            | PipelineError::Csv(_)
            | PipelineError::Json(_)
            | PipelineError::Excel(_)
            | PipelineError::TargetsFailed { .. } => ErrorKind::Io,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
