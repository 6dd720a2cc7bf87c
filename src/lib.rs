pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod logger;
pub mod parse;
pub mod pipeline;
pub mod structs;
pub mod transform;

// Re-export public API
pub use config::{JobConfig, LogConfig, PipelineConfig, ViewConfig};
pub use error::{ErrorKind, PipelineError, Result, Stage};
pub use extract::{Fetcher, save_raw};
pub use load::{WriteReport, write_all, write_csv, write_excel, write_json, write_text};
pub use logger::{MemoryLogger, PipelineLogger};
pub use parse::parse;
pub use pipeline::{Pipeline, RunSummary, run};
pub use structs::{Dataset, OutputFormat, OutputTarget, SourceFormat, Value};
pub use transform::{TotalsNames, TransformStep, apply_steps};
