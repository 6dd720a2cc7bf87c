use crate::emit;
use crate::error::{PipelineError, Result, Stage};
use log::{Level, Log};
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Blocking HTTP fetcher. One attempt per URL, no retry.
pub struct Fetcher {
    client: Client,
    timeout: Duration,
}

impl Fetcher {
    /// # Errors
    /// Returns `PipelineError::Config` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("harvester/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    /// Issues a GET and returns the response body.
    ///
    /// # Errors
    /// Returns `PipelineError::Network` on timeout, DNS or connection failure,
    /// and `PipelineError::HttpStatus` on a non-2xx response.
    pub fn fetch(&self, url: &str, logger: &dyn Log) -> Result<Vec<u8>> {
        emit!(logger, Level::Info, Stage::Fetch, "Fetching: {}", url);

        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                emit!(
                    logger,
                    Level::Error,
                    Stage::Fetch,
                    "Timeout fetching {} (exceeded {:?})",
                    url,
                    self.timeout
                );
            } else {
                emit!(logger, Level::Error, Stage::Fetch, "Failed to fetch {}: {}", url, e);
            }
            PipelineError::Network {
                url: url.to_string(),
                source: e,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            emit!(
                logger,
                Level::Error,
                Stage::Fetch,
                "HTTP error fetching {}: {}",
                url,
                status
            );
            return Err(PipelineError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(|e| {
            emit!(
                logger,
                Level::Error,
                Stage::Fetch,
                "Failed to read response body from {}: {}",
                url,
                e
            );
            PipelineError::Network {
                url: url.to_string(),
                source: e,
            }
        })?;

        emit!(logger, Level::Info, Stage::Fetch, "Fetched {} bytes from {}", body.len(), url);
        Ok(body.to_vec())
    }
}

/// Keeps a copy of a fetched payload under `dir`, creating it if needed.
///
/// # Errors
/// Returns `PipelineError::Io` if the directory or file cannot be written.
pub fn save_raw(content: &[u8], dir: &Path, file_name: &str, logger: &dyn Log) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    fs::write(&path, content)?;
    emit!(logger, Level::Info, Stage::Fetch, "Saved raw: {}", path.display());
    Ok(path)
}
