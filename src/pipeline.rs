use crate::config::{JobConfig, PipelineConfig, ViewConfig};
use crate::emit;
use crate::error::{Result, Stage};
use crate::extract::{Fetcher, save_raw};
use crate::load::{WriteReport, write_all};
use crate::parse::parse;
use crate::structs::Dataset;
use crate::transform::apply_steps;
use log::{Level, Log};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// What a successful run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub jobs: usize,
    pub written: Vec<PathBuf>,
    pub elapsed: Duration,
}

struct PreparedView<'c> {
    job: &'c JobConfig,
    view: &'c ViewConfig,
    dataset: Dataset,
}

/// Linear fetch → parse → transform → write run over every configured job.
///
/// All fetches complete before anything is parsed, and all parsing and
/// transforming completes before anything is written, so a network or parse
/// failure leaves no output files behind.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    fetcher: Fetcher,
    logger: &'a dyn Log,
}

impl<'a> Pipeline<'a> {
    /// # Errors
    /// Returns `PipelineError::Config` if the config is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &'a PipelineConfig, logger: &'a dyn Log) -> Result<Self> {
        config.validate().inspect_err(|e| {
            emit!(logger, Level::Error, Stage::Config, "{}", e);
        })?;
        let fetcher = Fetcher::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            fetcher,
            logger,
        })
    }

    /// Runs every job. Network and parse errors abort the run before any
    /// write; write errors are collected and reported once all targets were tried.
    pub fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        emit!(
            self.logger,
            Level::Info,
            Stage::Pipeline,
            "=== Pipeline start ({} jobs) ===",
            self.config.jobs.len()
        );

        let payloads = self.fetch_all()?;
        let views = self.prepare_all(payloads)?;
        let report = self.write_views(&views);

        let total = report.attempted();
        let written = report.into_result().inspect_err(|e| {
            emit!(
                self.logger,
                Level::Error,
                Stage::Pipeline,
                "Pipeline finished with errors: {}",
                e
            );
        })?;

        let elapsed = start.elapsed();
        emit!(
            self.logger,
            Level::Info,
            Stage::Pipeline,
            "=== Pipeline complete: {} of {} targets written in {:.2?} ===",
            written.len(),
            total,
            elapsed
        );
        Ok(RunSummary {
            jobs: self.config.jobs.len(),
            written,
            elapsed,
        })
    }

    fn fetch_all(&self) -> Result<Vec<(&'a JobConfig, Vec<u8>)>> {
        let config: &'a PipelineConfig = self.config;
        let mut payloads = Vec::with_capacity(config.jobs.len());
        for job in &config.jobs {
            let content = self.fetcher.fetch(&job.url, self.logger)?;
            if let (Some(dir), Some(file_name)) = (&config.raw_dir, &job.raw_file) {
                // raw copies are a convenience, not an output target
                if let Err(e) = save_raw(&content, dir, file_name, self.logger) {
                    emit!(
                        self.logger,
                        Level::Warn,
                        Stage::Fetch,
                        "Could not save raw copy of {}: {}",
                        job.name,
                        e
                    );
                }
            }
            payloads.push((job, content));
        }
        Ok(payloads)
    }

    fn prepare_all(
        &self,
        payloads: Vec<(&'a JobConfig, Vec<u8>)>,
    ) -> Result<Vec<PreparedView<'a>>> {
        let mut views = Vec::new();
        for (job, content) in payloads {
            let dataset = parse(&content, job.format).inspect_err(|e| {
                emit!(self.logger, Level::Error, Stage::Parse, "{}: {}", job.name, e);
            })?;
            emit!(
                self.logger,
                Level::Info,
                Stage::Parse,
                "{}: parsed {} rows x {} columns",
                job.name,
                dataset.len(),
                dataset.columns().len()
            );

            for view in &job.views {
                // apply_steps logs the failing step itself
                let derived = apply_steps(&dataset, &view.steps, self.logger)?;
                emit!(
                    self.logger,
                    Level::Info,
                    Stage::Transform,
                    "{}/{}: {} rows",
                    job.name,
                    view.name,
                    derived.len()
                );
                views.push(PreparedView {
                    job,
                    view,
                    dataset: derived,
                });
            }
        }
        Ok(views)
    }

    fn write_views(&self, views: &[PreparedView<'_>]) -> WriteReport {
        let mut report = WriteReport::default();
        for prepared in views {
            emit!(
                self.logger,
                Level::Debug,
                Stage::Write,
                "{}/{}: writing {} targets",
                prepared.job.name,
                prepared.view.name,
                prepared.view.outputs.len()
            );
            report.merge(write_all(
                &prepared.dataset,
                &prepared.view.outputs,
                &self.config.output_dir,
                self.logger,
            ));
        }
        report
    }
}

/// Convenience wrapper: build a pipeline and run it.
pub fn run(config: &PipelineConfig, logger: &dyn Log) -> Result<RunSummary> {
    Pipeline::new(config, logger)?.run()
}

