use clap::Parser;
use harvester::{PipelineConfig, PipelineError, PipelineLogger, Stage, emit, run};
use log::{Level, LevelFilter};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (defaults reproduce the airtravel/posts/README jobs)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for processed outputs
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Directory for raw fetched copies
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Log file path
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,

    /// Do not log to the console
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

fn main() -> Result<(), PipelineError> {
    let total_start = Instant::now();
    let args = Args::parse();

    // console-only until the configured logger can be built
    let bootstrap = PipelineLogger::console(LevelFilter::Info);
    let mut config = PipelineConfig::load(args.config.as_deref(), &bootstrap)?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(dir) = args.raw_dir {
        config.raw_dir = Some(dir);
    }
    if let Some(file) = args.log_file {
        config.log.file = Some(file);
    }
    if args.debug {
        config.log.level = LevelFilter::Debug;
    }
    if args.quiet {
        config.log.console = false;
    }

    let logger = PipelineLogger::new(&config.log).inspect_err(|e| {
        emit!(&bootstrap, Level::Error, e.stage(), "Cannot open log: {}", e);
    })?;
    match logger.file_path() {
        Some(path) => emit!(
            &logger,
            Level::Info,
            Stage::Config,
            "Logger initialized. Writing to {}",
            path.display()
        ),
        None => emit!(&logger, Level::Info, Stage::Config, "Logger initialized"),
    }
    emit!(
        &logger,
        Level::Debug,
        Stage::Config,
        "Output dir: {} | Raw dir: {:?} | Timeout: {}s",
        config.output_dir.display(),
        config.raw_dir,
        config.timeout_secs
    );

    let summary = run(&config, &logger).inspect_err(|e| {
        emit!(&logger, Level::Error, e.stage(), "Run failed: {}", e);
    })?;

    println!(
        "Done. Processed {} jobs, wrote {} files to {} in {:.2?}",
        summary.jobs,
        summary.written.len(),
        config.output_dir.display(),
        total_start.elapsed()
    );
    for path in &summary.written {
        println!("  - {}", path.display());
    }
    Ok(())
}
