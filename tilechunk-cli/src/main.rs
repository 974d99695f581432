//! tilechunk CLI - chunk raster imagery into web-map tiles
//!
//! Runs a single chunk job: stage the input images into the workspace, tile
//! each at the zoom level matching its resolution, and write a JSON manifest.

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use tilechunk::config::ChunkConfig;
use tilechunk::executor::RayonExecutor;
use tilechunk::logging::{default_log_dir, default_log_file, init_logging};
use tilechunk::notify::{NoopNotifier, SqsNotifier, StatusNotifier};
use tilechunk::storage::{S3Store, TargetWriter};
use tilechunk::{ChunkJob, JobOutcome, JobSpec};

use crate::error::CliError;

/// Printed by `--version`.
const VERSION: &str = "0.1";

#[derive(Parser, Debug)]
#[command(name = "tilechunk")]
#[command(about = "Reproject raster images into a web-map tile grid", long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
    /// Print the version and exit
    #[arg(long)]
    version: bool,

    /// Job identifier reported in status messages and the manifest
    #[arg(long, required_unless_present = "version")]
    job_id: Option<String>,

    /// Workspace for working copies and tiles (local path or s3://)
    #[arg(long, required_unless_present = "version")]
    workspace: Option<String>,

    /// Tile target recorded in the manifest
    #[arg(long, required_unless_present = "version")]
    target: Option<String>,

    /// Where to write the manifest (local path or s3://)
    #[arg(long, required_unless_present = "version")]
    output: Option<String>,

    /// SQS queue URL for job status messages
    #[arg(long)]
    status_queue: Option<String>,

    /// Config file (default: <config_dir>/tilechunk/config.ini)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker threads (0 = one per CPU)
    #[arg(long)]
    threads: Option<usize>,

    /// Output tile edge length in pixels
    #[arg(long)]
    tile_dim: Option<u32>,

    /// Log directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Input images (local path, s3:// or http://)
    #[arg(required_unless_present = "version")]
    images: Vec<String>,
}

impl Args {
    fn job_spec(&self) -> Result<JobSpec, CliError> {
        let required = |value: &Option<String>, flag: &str| {
            value
                .clone()
                .ok_or_else(|| CliError::Usage(format!("missing required argument --{}", flag)))
        };
        if self.images.is_empty() {
            return Err(CliError::Usage("at least one <image> is required".to_string()));
        }
        Ok(JobSpec {
            job_id: required(&self.job_id, "job-id")?,
            workspace: required(&self.workspace, "workspace")?,
            target: required(&self.target, "target")?,
            output: required(&self.output, "output")?,
            images: self.images.clone(),
        })
    }

    /// Config file values overridden by flags.
    fn config(&self) -> Result<ChunkConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => ChunkConfig::load(path)?,
            None => ChunkConfig::load_default()?,
        };
        if let Some(threads) = self.threads {
            config = config.with_worker_threads(threads);
        }
        if let Some(tile_dim) = self.tile_dim {
            if tile_dim == 0 {
                return Err(CliError::Usage("--tile-dim must be positive".to_string()));
            }
            config = config.with_tile_dim(tile_dim);
        }
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    if args.version {
        println!("{}", VERSION);
        return;
    }

    if let Err(e) = run(&args) {
        e.exit();
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let spec = args.job_spec()?;
    let config = args.config()?;

    let log_dir = args.log_dir.clone().unwrap_or_else(default_log_dir);
    let _logging = init_logging(&log_dir, default_log_file()).map_err(|e| CliError::LoggingInit(e.to_string()))?;

    info!(
        job_id = %spec.job_id,
        images = spec.images.len(),
        tile_dim = config.tile_dim,
        "tilechunk v{}",
        VERSION
    );

    let runtime = build_runtime()?;
    let writer = target_writer(&spec, &runtime);
    let notifier: Box<dyn StatusNotifier> = match &args.status_queue {
        Some(queue) => Box::new(SqsNotifier::connect(
            queue.clone(),
            &config.status_queue_region,
            runtime.handle().clone(),
        )),
        None => Box::new(NoopNotifier),
    };
    let executor = RayonExecutor::new(config.worker_threads)?;

    let job = ChunkJob::new(spec, config, writer, &executor, notifier.as_ref());
    match job.run()? {
        JobOutcome::Success(manifest) => {
            info!(images = manifest.input.len(), "Done.");
            Ok(())
        }
        failure @ JobOutcome::Failure { .. } => Err(CliError::JobFailed(
            failure.error_message().unwrap_or_default(),
        )),
    }
}

fn build_runtime() -> Result<Runtime, CliError> {
    Builder::new_multi_thread()
        .enable_all()
        .thread_name("tilechunk-io")
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))
}

/// An S3 client is only created when something is written to S3.
fn target_writer(spec: &JobSpec, runtime: &Runtime) -> TargetWriter {
    let writes_s3 = [&spec.workspace, &spec.output]
        .iter()
        .any(|uri| uri.starts_with("s3://"));
    if writes_s3 {
        TargetWriter::with_object_store(Arc::new(S3Store::from_env(runtime.handle().clone())))
    } else {
        TargetWriter::local_only()
    }
}
