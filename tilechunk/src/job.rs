//! Chunk job orchestration.
//!
//! [`ChunkJob::run`] drives one job through its stages:
//!
//! 1. plan workspace paths for every input
//! 2. stage working copies (parallel, one partition per image)
//! 3. analyze working copies, collecting [`ImageSource`]s through a sideband
//! 4. generate tile tasks and render them (parallel, repartitioned)
//! 5. build and write the manifest
//!
//! `STARTED` is sent before the first stage. A failure in any stage ends the
//! job with a single `FAILED` message; `FINISHED` is sent only after the
//! manifest has been written.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{error, info};

use crate::analyzer::{analyze_image, ImageSource};
use crate::config::ChunkConfig;
use crate::error::{ChunkError, ChunkResult};
use crate::executor::{ParallelExecutor, Sideband};
use crate::manifest::{build_manifest, write_manifest, JobManifest};
use crate::notify::{StatusMessage, StatusNotifier};
use crate::render::{RenderOutcome, TileRenderer};
use crate::storage::TargetWriter;
use crate::tasks::{generate_chunk_tasks, ChunkTask};
use crate::workspace::{plan_workspace, WorkspaceStager};

/// Inputs of a chunk job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub job_id: String,
    /// Where working copies and tiles are written.
    pub workspace: String,
    /// Recorded in the manifest.
    pub target: String,
    /// Where the manifest is written.
    pub output: String,
    pub images: Vec<String>,
}

/// Stage a job was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Plan,
    Stage,
    Analyze,
    Render,
    Manifest,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStage::Plan => "plan",
            JobStage::Stage => "stage",
            JobStage::Analyze => "analyze",
            JobStage::Render => "render",
            JobStage::Manifest => "manifest",
        };
        f.write_str(s)
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(JobManifest),
    Failure {
        stage: JobStage,
        /// Error type name, e.g. `RenderError`.
        kind: String,
        message: String,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }

    pub fn manifest(&self) -> Option<&JobManifest> {
        match self {
            JobOutcome::Success(manifest) => Some(manifest),
            JobOutcome::Failure { .. } => None,
        }
    }

    /// `"<kind>: <message>"` for failures.
    pub fn error_message(&self) -> Option<String> {
        match self {
            JobOutcome::Success(_) => None,
            JobOutcome::Failure { kind, message, .. } => Some(format!("{}: {}", kind, message)),
        }
    }
}

/// Counts reported at the end of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RenderStats {
    tasks: usize,
    written: usize,
    skipped: usize,
}

/// A configured chunk job.
pub struct ChunkJob<'a, E: ParallelExecutor> {
    spec: JobSpec,
    config: ChunkConfig,
    writer: TargetWriter,
    executor: &'a E,
    notifier: &'a dyn StatusNotifier,
}

impl<'a, E: ParallelExecutor> ChunkJob<'a, E> {
    pub fn new(
        spec: JobSpec,
        config: ChunkConfig,
        writer: TargetWriter,
        executor: &'a E,
        notifier: &'a dyn StatusNotifier,
    ) -> Self {
        Self {
            spec,
            config,
            writer,
            executor,
            notifier,
        }
    }

    /// Runs the job to completion.
    ///
    /// # Errors
    ///
    /// Only a failure to deliver a status message is returned as `Err`;
    /// pipeline failures are reported as [`JobOutcome::Failure`].
    pub fn run(&self) -> ChunkResult<JobOutcome> {
        let job_id = &self.spec.job_id;
        self.notifier.notify(&StatusMessage::started(job_id))?;
        info!(job_id = %job_id, images = self.spec.images.len(), "Job started");

        match self.execute() {
            Ok(manifest) => {
                self.notifier.notify(&StatusMessage::finished(job_id))?;
                info!(job_id = %job_id, "Done");
                Ok(JobOutcome::Success(manifest))
            }
            Err((stage, err)) => {
                let status = err.status_message();
                error!(job_id = %job_id, stage = %stage, error = %status, "Job failed");
                self.notifier.notify(&StatusMessage::failed(job_id, status))?;
                Ok(JobOutcome::Failure {
                    stage,
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    fn execute(&self) -> Result<JobManifest, (JobStage, ChunkError)> {
        let at = |stage: JobStage| move |err: ChunkError| (stage, err);
        let tile_dim = self.config.tile_dim;

        let uri_sets = plan_workspace(&self.spec.images, &self.spec.workspace).map_err(at(JobStage::Plan))?;
        let image_count = uri_sets.len();

        let stager = WorkspaceStager::new(self.writer.clone(), self.config.staging_block_size);
        let staged = self
            .executor
            .map(uri_sets, image_count, |uri_set| {
                stager.stage(&uri_set)?;
                Ok(uri_set)
            })
            .map_err(at(JobStage::Stage))?;
        info!(images = image_count, "Staged working copies");

        let (tasks, sources) = self
            .executor
            .map_with_sideband(staged, image_count, |uri_set, sources: &mut Sideband<ImageSource>| {
                let image = analyze_image(&uri_set, tile_dim)?;
                let tasks = generate_chunk_tasks(&image, tile_dim);
                sources.add(image);
                Ok(tasks)
            })
            .map_err(at(JobStage::Analyze))?;
        let tasks: Vec<_> = tasks.into_iter().flatten().collect();

        let stats = self.render(tasks, image_count).map_err(at(JobStage::Render))?;
        info!(
            "Processed {} images into {} chunks",
            sources.len(),
            stats.tasks
        );
        info!(written = stats.written, skipped = stats.skipped, "Rendered tiles");

        let manifest = build_manifest(
            &self.spec.job_id,
            &self.spec.target,
            tile_dim,
            sources.into_vec(),
        );
        write_manifest(&self.writer, &self.spec.output, &manifest).map_err(at(JobStage::Manifest))?;
        Ok(manifest)
    }

    fn render(&self, tasks: Vec<ChunkTask>, image_count: usize) -> ChunkResult<RenderStats> {
        let count = tasks.len();
        let partitions = self.config.render_partitions(count, image_count);
        info!(tasks = count, partitions, "Rendering tiles");

        let renderer = TileRenderer::new(self.writer.clone());
        let written = AtomicUsize::new(0);
        self.executor.for_each(tasks, partitions, |task| {
            if renderer.render(&task)? == RenderOutcome::Written {
                written.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        })?;

        let written = written.into_inner();
        Ok(RenderStats {
            tasks: count,
            written,
            skipped: count - written,
        })
    }
}
