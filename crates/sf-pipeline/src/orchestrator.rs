//! Pipeline orchestrator: drives one job through the fixed step table,
//! persisting a checkpoint before each step and classifying failures by the
//! failing stage's [`Severity`].
//!
//! | Step            | Checkpoint                | Severity |
//! |-----------------|---------------------------|----------|
//! | validation      | `Validating`, 0.05        | hard     |
//! | extract frames  | `ExtractingFrames`, 0.1   | hard     |
//! | train           | `Training`, 0.3           | hard     |
//! | export PLY      | `Exporting`, 0.85         | hard     |
//! | export mesh     | (none)                    | soft     |
//! | compress        | `Compressing`, 0.92       | soft     |
//! | done            | `Completed`, 1.0          |          |

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use sf_av::{JobWorkspace, Provisioner, ToolRegistry};
use sf_core::config::Config;
use sf_core::{Error, Job, JobStatus, Result, Severity};
use sf_store::JobStore;

use crate::context::StageContext;
use crate::stage::{Stage, StageInput, StageOutput};
use crate::stages::{blocking, CompressArtifact, ExportMesh, ExportPly, ExtractFrames, TrainSplat};
use crate::validate::Validator;

/// The stage implementations the orchestrator runs, one per step.
#[derive(Clone)]
pub struct StageSet {
    pub extract: Arc<dyn Stage>,
    pub train: Arc<dyn Stage>,
    pub export: Arc<dyn Stage>,
    pub mesh: Arc<dyn Stage>,
    pub compress: Arc<dyn Stage>,
}

impl Default for StageSet {
    fn default() -> Self {
        Self {
            extract: Arc::new(ExtractFrames),
            train: Arc::new(TrainSplat),
            export: Arc::new(ExportPly),
            mesh: Arc::new(ExportMesh),
            compress: Arc::new(CompressArtifact),
        }
    }
}

/// Runs jobs through validation and the stage table.
pub struct Orchestrator {
    store: Arc<JobStore>,
    config: Arc<Config>,
    tools: Arc<ToolRegistry>,
    provisioner: Arc<dyn Provisioner>,
    validator: Option<Validator>,
    stages: StageSet,
}

impl Orchestrator {
    /// An orchestrator with the built-in stages and no pre-flight validation.
    pub fn new(
        store: Arc<JobStore>,
        config: Arc<Config>,
        tools: Arc<ToolRegistry>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        Self {
            store,
            config,
            tools,
            provisioner,
            validator: None,
            stages: StageSet::default(),
        }
    }

    /// Builder: validate inputs before the first stage (when enabled in
    /// `processing.validate_input`).
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Builder: replace the stage implementations.
    pub fn with_stages(mut self, stages: StageSet) -> Self {
        self.stages = stages;
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Drive `job` to a terminal status and return it.
    ///
    /// Never fails: every error ends up in the job's `error_message`. The
    /// one exception is cancellation, which leaves the job in its last
    /// persisted status so an operator can see where it stopped.
    pub async fn process(&self, mut job: Job, cancel: CancellationToken) -> Job {
        if job.is_terminal() {
            tracing::warn!(job_id = %job.id, status = %job.status, "Job already finished; not processing");
            return job;
        }

        let workspace = Arc::new(JobWorkspace::new(&self.config.storage, job.id));
        let ctx = StageContext::new(
            workspace.clone(),
            self.tools.clone(),
            self.provisioner.clone(),
            self.config.clone(),
        )
        .with_cancellation(cancel);

        tracing::info!(
            job_id = %job.id,
            preset = %job.preset,
            input = %job.input.display(),
            "Processing job"
        );
        let started = Instant::now();

        match self.run(&mut job, &ctx).await {
            Ok(()) => {
                tracing::info!(
                    job_id = %job.id,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Job completed"
                );
            }
            Err(Error::Cancelled(what)) => {
                tracing::warn!(
                    job_id = %job.id,
                    status = %job.status,
                    "{what} cancelled; job left in its last persisted status"
                );
            }
            Err(e) => self.mark_failed(&mut job, &e).await,
        }

        if self.config.processing.cleanup_frames {
            workspace.cleanup_frames();
        }
        job
    }

    fn validator(&self) -> Option<&Validator> {
        self.validator
            .as_ref()
            .filter(|_| self.config.processing.validate_input)
    }

    async fn run(&self, job: &mut Job, ctx: &StageContext) -> Result<()> {
        ctx.workspace.prepare()?;
        let params = job.preset_config();
        let models_dir = self.config.storage.models_dir();

        if let Some(validator) = self.validator() {
            self.checkpoint(job, ctx, JobStatus::Validating, 0.05).await?;
            let report = validator.validate(&job.input, &params).await;
            let valid = report.is_valid();
            let errors = report.errors.join("; ");
            job.validation = Some(report);
            if !valid {
                return Err(Error::Validation(errors));
            }
        }

        self.checkpoint(job, ctx, JobStatus::ExtractingFrames, 0.1).await?;
        let frames = self
            .run_stage(
                &*self.stages.extract,
                ctx,
                StageInput {
                    inputs: vec![job.input.clone()],
                    output_dir: ctx.workspace.frames_dir(),
                    params,
                },
            )
            .await?;

        self.checkpoint(job, ctx, JobStatus::Training, 0.3).await?;
        let model = self
            .run_stage(
                &*self.stages.train,
                ctx,
                StageInput {
                    inputs: vec![frames.artifact],
                    output_dir: ctx.workspace.model_dir(),
                    params,
                },
            )
            .await?;

        self.checkpoint(job, ctx, JobStatus::Exporting, 0.85).await?;
        let exported = self
            .run_stage(
                &*self.stages.export,
                ctx,
                StageInput {
                    inputs: vec![model.artifact],
                    output_dir: models_dir.clone(),
                    params,
                },
            )
            .await?;
        job.artifact = Some(exported.artifact.clone());

        if self.config.processing.export_mesh {
            let result = self
                .run_stage(
                    &*self.stages.mesh,
                    ctx,
                    StageInput {
                        inputs: vec![exported.artifact.clone()],
                        output_dir: models_dir.clone(),
                        params,
                    },
                )
                .await;
            if let Some(out) = soft(ctx, result)? {
                job.artifact_mesh = Some(out.artifact);
            }
        }

        if self.config.compression.enabled {
            self.checkpoint(job, ctx, JobStatus::Compressing, 0.92).await?;
            let result = self
                .run_stage(
                    &*self.stages.compress,
                    ctx,
                    StageInput {
                        inputs: vec![exported.artifact],
                        output_dir: models_dir,
                        params,
                    },
                )
                .await;
            if let Some(out) = soft(ctx, result)? {
                job.artifact_compressed = Some(out.artifact);
            }
        }

        job.complete()?;
        self.persist(job).await
    }

    /// Move to `status` and persist before the step runs.
    async fn checkpoint(
        &self,
        job: &mut Job,
        ctx: &StageContext,
        status: JobStatus,
        progress: f32,
    ) -> Result<()> {
        if ctx.cancellation.is_cancelled() {
            return Err(Error::Cancelled("pipeline".into()));
        }
        job.advance(status, progress)?;
        self.persist(job).await?;
        tracing::info!(job_id = %job.id, %status, progress = job.progress, "Checkpoint");
        Ok(())
    }

    /// Write `job` through the store on the blocking pool. On failure `job`
    /// is left as it was.
    async fn persist(&self, job: &mut Job) -> Result<()> {
        let store = self.store.clone();
        let mut next = job.clone();
        *job = blocking(move || store.update(&mut next).map(|()| next)).await?;
        Ok(())
    }

    /// Run one stage under the per-stage ceiling, tagging any failure with
    /// the stage name and its effective severity.
    async fn run_stage(
        &self,
        stage: &dyn Stage,
        ctx: &StageContext,
        input: StageInput,
    ) -> Result<StageOutput> {
        if ctx.cancellation.is_cancelled() {
            return Err(Error::Cancelled(stage.name().into()));
        }

        let limit = ctx.stage_timeout();
        let started = Instant::now();
        tracing::info!(job_id = %ctx.job_id, stage = stage.name(), "Starting stage");

        let result = match tokio::time::timeout(limit, stage.run(ctx, input)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ProcessTimeout {
                tool: stage.name().to_string(),
                timeout: limit,
            }),
        };

        match result {
            Ok(out) => {
                tracing::info!(
                    job_id = %ctx.job_id,
                    stage = stage.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "{}",
                    out.summary
                );
                Ok(out)
            }
            Err(e @ Error::Cancelled(_)) => Err(e),
            // Running past the ceiling fails the job whatever the stage is.
            Err(e) if e.is_timeout() => Err(Error::stage(stage.name(), Severity::Hard, &e)),
            Err(e) => Err(Error::stage(stage.name(), stage.severity(), &e)),
        }
    }

    /// Persist the failure. Errors here are logged; there is nowhere left to
    /// report them.
    async fn mark_failed(&self, job: &mut Job, err: &Error) {
        let message = err.to_string();
        tracing::error!(job_id = %job.id, status = %job.status, "Job failed: {message}");

        // Fall back to the last persisted snapshot so fields set after it
        // (e.g. an artifact path from a step whose checkpoint failed) do not
        // leak into the error record.
        let validation = job.validation.take();
        if let Ok(stored) = self.store.get(job.id) {
            *job = stored;
        }
        if validation.is_some() {
            job.validation = validation;
        }

        if let Err(e) = job.fail(message) {
            tracing::error!(job_id = %job.id, "Cannot mark job failed: {e}");
            return;
        }
        if let Err(e) = self.persist(job).await {
            tracing::error!(job_id = %job.id, "Failed to persist error status: {e}");
        }
    }
}

/// Swallow a soft stage failure with a warning.
fn soft(ctx: &StageContext, result: Result<StageOutput>) -> Result<Option<StageOutput>> {
    match result {
        Ok(out) => Ok(Some(out)),
        Err(Error::Stage {
            stage,
            severity: Severity::Soft,
            message,
        }) => {
            tracing::warn!(job_id = %ctx.job_id, stage, "Optional stage failed: {message}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
