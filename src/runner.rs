//! Job submission and concurrent execution.
//!
//! Every submitted job runs in its own tokio task, at most
//! `processing.max_concurrent_jobs` at a time. The pipeline itself runs in a
//! nested task so a panic inside a stage is caught as a `JoinError` and
//! recorded on that job alone.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sf_av::JobWorkspace;
use sf_core::{Error, Job, JobId, QualityPreset, Result};
use sf_pipeline::Orchestrator;
use sf_store::JobStore;

use crate::context::AppContext;

/// Accepts videos and drives them through the pipeline in the background.
pub struct JobRunner {
    ctx: Arc<AppContext>,
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
    running: Arc<Mutex<HashMap<JobId, JoinHandle<Result<Job>>>>>,
}

impl JobRunner {
    /// A runner using the context's built-in orchestrator.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let orchestrator = ctx.orchestrator();
        Self::with_orchestrator(ctx, orchestrator)
    }

    /// A runner using a custom orchestrator.
    pub fn with_orchestrator(ctx: Arc<AppContext>, orchestrator: Orchestrator) -> Self {
        let permits = Arc::new(Semaphore::new(
            ctx.config.processing.max_concurrent_jobs.max(1),
        ));
        Self {
            ctx,
            orchestrator: Arc::new(orchestrator),
            permits,
            running: Arc::default(),
        }
    }

    /// Store a copy of `input` under `uploads/` and start processing it.
    ///
    /// Returns the job as created, in `Uploaded`.
    pub async fn submit(&self, input: &Path, preset: QualityPreset) -> Result<Job> {
        if !input.is_file() {
            return Err(Error::not_found("video", input.display()));
        }
        let source_filename = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| input.display().to_string());

        let mut job = {
            let (store, path) = (self.ctx.store.clone(), input.to_path_buf());
            tokio::task::spawn_blocking(move || store.create(path, source_filename, preset))
                .await
                .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))??
        };
        let stored = JobWorkspace::new(&self.ctx.config.storage, job.id).input_path(input);

        let copy = {
            let (from, to) = (input.to_path_buf(), stored.clone());
            tokio::task::spawn_blocking(move || std::fs::copy(from, to))
                .await
                .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))?
        };
        if let Err(e) = copy {
            let err = Error::from(e);
            job.fail(format!("Failed to store upload: {err}"))?;
            persist(&self.ctx.store, job).await?;
            return Err(err);
        }

        job.input = stored;
        let job = persist(&self.ctx.store, job).await?;
        tracing::info!(
            job_id = %job.id,
            source = %job.source_filename,
            preset = %preset,
            "Job submitted"
        );

        self.spawn(job.clone());
        Ok(job)
    }

    /// Start processing an existing job in the background.
    ///
    /// The task drops its own entry when it finishes, so a host that never
    /// calls [`wait`](Self::wait) does not accumulate handles.
    pub fn spawn(&self, job: Job) {
        let id = job.id;
        let store = self.ctx.store.clone();
        let orchestrator = self.orchestrator.clone();
        let permits = self.permits.clone();
        let cancel = self.ctx.shutdown.clone();
        let running = self.running.clone();

        // Held until the handle is inserted, so the task cannot remove its
        // entry before it exists.
        let mut map = self.running.lock();
        let handle = self.ctx.tasks.spawn(async move {
            let result = run_job(id, job, store, orchestrator, permits, cancel).await;
            running.lock().remove(&id);
            result
        });
        map.insert(id, handle);
    }

    /// Wait for a job started by this runner to finish and return its final
    /// state. Jobs no longer running here are read from the store.
    pub async fn wait(&self, id: JobId) -> Result<Job> {
        let handle = self.running.lock().remove(&id);
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Internal(format!("job task join error: {e}")))?,
            None => self.ctx.store.get(id),
        }
    }

    /// Current persisted state of a job.
    pub fn status(&self, id: JobId) -> Result<Job> {
        self.ctx.store.get(id)
    }

    /// Ids of jobs started by this runner that are still running.
    pub fn pending(&self) -> Vec<JobId> {
        self.running.lock().keys().copied().collect()
    }
}

async fn run_job(
    id: JobId,
    job: Job,
    store: Arc<JobStore>,
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
) -> Result<Job> {
    let _permit = tokio::select! {
        permit = permits.acquire_owned() => permit.ok(),
        _ = cancel.cancelled() => {
            tracing::info!(job_id = %id, "Shutdown before job started");
            return store.get(id);
        }
    };

    let pipeline = tokio::spawn(async move { orchestrator.process(job, cancel).await });
    match pipeline.await {
        Ok(job) => Ok(job),
        Err(e) => {
            tracing::error!(job_id = %id, "Pipeline task failed: {e}");
            let message = if e.is_panic() {
                "Internal error: pipeline task panicked".to_string()
            } else {
                format!("Internal error: pipeline task {e}")
            };
            tokio::task::spawn_blocking(move || record_crash(&store, id, message))
                .await
                .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))?
        }
    }
}

/// Write `job` through the store on the blocking pool.
async fn persist(store: &Arc<JobStore>, mut job: Job) -> Result<Job> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.update(&mut job).map(|()| job))
        .await
        .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))?
}

/// Mark a job whose pipeline task died as failed.
fn record_crash(store: &JobStore, id: JobId, message: String) -> Result<Job> {
    let mut job = store.get(id)?;
    if job.is_terminal() {
        return Ok(job);
    }
    job.fail(message)?;
    store.update(&mut job)?;
    Ok(job)
}
