//! Application context.
//!
//! [`AppContext`] is built once at startup and handed to everything that
//! needs shared infrastructure. It wraps the job store, discovered tools and
//! the prober/provisioner seams in `Arc`s, and owns the shutdown token and
//! the tracker for running pipeline tasks.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use sf_av::tools::FFPROBE;
use sf_av::{FfprobeProber, LocalProvisioner, Prober, Provisioner, ToolRegistry};
use sf_core::config::Config;
use sf_core::Result;
use sf_pipeline::{Orchestrator, Validator};
use sf_store::JobStore;

/// Shared application state.
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<JobStore>,
    pub tools: Arc<ToolRegistry>,
    pub prober: Arc<dyn Prober>,
    pub provisioner: Arc<dyn Provisioner>,
    /// Cancelled by [`shutdown`](Self::shutdown); every supervised process
    /// watches it.
    pub shutdown: CancellationToken,
    /// Pipeline tasks spawned by the runner.
    pub tasks: TaskTracker,
}

impl AppContext {
    /// Create the storage layout, open the job store and discover tools.
    pub fn build(config: Config) -> Result<Self> {
        config.storage.ensure_dirs()?;
        let store = JobStore::open(config.storage.jobs_file())?;

        let unfinished = store.unfinished();
        if !unfinished.is_empty() {
            tracing::warn!(
                count = unfinished.len(),
                "Jobs from a previous run were interrupted and remain in their last status"
            );
            for job in &unfinished {
                tracing::warn!(job_id = %job.id, status = %job.status, "Interrupted job");
            }
        }

        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let ffprobe = match tools.require(FFPROBE) {
            Ok(tool) => tool.path.clone(),
            Err(e) => {
                tracing::warn!("{e}; input validation will reject every video");
                PathBuf::from(FFPROBE)
            }
        };
        let prober: Arc<dyn Prober> = Arc::new(FfprobeProber::new(ffprobe));
        let provisioner: Arc<dyn Provisioner> = Arc::new(LocalProvisioner::new(
            tools.clone(),
            config.tools.trainer_repo.clone(),
        ));

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            tools,
            prober,
            provisioner,
        ))
    }

    /// Assemble a context from already-built parts.
    pub fn from_parts(
        config: Config,
        store: Arc<JobStore>,
        tools: Arc<ToolRegistry>,
        prober: Arc<dyn Prober>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            tools,
            prober,
            provisioner,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// An orchestrator wired to this context, with the built-in stages.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.store.clone(),
            self.config.clone(),
            self.tools.clone(),
            self.provisioner.clone(),
        )
        .with_validator(Validator::new(
            self.prober.clone(),
            self.config.validation.clone(),
        ))
    }

    /// Kill running supervisors and wait for every pipeline task to return.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down; cancelling running jobs");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("All pipeline tasks finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_creates_storage_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().join("storage");

        let ctx = AppContext::build(config).unwrap();
        for sub in ["uploads", "frames", "models", "logs"] {
            assert!(dir.path().join("storage").join(sub).is_dir(), "{sub}");
        }
        assert_eq!(
            ctx.store.path(),
            Some(dir.path().join("storage/logs/jobs.json").as_path())
        );

        ctx.shutdown().await;
        assert!(ctx.shutdown.is_cancelled());
    }
}
