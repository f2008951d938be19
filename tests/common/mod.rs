//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], a full [`AppContext`] rooted in a temp
//! directory with a fixed prober and stub provisioner, plus a few fake
//! stages for driving the runner without external tools.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use sf_av::{Prober, Provisioner, ToolRegistry, VideoInfo};
use sf_core::config::Config;
use sf_core::{Error, Job, JobId, Result, Severity};
use sf_pipeline::{Stage, StageContext, StageInput, StageOutput, StageSet};
use sf_store::JobStore;
use splatforge::{AppContext, JobRunner};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub ctx: Arc<AppContext>,
    pub dir: tempfile::TempDir,
}

impl TestHarness {
    /// Defaults, with a 30 second 1080p input reported by the prober.
    pub fn new() -> Self {
        Self::build(|_| {}, 30.0)
    }

    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        Self::build(configure, 30.0)
    }

    pub fn build(configure: impl FnOnce(&mut Config), video_secs: f64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().join("storage");
        configure(&mut config);
        config.storage.ensure_dirs().unwrap();

        let store = Arc::new(JobStore::open(config.storage.jobs_file()).unwrap());
        let ctx = AppContext::from_parts(
            config,
            store,
            Arc::new(ToolRegistry::default()),
            Arc::new(FixedProber(video_secs)),
            Arc::new(NoProvisioner),
        );

        Self {
            ctx: Arc::new(ctx),
            dir,
        }
    }

    /// Write a placeholder video outside the storage root.
    pub fn video(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("fake video {name}")).unwrap();
        path
    }

    /// A runner whose orchestrator uses `stages`.
    pub fn runner(&self, stages: StageSet) -> JobRunner {
        JobRunner::with_orchestrator(self.ctx.clone(), self.ctx.orchestrator().with_stages(stages))
    }

    /// Poll the store until `done` holds for job `id`.
    pub async fn wait_for(&self, id: JobId, done: impl Fn(&Job) -> bool) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let job = self.ctx.store.get(id).unwrap();
            if done(&job) {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting on job {id}, last status {}",
                job.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub struct FixedProber(pub f64);

#[async_trait]
impl Prober for FixedProber {
    fn name(&self) -> &'static str {
        "fixed"
    }
    async fn probe(&self, path: &Path) -> Result<VideoInfo> {
        Ok(VideoInfo {
            duration_secs: self.0,
            width: 1920,
            height: 1080,
            fps: 30.0,
            size_bytes: std::fs::metadata(path)?.len(),
        })
    }
}

pub struct NoProvisioner;

#[async_trait]
impl Provisioner for NoProvisioner {
    async fn ensure(&self, tool: &str) -> Result<PathBuf> {
        Err(Error::tool(tool, "not available in tests"))
    }
}

// ---------------------------------------------------------------------------
// Fake stages
// ---------------------------------------------------------------------------

/// `train` replaced, every other stage succeeding immediately.
pub fn stages_with_training(train: Arc<dyn Stage>) -> StageSet {
    StageSet {
        extract: Arc::new(Instant("Frame extraction")),
        train,
        export: Arc::new(Instant("Export")),
        mesh: Arc::new(Instant("Mesh export")),
        compress: Arc::new(Instant("Compression")),
    }
}

/// Succeeds at once, naming its output after itself.
pub struct Instant(pub &'static str);

#[async_trait]
impl Stage for Instant {
    fn name(&self) -> &'static str {
        self.0
    }
    async fn run(&self, _ctx: &StageContext, input: StageInput) -> Result<StageOutput> {
        Ok(StageOutput {
            artifact: input.output_dir.join(format!("{}.out", self.0)),
            summary: String::new(),
        })
    }
}

/// Sleeps while tracking how many instances run at once.
#[derive(Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait]
impl Stage for ConcurrencyProbe {
    fn name(&self) -> &'static str {
        "Training"
    }
    async fn run(&self, _ctx: &StageContext, input: StageInput) -> Result<StageOutput> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(StageOutput {
            artifact: input.output_dir.join("model.ply"),
            summary: String::new(),
        })
    }
}

/// Panics on its first call only.
#[derive(Default)]
pub struct PanicOnce {
    fired: AtomicBool,
}

#[async_trait]
impl Stage for PanicOnce {
    fn name(&self) -> &'static str {
        "Training"
    }
    async fn run(&self, _ctx: &StageContext, input: StageInput) -> Result<StageOutput> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            panic!("trainer bindings blew up");
        }
        Ok(StageOutput {
            artifact: input.output_dir.join("model.ply"),
            summary: String::new(),
        })
    }
}

/// Runs until the job is cancelled.
pub struct UntilCancelled;

#[async_trait]
impl Stage for UntilCancelled {
    fn name(&self) -> &'static str {
        "Training"
    }
    fn severity(&self) -> Severity {
        Severity::Hard
    }
    async fn run(&self, ctx: &StageContext, _input: StageInput) -> Result<StageOutput> {
        ctx.cancellation.cancelled().await;
        Err(Error::Cancelled(self.name().into()))
    }
}
