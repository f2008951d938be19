//! # sf-store
//!
//! Durable job store.
//!
//! [`JobStore`] keeps every job in memory behind a [`RwLock`] and mirrors the
//! whole set to a single JSON file (`{ "<id>": job, ... }`) on every write.
//! Writes go to a temp file in the same directory, are fsynced, then renamed
//! over the durable file, so a crash leaves either the old or the new
//! snapshot and never a torn one. A single writer mutex serializes updates;
//! readers never wait on disk I/O.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tempfile::NamedTempFile;

use sf_core::{Error, Job, JobId, JobStatus, QualityPreset, Result};

/// Persistent map of job id to job.
#[derive(Debug)]
pub struct JobStore {
    /// Durable file. `None` keeps everything in memory.
    path: Option<PathBuf>,
    jobs: RwLock<HashMap<JobId, Job>>,
    write_lock: Mutex<()>,
}

impl JobStore {
    /// Open (or create) a store backed by `path`.
    ///
    /// Entries that fail to deserialize are skipped with a warning. A file
    /// that is not a JSON object at all is rejected rather than silently
    /// replaced.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let jobs = if path.exists() {
            load_jobs(&path)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            HashMap::new()
        };

        tracing::info!(path = %path.display(), jobs = jobs.len(), "Opened job store");

        Ok(Self {
            path: Some(path),
            jobs: RwLock::new(jobs),
            write_lock: Mutex::new(()),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            jobs: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Allocate a new job in `Uploaded` and persist it.
    pub fn create(
        &self,
        input: impl Into<PathBuf>,
        source_filename: impl Into<String>,
        preset: QualityPreset,
    ) -> Result<Job> {
        let job = Job::new(input, source_filename, preset);

        let _guard = self.write_lock.lock();
        let mut snapshot = self.jobs.read().clone();
        snapshot.insert(job.id, job.clone());
        self.persist(&snapshot)?;
        self.jobs.write().insert(job.id, job.clone());

        tracing::debug!(job_id = %job.id, preset = %job.preset, "Created job");
        Ok(job)
    }

    pub fn get(&self, id: JobId) -> Result<Job> {
        self.jobs
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("job", id))
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Jobs that were left in a non-terminal status.
    pub fn unfinished(&self) -> Vec<Job> {
        self.list()
            .into_iter()
            .filter(|j| !j.is_terminal())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Persist `job` and refresh its `updated_at`.
    ///
    /// The change is checked against the stored copy: the status transition
    /// must be legal, the stored job must not be terminal, and `preset` and
    /// `created_at` must be unchanged. Progress is never lowered. The full
    /// snapshot is durable before this returns; if writing fails, neither the
    /// in-memory state nor `job.updated_at` changes.
    pub fn update(&self, job: &mut Job) -> Result<()> {
        let _guard = self.write_lock.lock();

        let current = self.get(job.id)?;
        if !current.status.can_transition_to(job.status) {
            return Err(Error::InvalidTransition {
                from: current.status,
                to: job.status,
            });
        }
        if job.preset != current.preset {
            return Err(Error::Internal(format!(
                "job {} preset is immutable ({} -> {})",
                job.id, current.preset, job.preset
            )));
        }
        if job.created_at != current.created_at {
            return Err(Error::Internal(format!(
                "job {} created_at is immutable",
                job.id
            )));
        }

        let mut next = job.clone();
        next.set_progress(current.progress);
        next.check_consistency()?;

        let now = Utc::now();
        next.updated_at = if now > current.updated_at {
            now
        } else {
            current.updated_at + Duration::microseconds(1)
        };

        let mut snapshot = self.jobs.read().clone();
        snapshot.insert(next.id, next.clone());
        self.persist(&snapshot)?;
        self.jobs.write().insert(next.id, next.clone());

        if next.status == JobStatus::Error {
            tracing::debug!(job_id = %next.id, error = ?next.error_message, "Persisted failed job");
        } else {
            tracing::debug!(
                job_id = %next.id,
                status = %next.status,
                progress = next.progress,
                "Persisted job"
            );
        }

        *job = next;
        Ok(())
    }

    fn persist(&self, snapshot: &HashMap<JobId, Job>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let ordered: BTreeMap<String, &Job> =
            snapshot.iter().map(|(id, job)| (id.to_string(), job)).collect();
        let json = serde_json::to_vec_pretty(&ordered)
            .map_err(|e| Error::Internal(format!("failed to serialize job store: {e}")))?;

        write_atomic(path, &json).map_err(|source| Error::StoreWrite {
            path: path.clone(),
            source,
        })
    }
}

fn load_jobs(path: &Path) -> Result<HashMap<JobId, Job>> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        tracing::warn!(path = %path.display(), "Job store file is empty; starting fresh");
        return Ok(HashMap::new());
    }

    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| Error::StoreCorrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let serde_json::Value::Object(entries) = value else {
        return Err(Error::StoreCorrupt {
            path: path.to_path_buf(),
            message: "top-level value is not an object".into(),
        });
    };

    let mut jobs = HashMap::with_capacity(entries.len());
    for (key, entry) in entries {
        match serde_json::from_value::<Job>(entry) {
            Ok(job) => {
                if job.id.to_string() != key {
                    tracing::warn!(key = %key, job_id = %job.id, "Job store key does not match job id; using job id");
                }
                jobs.insert(job.id, job);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping corrupt job store entry");
            }
        }
    }
    Ok(jobs)
}

/// Write `bytes` to `path` via fsynced temp file and rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    #[cfg(unix)]
    {
        if let Err(e) = std::fs::File::open(dir).and_then(|d| d.sync_all()) {
            tracing::warn!(dir = %dir.display(), "Failed to fsync job store directory: {e}");
        }
    }

    Ok(())
}
