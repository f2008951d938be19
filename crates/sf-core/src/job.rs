//! The job entity and its status state machine.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::JobId;
use crate::preset::{PresetConfig, QualityPreset};

/// Where a job is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Validating,
    ExtractingFrames,
    Training,
    Exporting,
    Compressing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Validating => "validating",
            JobStatus::ExtractingFrames => "extracting_frames",
            JobStatus::Training => "training",
            JobStatus::Exporting => "exporting",
            JobStatus::Compressing => "compressing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    /// `Completed` and `Error` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Staying in the same non-terminal status is allowed so progress can be
    /// reported within a stage.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        if self.is_terminal() {
            return false;
        }
        if next == Error || next == *self {
            return true;
        }
        matches!(
            (self, next),
            (Uploaded, Validating)
                | (Uploaded, ExtractingFrames)
                | (Validating, ExtractingFrames)
                | (ExtractingFrames, Training)
                | (Training, Exporting)
                | (Exporting, Compressing)
                | (Exporting, Completed)
                | (Compressing, Completed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of pre-flight input checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub file_size: u64,
    pub estimated_frames: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A single video-to-model processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Original file name as supplied by the caller.
    pub source_filename: String,
    /// Stored copy of the input video.
    pub input: PathBuf,
    pub preset: QualityPreset,
    pub progress: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    /// Primary output (`<id>.ply`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// Gzip-compressed copy of the primary output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_compressed: Option<PathBuf>,
    /// Vertex-only OBJ export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_mesh: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        input: impl Into<PathBuf>,
        source_filename: impl Into<String>,
        preset: QualityPreset,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Uploaded,
            source_filename: source_filename.into(),
            input: input.into(),
            preset,
            progress: 0.0,
            error_message: None,
            validation: None,
            artifact: None,
            artifact_compressed: None,
            artifact_mesh: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn preset_config(&self) -> PresetConfig {
        self.preset.config()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Raise progress, clamped to `[0, 1]`. Lower values are ignored.
    pub fn set_progress(&mut self, progress: f32) {
        let p = progress.clamp(0.0, 1.0);
        if p > self.progress {
            self.progress = p;
        }
    }

    /// Move to `next` and raise progress to at least `progress`.
    pub fn advance(&mut self, next: JobStatus, progress: f32) -> Result<()> {
        if next == JobStatus::Error {
            return Err(Error::Internal(
                "use Job::fail to move a job into the error state".into(),
            ));
        }
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.set_progress(progress);
        Ok(())
    }

    /// Mark the job failed. An empty message is replaced so the error state
    /// always explains itself.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        if !self.status.can_transition_to(JobStatus::Error) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: JobStatus::Error,
            });
        }
        let message = message.into();
        let message = if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        };
        self.status = JobStatus::Error;
        self.error_message = Some(message);
        Ok(())
    }

    /// Mark the job completed. Requires the primary artifact to be set.
    pub fn complete(&mut self) -> Result<()> {
        if self.artifact.is_none() {
            return Err(Error::Internal(format!(
                "job {} cannot complete without an artifact",
                self.id
            )));
        }
        self.advance(JobStatus::Completed, 1.0)
    }

    /// Check the invariants that must hold for any persisted job.
    pub fn check_consistency(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.progress) {
            return Err(Error::Internal(format!(
                "job {} progress {} out of range",
                self.id, self.progress
            )));
        }
        match (self.status, &self.error_message) {
            (JobStatus::Error, None) => Err(Error::Internal(format!(
                "job {} is in error state without a message",
                self.id
            ))),
            (JobStatus::Error, Some(m)) if m.is_empty() => Err(Error::Internal(format!(
                "job {} has an empty error message",
                self.id
            ))),
            (s, Some(_)) if s != JobStatus::Error => Err(Error::Internal(format!(
                "job {} has an error message but status {s}",
                self.id
            ))),
            (JobStatus::Completed, _) if self.artifact.is_none() => Err(Error::Internal(
                format!("job {} completed without an artifact", self.id),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("/tmp/in.mp4", "in.mp4", QualityPreset::Fast)
    }

    #[test]
    fn new_job_starts_uploaded() {
        let j = job();
        assert_eq!(j.status, JobStatus::Uploaded);
        assert_eq!(j.progress, 0.0);
        assert_eq!(j.created_at, j.updated_at);
        assert!(j.check_consistency().is_ok());
    }

    #[test]
    fn happy_path_transitions() {
        let mut j = job();
        j.advance(JobStatus::Validating, 0.05).unwrap();
        j.advance(JobStatus::ExtractingFrames, 0.1).unwrap();
        j.advance(JobStatus::Training, 0.3).unwrap();
        j.advance(JobStatus::Exporting, 0.85).unwrap();
        j.advance(JobStatus::Compressing, 0.92).unwrap();
        j.artifact = Some(PathBuf::from("/models/x.ply"));
        j.complete().unwrap();
        assert_eq!(j.status, JobStatus::Completed);
        assert_eq!(j.progress, 1.0);
    }

    #[test]
    fn optional_steps_may_be_skipped() {
        assert!(JobStatus::Uploaded.can_transition_to(JobStatus::ExtractingFrames));
        assert!(JobStatus::Exporting.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn stages_cannot_be_skipped() {
        let mut j = job();
        let err = j.advance(JobStatus::Training, 0.3).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(j.status, JobStatus::Uploaded);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut j = job();
        j.fail("boom").unwrap();
        assert!(j.advance(JobStatus::ExtractingFrames, 0.1).is_err());
        assert!(j.fail("again").is_err());
        assert_eq!(j.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn error_reachable_from_every_non_terminal_state() {
        for s in [
            JobStatus::Uploaded,
            JobStatus::Validating,
            JobStatus::ExtractingFrames,
            JobStatus::Training,
            JobStatus::Exporting,
            JobStatus::Compressing,
        ] {
            assert!(s.can_transition_to(JobStatus::Error), "{s}");
        }
    }

    #[test]
    fn empty_failure_message_is_replaced() {
        let mut j = job();
        j.fail("  ").unwrap();
        assert_eq!(j.error_message.as_deref(), Some("unknown error"));
    }

    #[test]
    fn progress_never_decreases() {
        let mut j = job();
        j.set_progress(0.5);
        j.set_progress(0.2);
        assert_eq!(j.progress, 0.5);
        j.set_progress(7.0);
        assert_eq!(j.progress, 1.0);
    }

    #[test]
    fn complete_requires_artifact() {
        let mut j = job();
        j.advance(JobStatus::ExtractingFrames, 0.1).unwrap();
        j.advance(JobStatus::Training, 0.3).unwrap();
        j.advance(JobStatus::Exporting, 0.85).unwrap();
        assert!(j.complete().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::ExtractingFrames).unwrap();
        assert_eq!(json, "\"extracting_frames\"");
    }

    #[test]
    fn consistency_rejects_stray_error_message() {
        let mut j = job();
        j.error_message = Some("left over".into());
        assert!(j.check_consistency().is_err());
    }
}
