//! Unified error type for splatforge.
//!
//! All crates funnel their failures into [`Error`]. Process failures keep the
//! tail of the tool's own output so the innermost diagnostic survives all the
//! way up to the job's `error_message`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// How a stage failure affects its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The job fails and no later stage runs.
    Hard,
    /// The failure is logged; the job carries on.
    Soft,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Hard => f.write_str("hard"),
            Severity::Soft => f.write_str("soft"),
        }
    }
}

/// Unified error type covering all failure modes in splatforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Input failed pre-flight validation.
    #[error("Video validation failed: {0}")]
    Validation(String),

    /// A status change that the job state machine does not allow.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// An external process exited unsuccessfully.
    #[error("{tool} exited with {}: {log_tail}", exit_label(.code))]
    ProcessExit {
        tool: String,
        /// Exit code, `None` when the process was killed by a signal.
        code: Option<i32>,
        /// Last lines of the process output.
        log_tail: String,
    },

    /// An external process exceeded its time limit and was killed.
    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    ProcessTimeout { tool: String, timeout: Duration },

    /// Work was cancelled by host shutdown.
    #[error("{0} cancelled")]
    Cancelled(String),

    /// An external tool could not be found, spawned or understood.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// No file matching the expected output was produced.
    #[error("no {wanted} found under {}; directory contains [{}]", .dir.display(), .listing.join(", "))]
    ArtifactNotFound {
        dir: PathBuf,
        wanted: String,
        /// Every file found under `dir`, relative to it.
        listing: Vec<String>,
    },

    /// A pipeline stage failed.
    #[error("{stage} failed: {message}")]
    Stage {
        stage: String,
        severity: Severity,
        message: String,
    },

    /// The persisted job store could not be read at all.
    #[error("job store {} is corrupt: {message}", .path.display())]
    StoreCorrupt { path: PathBuf, message: String },

    /// Persisting the job store failed. In-memory state is unchanged.
    #[error("failed to write job store {}: {source}", .path.display())]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "signal".to_string(),
    }
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Wrap `cause` as a failure of `stage`.
    ///
    /// A cause that is already a [`Error::Stage`] keeps its message so that
    /// nesting never produces `"a failed: b failed: ..."` chains.
    pub fn stage(stage: impl Into<String>, severity: Severity, cause: &Error) -> Self {
        let message = match cause {
            Error::Stage { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Error::Stage {
            stage: stage.into(),
            severity,
            message,
        }
    }

    /// Whether this error came from a process being killed for running too long.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ProcessTimeout { .. })
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
