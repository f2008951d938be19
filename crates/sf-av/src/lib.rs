//! # sf-av
//!
//! Video probing, external process supervision, output artifact handling and
//! tool management for the splatforge pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe and the Python interpreter.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   cancellation, process-group kill and log streaming.
//! - **Probing** ([`Prober`], [`FfprobeProber`]) -- duration, dimensions and
//!   frame rate of an input video.
//! - **Artifact resolution** ([`resolve_artifact`]) -- locate the file a tool
//!   actually produced.
//! - **Post-processing** ([`compress_gzip`], [`ply_to_obj`]).
//! - **Provisioning** ([`Provisioner`]) -- make sure a tool or the trainer
//!   checkout is present before a stage needs it.
//! - **Per-job paths** ([`JobWorkspace`]).

pub mod command;
pub mod compress;
pub mod mesh;
pub mod probe;
pub mod provision;
pub mod resolve;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{log_tail, Capture, ToolCommand, ToolOutput};
pub use compress::{compress_gzip, gzip_path_for, CompressionReport};
pub use mesh::ply_to_obj;
pub use probe::{FfprobeProber, Prober, VideoInfo};
pub use provision::{LocalProvisioner, Provisioner, TRAINER};
pub use resolve::{resolve_artifact, ArtifactQuery};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::JobWorkspace;
