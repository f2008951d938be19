//! # sf-pipeline
//!
//! Orchestration of the video-to-splat pipeline.
//!
//! This crate provides:
//!
//! - **[`Stage`]** trait -- a single pipeline step with a declared
//!   [`Severity`](sf_core::Severity).
//! - **[`StageContext`]** -- shared execution context (workspace, tools,
//!   provisioner, configuration, cancellation).
//! - **Built-in stages** ([`stages`]) -- frame extraction, training, PLY
//!   export, mesh export, compression.
//! - **[`Validator`]** -- pre-flight checks on the input video.
//! - **[`Orchestrator`]** -- runs a job through the stage table, persisting a
//!   checkpoint before each step and classifying failures as hard or soft.

pub mod context;
pub mod orchestrator;
pub mod stage;
pub mod stages;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at the crate root.
pub use context::StageContext;
pub use orchestrator::{Orchestrator, StageSet};
pub use stage::{Stage, StageInput, StageOutput};
pub use validate::Validator;
