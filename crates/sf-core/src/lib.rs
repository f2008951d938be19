//! sf-core: shared types, IDs, errors, presets and configuration.
//!
//! This crate is the foundational dependency for all other sf-* crates. It
//! owns the [`Job`] entity and its status state machine, the fixed
//! [`QualityPreset`] table, the unified [`Error`] type and the TOML-backed
//! [`config::Config`].

pub mod config;
pub mod error;
pub mod ids;
pub mod job;
pub mod preset;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result, Severity};
pub use ids::JobId;
pub use job::{Job, JobStatus, ValidationReport};
pub use preset::{PresetConfig, QualityPreset};
