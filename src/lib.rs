//! Splatforge - turns videos into Gaussian-splat point clouds.
//!
//! This library crate exposes the application wiring for the binary and for
//! integration testing.

pub mod config;
pub mod context;
pub mod runner;

pub use context::AppContext;
pub use runner::JobRunner;
