use clap::{Parser, Subcommand};
use sf_core::QualityPreset;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "splatforge")]
#[command(author, version, about = "Turn videos into Gaussian-splat point clouds")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconstruct one or more videos and wait for the results
    Process {
        /// Input videos
        #[arg(required = true)]
        videos: Vec<PathBuf>,

        /// Quality preset (fast, balanced, quality); defaults to the config
        #[arg(short, long)]
        preset: Option<QualityPreset>,

        /// Skip pre-flight validation of the inputs
        #[arg(long)]
        no_validate: bool,

        /// Also export an OBJ point mesh
        #[arg(long)]
        mesh: bool,
    },

    /// Show a job
    Status {
        /// Job id
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List all jobs, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the quality presets
    Presets,

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    ValidateConfig {
        /// Config file to validate (uses default search if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
