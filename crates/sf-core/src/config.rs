//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries all
//! sub-configs for storage, processing, validation limits, tools and
//! compression. Every section defaults sensibly so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::preset::QualityPreset;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub processing: ProcessingConfig,
    pub validation: ValidationConfig,
    pub tools: ToolsConfig,
    pub compression: CompressionConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let v = &self.validation;

        if v.min_duration_secs >= v.max_duration_secs {
            warnings.push(format!(
                "validation.min_duration_secs ({}) is not below max_duration_secs ({})",
                v.min_duration_secs, v.max_duration_secs
            ));
        }
        if v.min_resolution > v.max_resolution {
            warnings.push(format!(
                "validation.min_resolution ({}) exceeds max_resolution ({})",
                v.min_resolution, v.max_resolution
            ));
        }
        if v.allowed_extensions.is_empty() {
            warnings.push("validation.allowed_extensions is empty; every input will be rejected".into());
        }
        for ext in &v.allowed_extensions {
            if !ext.starts_with('.') {
                warnings.push(format!(
                    "validation.allowed_extensions entry '{ext}' should start with '.'"
                ));
            }
        }

        if self.processing.stage_timeout_secs == 0 {
            warnings.push("processing.stage_timeout_secs is 0; every stage will time out".into());
        }
        if self.processing.max_concurrent_jobs == 0 {
            warnings.push("processing.max_concurrent_jobs is 0; treated as 1".into());
        }

        if self.compression.level > 9 {
            warnings.push(format!(
                "compression.level {} is out of range (0-9); clamped to 9",
                self.compression.level
            ));
        }

        if let Some(ref repo) = self.tools.trainer_repo {
            if !repo.join("train.py").exists() {
                warnings.push(format!(
                    "tools.trainer_repo {} does not contain train.py",
                    repo.display()
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// On-disk layout. Everything lives under a single root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
        }
    }
}

impl StorageConfig {
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// The durable job store.
    pub fn jobs_file(&self) -> PathBuf {
        self.logs_dir().join("jobs.json")
    }

    /// Create every storage directory.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.uploads_dir(),
            self.frames_dir(),
            self.models_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Pipeline behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub default_preset: QualityPreset,
    /// Run pre-flight validation before extracting frames.
    pub validate_input: bool,
    /// Write a vertex-only OBJ next to the PLY.
    pub export_mesh: bool,
    /// Hard ceiling for any single stage, in seconds.
    pub stage_timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    /// Remove extracted frames once a job finishes.
    pub cleanup_frames: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            default_preset: QualityPreset::default(),
            validate_input: true,
            export_mesh: false,
            stage_timeout_secs: 4 * 60 * 60,
            max_concurrent_jobs: 2,
            cleanup_frames: false,
        }
    }
}

/// Pre-flight validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    /// Shorter side must be at least this many pixels.
    pub min_resolution: u32,
    /// Longer side above this only warns.
    pub max_resolution: u32,
    pub min_fps_warning: f64,
    pub max_fps_warning: f64,
    pub max_file_size_bytes: u64,
    /// Fewest sampled frames the trainer can work with.
    pub min_frames: u64,
    pub max_frames_warning: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 3.0,
            max_duration_secs: 300.0,
            min_resolution: 360,
            max_resolution: 3840,
            min_fps_warning: 15.0,
            max_fps_warning: 60.0,
            max_file_size_bytes: 500 * 1024 * 1024,
            min_frames: 10,
            max_frames_warning: 500,
            allowed_extensions: vec![".mp4".into()],
        }
    }
}

/// Paths to external tools. Unset entries are looked up on `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub python_path: Option<PathBuf>,
    /// Checkout of the splat trainer (must contain `train.py`).
    pub trainer_repo: Option<PathBuf>,
}

/// Post-processing compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Gzip level, 0-9.
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
        }
    }
}
