//! Pre-flight checks on an input video.
//!
//! Validation runs before any stage, so a rejected input never costs a
//! subprocess beyond the probe itself.

use std::path::Path;
use std::sync::Arc;

use sf_av::Prober;
use sf_core::config::ValidationConfig;
use sf_core::{PresetConfig, ValidationReport};

const MIB: f64 = 1024.0 * 1024.0;

/// Checks an input against [`ValidationConfig`] using a [`Prober`].
#[derive(Clone)]
pub struct Validator {
    prober: Arc<dyn Prober>,
    rules: ValidationConfig,
}

impl Validator {
    pub fn new(prober: Arc<dyn Prober>, rules: ValidationConfig) -> Self {
        Self { prober, rules }
    }

    /// Inspect `path` and report every problem found.
    ///
    /// Missing files, disallowed extensions and unreadable videos stop the
    /// checks early; everything else is collected so the user sees all
    /// problems at once.
    pub async fn validate(&self, path: &Path, preset: &PresetConfig) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !path.is_file() {
            report.errors.push("Video file not found".into());
            return report;
        }

        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default();
        if !self
            .rules
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
        {
            let shown = if ext.is_empty() { "(none)" } else { ext.as_str() };
            report.errors.push(format!(
                "Unsupported format: {shown}. Allowed: {}",
                self.rules.allowed_extensions.join(", ")
            ));
            return report;
        }

        let info = match self.prober.probe(path).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(prober = self.prober.name(), path = %path.display(), "Probe failed: {e}");
                report
                    .errors
                    .push("Could not read video file. File may be corrupted.".into());
                return report;
            }
        };

        report.duration_secs = info.duration_secs;
        report.width = info.width;
        report.height = info.height;
        report.fps = info.fps;
        report.file_size = info.size_bytes;
        report.estimated_frames = (info.duration_secs * preset.sampling_fps).max(0.0) as u64;

        let r = &self.rules;
        let errors = &mut report.errors;
        let warnings = &mut report.warnings;

        if info.duration_secs < r.min_duration_secs {
            errors.push(format!(
                "Video too short: {:.1}s. Minimum: {}s",
                info.duration_secs, r.min_duration_secs
            ));
        }
        if info.duration_secs > r.max_duration_secs {
            errors.push(format!(
                "Video too long: {:.1}s. Maximum: {}s",
                info.duration_secs, r.max_duration_secs
            ));
        }

        let min_dim = info.width.min(info.height);
        let max_dim = info.width.max(info.height);
        if min_dim < r.min_resolution {
            errors.push(format!(
                "Resolution too low: {}x{}. Minimum: {}p",
                info.width, info.height, r.min_resolution
            ));
        }
        if max_dim > r.max_resolution {
            warnings.push(format!(
                "High resolution video ({}x{}) will be downscaled for processing",
                info.width, info.height
            ));
        }
        if info.width % 2 != 0 || info.height % 2 != 0 {
            warnings.push("Video dimensions are odd; may cause encoding issues".into());
        }

        if info.fps < r.min_fps_warning {
            warnings.push(format!(
                "Low frame rate ({:.1} fps) may result in lower quality reconstruction",
                info.fps
            ));
        }
        if info.fps > r.max_fps_warning {
            warnings.push(format!(
                "High frame rate ({:.1} fps); frames will be sampled for efficiency",
                info.fps
            ));
        }

        if info.size_bytes > r.max_file_size_bytes {
            errors.push(format!(
                "File too large: {:.1}MB. Maximum: {:.0}MB",
                info.size_bytes as f64 / MIB,
                r.max_file_size_bytes as f64 / MIB
            ));
        }

        let frames = report.estimated_frames;
        if frames < r.min_frames {
            errors.push(format!(
                "Not enough frames for reconstruction. Video would produce only {frames} frames. Minimum: {}",
                r.min_frames
            ));
        }
        if frames > r.max_frames_warning {
            warnings.push(format!(
                "Large video ({frames} frames at {} fps). Consider using a shorter clip for faster processing.",
                preset.sampling_fps
            ));
        }

        for w in &report.warnings {
            tracing::warn!(path = %path.display(), "{w}");
        }
        report
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("prober", &self.prober.name())
            .field("rules", &self.rules)
            .finish()
    }
}
