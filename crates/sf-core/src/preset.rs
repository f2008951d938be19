//! Quality presets.
//!
//! A job stores only its [`QualityPreset`] identifier; the numeric settings
//! are resolved from a fixed table so every job with the same preset trains
//! the same way.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named speed/quality tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Fast,
    #[default]
    Balanced,
    Quality,
}

/// Numeric settings a preset resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresetConfig {
    /// Frames sampled per second of video.
    pub sampling_fps: f64,
    /// Training iterations.
    pub iterations: u32,
    /// Downscale factor passed to the trainer (1 = full resolution).
    pub resolution_divisor: u32,
    /// Fraction of sampled frames used to initialize the model.
    pub init_frame_ratio: f64,
    /// Rough wall-clock estimate shown to users.
    pub estimated_minutes: u32,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 3] = [
        QualityPreset::Fast,
        QualityPreset::Balanced,
        QualityPreset::Quality,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            QualityPreset::Fast => "fast",
            QualityPreset::Balanced => "balanced",
            QualityPreset::Quality => "quality",
        }
    }

    pub fn config(&self) -> PresetConfig {
        match self {
            QualityPreset::Fast => PresetConfig {
                sampling_fps: 1.0,
                iterations: 2000,
                resolution_divisor: 2,
                init_frame_ratio: 0.15,
                estimated_minutes: 5,
            },
            QualityPreset::Balanced => PresetConfig {
                sampling_fps: 2.0,
                iterations: 5000,
                resolution_divisor: 1,
                init_frame_ratio: 0.20,
                estimated_minutes: 10,
            },
            QualityPreset::Quality => PresetConfig {
                sampling_fps: 3.0,
                iterations: 12000,
                resolution_divisor: 1,
                init_frame_ratio: 0.25,
                estimated_minutes: 25,
            },
        }
    }
}

impl PresetConfig {
    /// Number of frames handed to the trainer's initializer, never below 2.
    pub fn init_frames(&self, frame_count: usize) -> usize {
        let n = (frame_count as f64 * self.init_frame_ratio).round() as usize;
        n.max(2)
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.id())
    }
}

impl FromStr for QualityPreset {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(QualityPreset::Fast),
            "balanced" => Ok(QualityPreset::Balanced),
            "quality" => Ok(QualityPreset::Quality),
            other => Err(crate::Error::Config(format!(
                "unknown preset '{other}' (expected fast, balanced or quality)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_values() {
        let fast = QualityPreset::Fast.config();
        assert_eq!(fast.sampling_fps, 1.0);
        assert_eq!(fast.iterations, 2000);
        assert_eq!(fast.resolution_divisor, 2);
        assert_eq!(fast.init_frame_ratio, 0.15);
        assert_eq!(fast.estimated_minutes, 5);

        let balanced = QualityPreset::Balanced.config();
        assert_eq!(balanced.sampling_fps, 2.0);
        assert_eq!(balanced.iterations, 5000);
        assert_eq!(balanced.resolution_divisor, 1);
        assert_eq!(balanced.init_frame_ratio, 0.20);
        assert_eq!(balanced.estimated_minutes, 10);

        let quality = QualityPreset::Quality.config();
        assert_eq!(quality.sampling_fps, 3.0);
        assert_eq!(quality.iterations, 12000);
        assert_eq!(quality.resolution_divisor, 1);
        assert_eq!(quality.init_frame_ratio, 0.25);
        assert_eq!(quality.estimated_minutes, 25);
    }

    #[test]
    fn default_is_balanced() {
        assert_eq!(QualityPreset::default(), QualityPreset::Balanced);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("FAST".parse::<QualityPreset>().unwrap(), QualityPreset::Fast);
        assert_eq!(" quality ".parse::<QualityPreset>().unwrap(), QualityPreset::Quality);
        assert!("ultra".parse::<QualityPreset>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_id() {
        let json = serde_json::to_string(&QualityPreset::Fast).unwrap();
        assert_eq!(json, "\"fast\"");
        let back: QualityPreset = serde_json::from_str("\"quality\"").unwrap();
        assert_eq!(back, QualityPreset::Quality);
    }

    #[test]
    fn init_frames_has_floor_of_two() {
        let cfg = QualityPreset::Fast.config();
        assert_eq!(cfg.init_frames(4), 2);
        assert_eq!(cfg.init_frames(100), 15);
    }
}
