//! # Volume Metering Module
//!
//! Converts a raw frame into the normalized 0-100 % loudness the tuner
//! uses to decide whether anything is being played at all.

use serde::{Deserialize, Serialize};

/// Decibel bounds that map onto 0 % and 100 %.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeRange {
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for VolumeRange {
    fn default() -> Self {
        Self {
            min_db: -48.0,
            max_db: -12.0,
        }
    }
}

/// Root mean square of a frame. Zero for an empty frame.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Level in dBFS. Silence is negative infinity.
pub fn rms_to_db(rms: f32) -> f32 {
    if rms <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

/// Normalizes a dB level into `[0, 100]` between the range bounds.
pub fn volume_percent(db: f32, range: VolumeRange) -> f32 {
    if db.is_nan() {
        return 0.0;
    }
    let normalized = (db - range.min_db) / (range.max_db - range.min_db);
    normalized.clamp(0.0, 1.0) * 100.0
}
