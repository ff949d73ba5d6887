//! # Configuration Module
//!
//! Tuner settings that would otherwise be magic numbers: the capture
//! window, the confidence gate, the in-tune tolerance, volume
//! normalization bounds and the initial mode. Settings are loaded from a
//! JSON file; every field is optional and falls back to its default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, TunerError};
use crate::tuning::{self, TuningCatalog, TuningScheme};
use crate::volume::VolumeRange;

/// Accepted frame rates for the detection loop, in Hz.
pub const FRAME_RATE_RANGE_HZ: std::ops::RangeInclusive<f32> = 1.0..=1000.0;

/// What the driver shows while samples are not being captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropoutPolicy {
    /// Keep the last note, pitch and cents until the next captured sample.
    #[default]
    Hold,
    /// Clear note, pitch and cents on every non-capturing tick.
    Reset,
}

/// A user-defined scheme, as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeConfig {
    /// Mode id the scheme is registered under.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// `[note, frequency]` pairs in scan order.
    pub notes: Vec<(String, f32)>,
}

/// All tunable settings of the tuner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Full width of the cents window around a note; half of it on each side is accepted.
    pub capture_range_cents: f32,
    /// Samples at or below this estimator confidence are not captured.
    pub confidence_threshold: f32,
    /// Flat tolerance in Hz for the in-tune flag.
    pub in_tune_deviation_hz: f32,
    pub min_volume_db: f32,
    pub max_volume_db: f32,
    /// Initial tuning mode id.
    pub mode: String,
    pub dropout_policy: DropoutPolicy,
    /// Concert pitch of the built-in catalog.
    pub reference_a4_hz: f32,
    /// Evaluations per second; one per rendered frame.
    pub frame_rate_hz: f32,
    pub custom_schemes: Vec<SchemeConfig>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            capture_range_cents: 100.0,
            confidence_threshold: 0.96,
            in_tune_deviation_hz: 1.0,
            min_volume_db: -48.0,
            max_volume_db: -12.0,
            mode: tuning::CHROMATIC.to_string(),
            dropout_policy: DropoutPolicy::Hold,
            reference_a4_hz: tuning::DEFAULT_A4_HZ,
            frame_rate_hz: 60.0,
            custom_schemes: Vec::new(),
        }
    }
}

impl TunerConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: TunerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Checks ranges and orderings the rest of the crate relies on.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(TunerError::InvalidConfig(msg))
        }

        if !self.capture_range_cents.is_finite() || self.capture_range_cents < 0.0 {
            return invalid(format!(
                "capture_range_cents must be >= 0, got {}",
                self.capture_range_cents
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if !self.in_tune_deviation_hz.is_finite() || self.in_tune_deviation_hz < 0.0 {
            return invalid(format!(
                "in_tune_deviation_hz must be >= 0, got {}",
                self.in_tune_deviation_hz
            ));
        }
        if !(self.min_volume_db < self.max_volume_db) {
            return invalid(format!(
                "min_volume_db ({}) must be below max_volume_db ({})",
                self.min_volume_db, self.max_volume_db
            ));
        }
        if !self.reference_a4_hz.is_finite() || self.reference_a4_hz <= 0.0 {
            return invalid(format!(
                "reference_a4_hz must be > 0, got {}",
                self.reference_a4_hz
            ));
        }
        if !FRAME_RATE_RANGE_HZ.contains(&self.frame_rate_hz) {
            return invalid(format!(
                "frame_rate_hz must be within [{}, {}], got {}",
                FRAME_RATE_RANGE_HZ.start(),
                FRAME_RATE_RANGE_HZ.end(),
                self.frame_rate_hz
            ));
        }
        Ok(())
    }

    pub fn volume_range(&self) -> VolumeRange {
        VolumeRange {
            min_db: self.min_volume_db,
            max_db: self.max_volume_db,
        }
    }

    /// Builds the catalog this config describes and checks that the
    /// initial mode exists in it.
    pub fn build_catalog(&self) -> Result<Arc<TuningCatalog>> {
        let catalog = if self.reference_a4_hz == tuning::DEFAULT_A4_HZ
            && self.custom_schemes.is_empty()
        {
            TuningCatalog::builtin()
        } else {
            let mut builder = TuningCatalog::with_reference(self.reference_a4_hz)?.to_builder();
            for custom in &self.custom_schemes {
                let name = custom.name.clone().unwrap_or_else(|| custom.id.clone());
                let scheme = TuningScheme::new(name, custom.notes.iter().cloned())?;
                builder = builder.insert(custom.id.clone(), scheme)?;
            }
            Arc::new(builder.build())
        };

        catalog.lookup(&self.mode)?;
        Ok(catalog)
    }
}
