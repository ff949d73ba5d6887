// tuneup-core/src/lib.rs

//! The core logic for the chromatic instrument tuner.
//! This crate maps detected pitches onto the notes of a tuning scheme,
//! measures their deviation in cents and drives the per-frame detection
//! loop. It is completely headless and contains no rendering code.

#[cfg(feature = "capture")]
pub mod audio;
pub mod config;
pub mod detector;
pub mod driver;
pub mod error;
pub mod fft;
pub mod pitch;
pub mod source;
pub mod tuning;
pub mod volume;

pub use config::{DropoutPolicy, TunerConfig};
pub use driver::{Driver, DriverState, ScheduledTick, TunerDisplay};
pub use error::{Result, TunerError};
pub use source::{AudioSource, Sample};
pub use tuning::{TuningCatalog, TuningScheme};

/// The result of evaluating one sample against the active tuning scheme.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Reading {
    /// The accepted note, if the pitch fell inside its capture window.
    pub note: Option<String>,
    /// Deviation from the note's reference in cents (positive = sharp).
    pub cents: f32,
    /// Whether the pitch is within the in-tune tolerance of the note.
    pub in_tune: bool,
    /// The pitch the reading was computed from, when the sample was captured.
    pub frequency: Option<f32>,
    /// Whether the sample passed the frequency, confidence and volume gate.
    pub capturing: bool,
}

impl Reading {
    /// Cents clamped to the displayed range of `±capture_range_cents / 2`.
    pub fn needle_cents(&self, capture_range_cents: f32) -> f32 {
        pitch::clamp_cents(self.cents, capture_range_cents)
    }
}
