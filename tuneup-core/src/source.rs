//! # Audio Source Module
//!
//! The boundary between the tuner and whatever produces sound. The driver
//! only ever sees an [`AudioSource`]: something that can be opened, asked
//! for the latest [`Sample`] once per tick and closed again.

use crate::detector::PitchDetector;
use crate::error::{Result, TunerError};
use crate::volume::{self, VolumeRange};

/// Audio buffer size for processing frames.
///
/// Larger buffers provide more frequency resolution but increase latency.
pub const BUFFER_SIZE: usize = 2048;

/// What the audio pipeline reports for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    /// Fundamental estimate in Hz, or `None` when nothing was detected.
    pub frequency: Option<f32>,
    /// Estimator confidence in `[0, 1]`.
    pub confidence: f32,
    /// Normalized loudness in `[0, 100]`.
    pub volume_percent: f32,
}

impl Sample {
    /// Estimates pitch and loudness of one frame.
    pub fn from_frame(frame: &[f32], detector: &PitchDetector, range: VolumeRange) -> Self {
        let estimate = detector.estimate(frame);
        Self {
            frequency: estimate.map(|e| e.frequency),
            confidence: estimate.map_or(0.0, |e| e.confidence),
            volume_percent: volume::volume_percent(volume::rms_to_db(volume::rms(frame)), range),
        }
    }
}

/// An input the driver can listen to.
pub trait AudioSource {
    /// Acquires the input. Called once per `start()`, before the first tick.
    ///
    /// Returns the human-readable device label, when there is one.
    ///
    /// # Errors
    /// * `AudioUnavailable` - the input cannot be acquired
    fn open(&mut self) -> Result<Option<String>>;

    /// Latest sample. Called once per tick while listening.
    ///
    /// # Errors
    /// * `AudioUnavailable` - the input went away; the driver returns to idle
    fn sample(&mut self) -> Result<Sample>;

    /// Releases the input. Called once per `stop()`.
    fn close(&mut self);
}

/// A generated sine tone run through the real estimator.
///
/// Useful to exercise the whole loop without a microphone.
#[derive(Debug)]
pub struct SyntheticTone {
    frequency: f32,
    amplitude: f32,
    phase: f32,
    detector: PitchDetector,
    range: VolumeRange,
    frame: Vec<f32>,
    open: bool,
}

impl SyntheticTone {
    pub const SAMPLE_RATE: u32 = 44_100;

    pub fn new(frequency: f32, amplitude: f32, range: VolumeRange) -> Self {
        Self {
            frequency,
            amplitude,
            phase: 0.0,
            detector: PitchDetector::new(BUFFER_SIZE, Self::SAMPLE_RATE, 0.01),
            range,
            frame: vec![0.0; BUFFER_SIZE],
            open: false,
        }
    }

    /// Changes the generated pitch, e.g. to simulate turning a peg.
    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
    }

    fn fill_frame(&mut self) {
        let step = std::f32::consts::TAU * self.frequency / Self::SAMPLE_RATE as f32;
        for sample in self.frame.iter_mut() {
            *sample = self.amplitude * self.phase.sin();
            self.phase = (self.phase + step) % std::f32::consts::TAU;
        }
    }
}

impl AudioSource for SyntheticTone {
    fn open(&mut self) -> Result<Option<String>> {
        self.open = true;
        self.phase = 0.0;
        Ok(Some(format!("Synthetic tone ({:.2} Hz)", self.frequency)))
    }

    fn sample(&mut self) -> Result<Sample> {
        if !self.open {
            return Err(TunerError::AudioUnavailable("synthetic tone is closed".into()));
        }
        self.fill_frame();
        Ok(Sample::from_frame(&self.frame, &self.detector, self.range))
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_is_detected_and_loud() {
        let mut tone = SyntheticTone::new(220.0, 0.5, VolumeRange::default());
        assert_eq!(tone.open().unwrap().as_deref(), Some("Synthetic tone (220.00 Hz)"));
        let sample = tone.sample().unwrap();
        let frequency = sample.frequency.unwrap();
        assert!((frequency - 220.0).abs() < 1.0, "{sample:?}");
        assert!(sample.confidence > 0.96);
        // 0.5 amplitude sine is about -9 dBFS, above the -12 dB ceiling.
        assert_eq!(sample.volume_percent, 100.0);
    }

    #[test]
    fn closed_tone_is_unavailable() {
        let mut tone = SyntheticTone::new(220.0, 0.5, VolumeRange::default());
        assert!(matches!(tone.sample(), Err(TunerError::AudioUnavailable(_))));
        tone.open().unwrap();
        assert!(tone.sample().is_ok());
        tone.close();
        assert!(tone.sample().is_err());
    }

    #[test]
    fn silent_frame_has_no_pitch_and_no_volume() {
        let detector = PitchDetector::new(BUFFER_SIZE, 44_100, 0.01);
        let sample = Sample::from_frame(&[0.0; BUFFER_SIZE], &detector, VolumeRange::default());
        assert_eq!(sample.frequency, None);
        assert_eq!(sample.confidence, 0.0);
        assert_eq!(sample.volume_percent, 0.0);
    }
}
