//! # Pitch Math Module
//!
//! Pure functions that turn a detected frequency into a note and a
//! deviation. Nothing here holds state; every call depends only on its
//! arguments.
//!
//! Cents are a logarithmic unit of pitch distance where:
//! - 100 cents = 1 semitone
//! - 1200 cents = 1 octave
//! - Positive values indicate sharpness, negative values indicate flatness
//!
//! Contract violations (non-positive frequencies) fail fast with
//! `InvalidFrequency`. A frequency that simply matches no note is `Ok(None)`.

use crate::config::TunerConfig;
use crate::error::{Result, TunerError};
use crate::source::Sample;
use crate::tuning::{TuningCatalog, TuningScheme};
use crate::Reading;

fn check_frequency(frequency: f32) -> Result<f32> {
    if frequency.is_finite() && frequency > 0.0 {
        Ok(frequency)
    } else {
        Err(TunerError::InvalidFrequency(frequency))
    }
}

/// Calculates the deviation of `frequency` from `reference` in cents.
///
/// # Errors
/// * `InvalidFrequency` - either argument is not finite or not above zero
pub fn hz_to_cents(frequency: f32, reference: f32) -> Result<f32> {
    let frequency = check_frequency(frequency)?;
    let reference = check_frequency(reference)?;
    Ok(1200.0 * (frequency / reference).log2())
}

/// Converts a deviation in cents back to a frequency around `reference`.
///
/// Inverse of [`hz_to_cents`] for a fixed reference.
pub fn cents_to_hz(cents: f32, reference: f32) -> f32 {
    reference * 2.0_f32.powf(cents / 1200.0)
}

/// Width in Hz of the acceptance window around `reference`.
///
/// The window is `capture_range_cents / 2` cents wide, measured upwards,
/// so it widens with the reference frequency.
pub fn capture_range_hz(reference: f32, capture_range_cents: f32) -> f32 {
    (cents_to_hz(capture_range_cents / 2.0, reference) - reference).abs()
}

/// Clamps a deviation to the displayed range of `±capture_range_cents / 2`.
pub fn clamp_cents(cents: f32, capture_range_cents: f32) -> f32 {
    let half = (capture_range_cents / 2.0).abs();
    cents.clamp(-half, half)
}

/// Finds the note of `scheme` closest to `frequency`, if the frequency
/// falls inside that note's capture window.
///
/// Notes are scanned in declaration order and the first one at the
/// smallest distance wins. The window boundary is inclusive. A zero-width
/// window accepts nothing.
///
/// # Errors
/// * `InvalidFrequency` - `frequency` is not finite or not above zero
pub fn closest_note<'a>(
    frequency: f32,
    scheme: &'a TuningScheme,
    capture_range_cents: f32,
) -> Result<Option<&'a str>> {
    let frequency = check_frequency(frequency)?;

    let mut closest = None;
    let mut smallest = f32::INFINITY;
    for note in scheme.iter() {
        let difference = (note.frequency - frequency).abs();
        if difference < smallest {
            smallest = difference;
            closest = Some(note);
        }
    }

    let Some(note) = closest else {
        return Ok(None);
    };

    let range_hz = capture_range_hz(note.frequency, capture_range_cents);
    if range_hz != 0.0 && smallest <= range_hz {
        Ok(Some(note.name.as_str()))
    } else {
        Ok(None)
    }
}

/// Evaluates one sample against the scheme registered under `mode`.
///
/// A sample is captured only when it has a positive frequency, a
/// confidence above `config.confidence_threshold` and a non-zero volume.
/// The in-tune flag uses the flat `config.in_tune_deviation_hz` tolerance,
/// so it is perceptually stricter for higher notes.
///
/// # Errors
/// * `UnknownMode` - `mode` is not in `catalog`
pub fn evaluate_reading(
    catalog: &TuningCatalog,
    mode: &str,
    sample: &Sample,
    config: &TunerConfig,
) -> Result<Reading> {
    let scheme = catalog.lookup(mode)?;

    let frequency = match sample.frequency {
        Some(f) if f.is_finite() && f > 0.0 => f,
        _ => return Ok(Reading::default()),
    };
    if sample.confidence <= config.confidence_threshold || sample.volume_percent == 0.0 {
        return Ok(Reading::default());
    }

    let mut reading = Reading {
        frequency: Some(frequency),
        capturing: true,
        ..Reading::default()
    };

    if let Some(note) = closest_note(frequency, scheme, config.capture_range_cents)? {
        // Present by construction: `note` came from this scheme.
        if let Some(reference) = scheme.get(note) {
            reading.cents = hz_to_cents(frequency, reference)?;
            reading.in_tune = (reference - frequency).abs() <= config.in_tune_deviation_hz;
            reading.note = Some(note.to_string());
        }
    }

    Ok(reading)
}
