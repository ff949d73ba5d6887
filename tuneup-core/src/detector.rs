//! # Pitch Estimation Module
//!
//! The fundamental-frequency estimator that feeds the tuner. It uses the
//! YIN algorithm and reports how clear the detected period was as a
//! confidence in `[0, 1]`.
//!
//! ## Features
//! - YIN pitch detection with octave error prevention
//! - Amplitude gating to filter out silence
//! - Parabolic interpolation for sub-sample accuracy
//! - Spectrum refinement for improved precision

use crate::fft::SpectrumAnalyzer;

/// Frequencies below this are treated as undetected.
const MIN_FREQUENCY_HZ: f32 = 20.0;

/// A clear periodic tone leaves a dip deeper than this in the YIN buffer.
const CLARITY_THRESHOLD: f32 = 0.1;

/// One pitch estimate: the frequency and how sure the estimator is of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency: f32,
    /// `1 - d'(τ)` at the selected period; 1.0 for a perfectly periodic frame.
    pub confidence: f32,
}

/// Runs YIN on a frame.
///
/// # Arguments
/// * `signal` - Input audio frame
/// * `sample_rate` - Sample rate in Hz
/// * `amplitude_threshold` - Minimum RMS for pitch detection
///
/// # Returns
/// * `Some(estimate)` - Detected frequency and its confidence
/// * `None` - No pitch detected (silence, noise, or invalid signal)
pub fn detect_pitch_yin(
    signal: &[f32],
    sample_rate: u32,
    amplitude_threshold: f32,
) -> Option<PitchEstimate> {
    let half = signal.len() / 2;
    if half < 3 {
        return None;
    }
    let mut yin_buffer = vec![0.0; half];

    // --- Noise Gate: Calculate RMS to filter out silence/noise ---
    if crate::volume::rms(signal) < amplitude_threshold {
        return None;
    }

    // --- Step 1 & 2: Difference function and squared difference ---
    for tau in 1..half {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // --- Step 3: Cumulative mean normalized difference ---
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..half {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // --- Step 4: First significant dip, to avoid octave errors ---
    let min_val = yin_buffer
        .iter()
        .skip(1)
        .cloned()
        .fold(f32::INFINITY, f32::min);
    let threshold = min_val + 0.05;

    let mut period = 0;
    for tau in 2..half {
        if yin_buffer[tau] < threshold && yin_buffer[tau] < yin_buffer[tau - 1] {
            period = tau;
            break;
        }
    }
    if period == 0 {
        return None;
    }
    // Slide down to the bottom of the dip.
    while period + 1 < half && yin_buffer[period + 1] < yin_buffer[period] {
        period += 1;
    }

    // --- Step 5: Clarity check to reject noise ---
    let clarity = yin_buffer[period];
    if clarity > CLARITY_THRESHOLD || period + 1 >= half {
        return None;
    }

    // --- Step 6: Parabolic interpolation for better precision ---
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];

    let period_float = if (y1 - 2.0 * y2 + y3) != 0.0 {
        let peak_shift = (y1 - y3) / (2.0 * (y1 - 2.0 * y2 + y3));
        period as f32 + peak_shift
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / period_float;

    if frequency.is_finite() && frequency > MIN_FREQUENCY_HZ {
        Some(PitchEstimate {
            frequency,
            confidence: (1.0 - clarity).clamp(0.0, 1.0),
        })
    } else {
        None
    }
}

/// Refines a frequency estimate using a pre-computed magnitude spectrum.
///
/// Looks for the strongest bin within two bins of `rough_freq` and
/// interpolates on the log magnitudes around it. Falls back to
/// `rough_freq` whenever the refinement is not trustworthy.
pub fn refine_from_spectrum(spectrum_magnitudes: &[f32], rough_freq: f32, sample_rate: u32) -> f32 {
    if rough_freq <= 0.0 || spectrum_magnitudes.len() < 3 {
        return rough_freq;
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin = (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return rough_freq;
    }

    let Some((offset, _)) = spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    else {
        return rough_freq;
    };
    let peak_bin = start_bin + offset;

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return rough_freq;
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();

    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return rough_freq;
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return rough_freq;
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let final_freq = ((peak_bin as f32 + peak_shift) * sample_rate as f32) / buffer_size as f32;

    // Only trust the spectrum when it agrees with YIN to within a bin.
    let bin_width = sample_rate as f32 / buffer_size as f32;
    if final_freq.is_finite() && final_freq > 0.0 && (final_freq - rough_freq).abs() < bin_width {
        final_freq
    } else {
        rough_freq
    }
}

/// YIN followed by spectral refinement, for frames of a fixed size.
#[derive(Debug)]
pub struct PitchDetector {
    sample_rate: u32,
    amplitude_threshold: f32,
    spectrum: SpectrumAnalyzer,
}

impl PitchDetector {
    pub fn new(frame_size: usize, sample_rate: u32, amplitude_threshold: f32) -> Self {
        Self {
            sample_rate,
            amplitude_threshold,
            spectrum: SpectrumAnalyzer::new(frame_size),
        }
    }

    pub fn estimate(&self, frame: &[f32]) -> Option<PitchEstimate> {
        let mut estimate = detect_pitch_yin(frame, self.sample_rate, self.amplitude_threshold)?;
        if let Some(magnitudes) = self.spectrum.magnitudes(frame) {
            estimate.frequency =
                refine_from_spectrum(&magnitudes, estimate.frequency, self.sample_rate);
        }
        Some(estimate)
    }
}
