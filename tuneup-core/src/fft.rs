//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for refining the pitch estimate.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per frame size
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal for accurate analysis

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
///
/// DC offset introduces a large component at 0 Hz which would leak into
/// the low bins a bass string lives in.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the input buffer to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Forward FFT of a fixed frame size, producing magnitude spectra.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    frame_size: usize,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("frame_size", &self.frame_size)
            .finish()
    }
}

impl SpectrumAnalyzer {
    pub fn new(frame_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        Self { fft, frame_size }
    }

    /// Magnitude spectrum up to the Nyquist frequency.
    ///
    /// The frame is DC-corrected and Hann-windowed first. Returns `None`
    /// if the frame length does not match the planned size.
    pub fn magnitudes(&self, signal: &[f32]) -> Option<Vec<f32>> {
        if signal.len() != self.frame_size {
            return None;
        }

        let mut processed = signal.to_vec();
        remove_dc_offset(&mut processed);
        apply_hann_window(&mut processed);

        let mut buffer: Vec<Complex<f32>> = processed
            .into_iter()
            .map(|sample| Complex { re: sample, im: 0.0 })
            .collect();
        self.fft.process(&mut buffer);

        Some(
            buffer
                .iter()
                .take(self.frame_size / 2)
                .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
                .collect(),
        )
    }
}
