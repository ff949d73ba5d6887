//! # Audio Capture Module
//!
//! This module handles real-time microphone capture using CPAL
//! (Cross-Platform Audio Library) and exposes it as an [`AudioSource`].
//!
//! ## Features
//! - Default input device selection
//! - Mono preferred, multi-channel input downmixed
//! - Fixed-size frames handed from the audio callback over a bounded channel
//! - Stream errors surface as `AudioUnavailable` on the next tick

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use crate::detector::PitchDetector;
use crate::error::TunerError;
use crate::source::{AudioSource, BUFFER_SIZE, Sample};
use crate::volume::VolumeRange;

/// Sample rate requested from the device when it supports it.
const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Minimum RMS before the estimator even looks for a pitch.
const AMPLITUDE_THRESHOLD: f32 = 0.01;

/// Frames queued between the audio callback and the tick loop.
const FRAME_QUEUE: usize = 8;

/// A running capture stream.
pub struct Capture {
    pub stream: cpal::Stream,
    pub sample_rate: u32,
    pub device_label: String,
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks the supported f32 config closest to 44.1 kHz, preferring mono
/// 3. Sets up a callback that sends `BUFFER_SIZE`-sample mono frames
///
/// Frames are dropped, not queued, when the receiver falls behind.
pub fn start_audio_capture(sender: Sender<Vec<f32>>, failed: Arc<AtomicBool>) -> Result<Capture> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    let device_label = device.name()?;
    info!("Using audio input device: {}", device_label);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = TARGET_SAMPLE_RATE.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let sample_rate = config.sample_rate().0;
    let channels = config.channels().max(1) as usize;
    let config: cpal::StreamConfig = config.into();

    info!("Selected sample rate: {} Hz, {} channel(s)", sample_rate, channels);

    let err_fn = move |err: cpal::StreamError| {
        error!("An error occurred on the audio stream: {}", err);
        failed.store(true, Ordering::Relaxed);
    };

    // This buffer will accumulate mono audio data from the callback.
    let mut audio_buffer = Vec::with_capacity(BUFFER_SIZE * 2);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if channels == 1 {
                audio_buffer.extend_from_slice(data);
            } else {
                audio_buffer.extend(
                    data.chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                );
            }

            while audio_buffer.len() >= BUFFER_SIZE {
                let frame_to_send = audio_buffer[..BUFFER_SIZE].to_vec();
                // Ignore a full channel; the tick loop only wants the latest frame anyway.
                let _ = sender.try_send(frame_to_send);
                audio_buffer.drain(..BUFFER_SIZE);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok(Capture {
        stream,
        sample_rate,
        device_label,
    })
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only 32-bit float formats qualify. Mono beats multi-channel; among
/// equals, the range closest to `target_rate` wins.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let (min, max) = (c.min_sample_rate().0, c.max_sample_rate().0);
            let rate_diff = if (min..=max).contains(&target_rate) {
                0
            } else {
                min.abs_diff(target_rate).min(max.abs_diff(target_rate))
            };
            (c.channels() != 1, rate_diff)
        })
}

/// The default microphone as a tuner input.
pub struct MicrophoneSource {
    range: VolumeRange,
    capture: Option<Capture>,
    frames: Option<Receiver<Vec<f32>>>,
    detector: Option<PitchDetector>,
    failed: Arc<AtomicBool>,
    last: Sample,
}

impl std::fmt::Debug for MicrophoneSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrophoneSource")
            .field("range", &self.range)
            .field("open", &self.capture.is_some())
            .field("last", &self.last)
            .finish()
    }
}

impl MicrophoneSource {
    pub fn new(range: VolumeRange) -> Self {
        Self {
            range,
            capture: None,
            frames: None,
            detector: None,
            failed: Arc::new(AtomicBool::new(false)),
            last: Sample::default(),
        }
    }
}

impl AudioSource for MicrophoneSource {
    fn open(&mut self) -> crate::Result<Option<String>> {
        let (tx, rx) = crossbeam_channel::bounded(FRAME_QUEUE);
        self.failed.store(false, Ordering::Relaxed);

        let capture = start_audio_capture(tx, Arc::clone(&self.failed))
            .map_err(|e| TunerError::AudioUnavailable(format!("{e:#}")))?;

        let label = capture.device_label.clone();
        self.detector = Some(PitchDetector::new(
            BUFFER_SIZE,
            capture.sample_rate,
            AMPLITUDE_THRESHOLD,
        ));
        self.frames = Some(rx);
        self.capture = Some(capture);
        self.last = Sample::default();
        Ok(Some(label))
    }

    fn sample(&mut self) -> crate::Result<Sample> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(TunerError::AudioUnavailable("audio stream failed".into()));
        }
        let (Some(frames), Some(detector)) = (&self.frames, &self.detector) else {
            return Err(TunerError::AudioUnavailable("microphone is not open".into()));
        };

        // Frames arrive slower than display refreshes: reuse the last
        // sample until a new frame shows up.
        if let Some(frame) = frames.try_iter().last() {
            self.last = Sample::from_frame(&frame, detector, self.range);
        }
        Ok(self.last)
    }

    fn close(&mut self) {
        if let Some(capture) = self.capture.take() {
            if let Err(e) = capture.stream.pause() {
                warn!("Error pausing stream: {}", e);
            }
        }
        self.frames = None;
        self.detector = None;
        self.last = Sample::default();
    }
}
