//! # Detection Loop Driver
//!
//! Pulls one sample per rendered frame from an [`AudioSource`], evaluates
//! it against the active tuning scheme and publishes what the tuner should
//! show.
//!
//! ## Lifecycle
//! - **Idle** → `start()` → **Listening** → `stop()` → **Idle**
//! - `start()` while listening is a no-op
//! - Every tick is a [`ScheduledTick`] handle stamped with the listening
//!   cycle it belongs to. `stop()` moves to a new cycle, so a handle
//!   scheduled before it can never publish or reschedule afterwards.
//!
//! The driver lives on a single thread and is the only writer of the
//! active mode and the published display.

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::Reading;
use crate::config::{DropoutPolicy, TunerConfig};
use crate::error::{Result, TunerError};
use crate::pitch;
use crate::source::AudioSource;
use crate::tuning::TuningCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Listening,
}

/// Handle of the next tick to run. Only the most recently issued handle
/// of the current listening cycle is runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTick {
    cycle: u64,
    frame: u64,
}

impl ScheduledTick {
    /// Number of ticks run before this one in its cycle.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

/// Everything the presentation layer renders for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TunerDisplay {
    /// Active mode id.
    pub mode: String,
    pub note: Option<String>,
    /// Last captured pitch in Hz.
    pub frequency: Option<f32>,
    pub cents: f32,
    pub in_tune: bool,
    /// Whether the latest sample passed the capture gate.
    pub capturing: bool,
    pub volume_percent: f32,
    pub device_label: Option<String>,
}

impl TunerDisplay {
    /// Cents clamped to the displayed range of `±capture_range_cents / 2`.
    pub fn needle_cents(&self, capture_range_cents: f32) -> f32 {
        pitch::clamp_cents(self.cents, capture_range_cents)
    }
}

/// Messages delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TunerEvent {
    /// A tick published a new display state.
    Display(TunerDisplay),
    /// The driver stopped; nothing should be shown anymore.
    Cleared,
}

/// The per-frame detection loop.
#[derive(Debug)]
pub struct Driver<S: AudioSource> {
    catalog: Arc<TuningCatalog>,
    config: TunerConfig,
    source: S,
    mode: String,
    state: DriverState,
    cycle: u64,
    pending: Option<ScheduledTick>,
    display: Option<TunerDisplay>,
    subscribers: Vec<Sender<TunerEvent>>,
}

impl<S: AudioSource> Driver<S> {
    /// Creates an idle driver using `config.mode` as the initial mode.
    ///
    /// # Errors
    /// * `UnknownMode` - `config.mode` is not in `catalog`
    /// * `InvalidConfig` - `config` does not validate
    pub fn new(catalog: Arc<TuningCatalog>, config: TunerConfig, source: S) -> Result<Self> {
        config.validate()?;
        catalog.lookup(&config.mode)?;
        Ok(Self {
            mode: config.mode.clone(),
            catalog,
            config,
            source,
            state: DriverState::Idle,
            cycle: 0,
            pending: None,
            display: None,
            subscribers: Vec::new(),
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn catalog(&self) -> &TuningCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Last published display, `None` while idle.
    pub fn display(&self) -> Option<&TunerDisplay> {
        self.display.as_ref()
    }

    /// Registers a new subscriber. Disconnected receivers are dropped on
    /// the next publish.
    pub fn subscribe(&mut self) -> Receiver<TunerEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Opens the audio source and schedules the first tick.
    ///
    /// Calling this while already listening returns the pending handle
    /// without touching the source.
    ///
    /// # Errors
    /// * `AudioUnavailable` - the source could not be opened; the driver stays idle
    pub fn start(&mut self) -> Result<ScheduledTick> {
        if let (DriverState::Listening, Some(pending)) = (self.state, self.pending) {
            debug!("start() while listening, keeping tick {:?}", pending);
            return Ok(pending);
        }

        let device_label = match self.source.open() {
            Ok(label) => label,
            Err(e) => {
                warn!("Audio input unavailable, staying idle: {}", e);
                return Err(match e {
                    TunerError::AudioUnavailable(_) => e,
                    other => TunerError::AudioUnavailable(other.to_string()),
                });
            }
        };

        self.cycle += 1;
        self.state = DriverState::Listening;
        self.display = Some(TunerDisplay {
            mode: self.mode.clone(),
            device_label: device_label.clone(),
            ..TunerDisplay::default()
        });

        let tick = ScheduledTick {
            cycle: self.cycle,
            frame: 0,
        };
        self.pending = Some(tick);
        info!(
            "Listening on {} in mode {}",
            device_label.as_deref().unwrap_or("unknown device"),
            self.mode
        );
        Ok(tick)
    }

    /// Runs one scheduled tick and returns the handle of the next one.
    ///
    /// Returns `None` without side effects when the handle is stale: the
    /// driver was stopped, or restarted, or the handle was already run.
    pub fn run_tick(&mut self, tick: ScheduledTick) -> Option<ScheduledTick> {
        if self.state != DriverState::Listening || self.pending != Some(tick) {
            debug!("Dropping stale tick {:?}", tick);
            return None;
        }

        let sample = match self.source.sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Audio input lost: {}", e);
                self.shut_down();
                return None;
            }
        };

        let evaluated = pitch::evaluate_reading(&self.catalog, &self.mode, &sample, &self.config);
        let reading = match evaluated {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Dropping sample {:?}: {}", sample, e);
                Reading::default()
            }
        };

        let policy = self.config.dropout_policy;
        let mode = self.mode.clone();
        let display = self.display.get_or_insert_with(TunerDisplay::default);
        display.mode = mode;
        display.volume_percent = sample.volume_percent;
        apply_reading(display, reading, policy);

        let snapshot = display.clone();
        self.publish(TunerEvent::Display(snapshot));

        let next = ScheduledTick {
            cycle: tick.cycle,
            frame: tick.frame + 1,
        };
        self.pending = Some(next);
        Some(next)
    }

    /// Stops listening, releases the source and clears the display.
    ///
    /// Outstanding tick handles become stale. No-op while idle.
    pub fn stop(&mut self) {
        if self.state == DriverState::Idle {
            return;
        }
        self.shut_down();
        info!("Stopped listening");
    }

    /// Switches the active tuning scheme. Takes effect on the next tick.
    ///
    /// A note held from the previous scheme is dropped, since it may not
    /// exist in the new one.
    ///
    /// # Errors
    /// * `UnknownMode` - `mode` is not in the catalog; the previous mode stays active
    pub fn change_mode(&mut self, mode: &str) -> Result<()> {
        if let Err(e) = self.catalog.lookup(mode) {
            warn!("Rejected mode change to {}: {}", mode, e);
            return Err(e);
        }
        if self.mode != mode {
            info!("Mode changed from {} to {}", self.mode, mode);
            self.mode = mode.to_string();
            if let Some(display) = self.display.as_mut() {
                display.note = None;
                display.cents = 0.0;
                display.in_tune = false;
            }
        }
        Ok(())
    }

    fn shut_down(&mut self) {
        // A new cycle makes every handle issued so far stale.
        self.cycle += 1;
        self.pending = None;
        self.state = DriverState::Idle;
        self.source.close();
        self.display = None;
        self.publish(TunerEvent::Cleared);
    }

    fn publish(&mut self, event: TunerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Folds one reading into the displayed state.
fn apply_reading(display: &mut TunerDisplay, reading: Reading, policy: DropoutPolicy) {
    display.capturing = reading.capturing;

    if reading.capturing {
        display.frequency = reading.frequency;
        display.cents = if reading.note.is_some() { reading.cents } else { 0.0 };
        display.in_tune = reading.in_tune;
        display.note = reading.note;
        return;
    }

    match policy {
        DropoutPolicy::Hold => {}
        DropoutPolicy::Reset => {
            display.note = None;
            display.frequency = None;
            display.cents = 0.0;
            display.in_tune = false;
        }
    }
}
