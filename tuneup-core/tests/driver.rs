use std::collections::VecDeque;
use std::sync::Arc;

use tuneup_core::driver::TunerEvent;
use tuneup_core::tuning::{self, TuningCatalog, TuningScheme};
use tuneup_core::{
    AudioSource, Driver, DriverState, DropoutPolicy, Result, Sample, TunerConfig, TunerError,
};

/// Replays a fixed list of samples, then repeats the last one.
#[derive(Debug, Default)]
struct ScriptedSource {
    samples: VecDeque<Sample>,
    last: Sample,
    fail_open: bool,
    fail_after: Option<usize>,
    opened: usize,
    closed: usize,
    pulled: usize,
}

impl ScriptedSource {
    fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl AudioSource for ScriptedSource {
    fn open(&mut self) -> Result<Option<String>> {
        if self.fail_open {
            return Err(TunerError::AudioUnavailable("permission denied".into()));
        }
        self.opened += 1;
        Ok(Some("Scripted Mic".to_string()))
    }

    fn sample(&mut self) -> Result<Sample> {
        if self.fail_after == Some(self.pulled) {
            return Err(TunerError::AudioUnavailable("unplugged".into()));
        }
        self.pulled += 1;
        if let Some(next) = self.samples.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }

    fn close(&mut self) {
        self.closed += 1;
    }
}

fn tone(frequency: f32) -> Sample {
    Sample {
        frequency: Some(frequency),
        confidence: 0.99,
        volume_percent: 60.0,
    }
}

fn driver(config: TunerConfig, samples: Vec<Sample>) -> Driver<ScriptedSource> {
    Driver::new(TuningCatalog::builtin(), config, ScriptedSource::new(samples)).unwrap()
}

#[test]
fn a4_reads_in_tune() {
    let mut driver = driver(TunerConfig::default(), vec![tone(440.0)]);
    let tick = driver.start().unwrap();
    driver.run_tick(tick).unwrap();

    let display = driver.display().unwrap();
    assert_eq!(display.note.as_deref(), Some("A4"));
    assert_eq!(display.cents, 0.0);
    assert!(display.in_tune);
    assert!(display.capturing);
    assert_eq!(display.volume_percent, 60.0);
    assert_eq!(display.device_label.as_deref(), Some("Scripted Mic"));
    assert_eq!(display.mode, tuning::CHROMATIC);
}

#[test]
fn far_off_guitar_string_shows_no_note() {
    let config = TunerConfig {
        mode: tuning::STANDARD_GUITAR.to_string(),
        ..TunerConfig::default()
    };
    let mut driver = driver(config, vec![tone(116.5)]);
    let tick = driver.start().unwrap();
    driver.run_tick(tick).unwrap();

    let display = driver.display().unwrap();
    assert_eq!(display.note, None);
    assert_eq!(display.frequency, Some(116.5));
    assert!(display.capturing);
}

#[test]
fn low_confidence_is_not_captured() {
    let unsure = Sample {
        confidence: 0.5,
        ..tone(440.0)
    };
    let mut driver = driver(TunerConfig::default(), vec![unsure]);
    let tick = driver.start().unwrap();
    driver.run_tick(tick).unwrap();

    let display = driver.display().unwrap();
    assert_eq!(display.note, None);
    assert!(!display.capturing);
}

#[test]
fn unknown_mode_keeps_previous_mode() {
    let mut driver = driver(TunerConfig::default(), vec![tone(440.0), tone(440.0)]);
    let tick = driver.start().unwrap();
    let tick = driver.run_tick(tick).unwrap();

    let err = driver.change_mode("nonexistent").unwrap_err();
    assert!(matches!(err, TunerError::UnknownMode(ref m) if m == "nonexistent"));
    assert_eq!(driver.mode(), tuning::CHROMATIC);
    assert_eq!(driver.state(), DriverState::Listening);

    driver.run_tick(tick).unwrap();
    let display = driver.display().unwrap();
    assert_eq!(display.mode, tuning::CHROMATIC);
    assert_eq!(display.note.as_deref(), Some("A4"));
}

#[test]
fn silence_is_not_captured_despite_clear_pitch() {
    let silent = Sample {
        volume_percent: 0.0,
        ..tone(440.0)
    };
    let mut driver = driver(TunerConfig::default(), vec![silent]);
    let tick = driver.start().unwrap();
    driver.run_tick(tick).unwrap();

    let display = driver.display().unwrap();
    assert_eq!(display.note, None);
    assert!(!display.capturing);
}

#[test]
fn mode_change_applies_on_next_tick() {
    // 82.41 Hz is E2 on the guitar, but not a chromatic reference.
    let mut driver = driver(TunerConfig::default(), vec![tone(82.41), tone(82.41)]);
    let tick = driver.start().unwrap();
    let tick = driver.run_tick(tick).unwrap();
    assert_eq!(driver.display().unwrap().note.as_deref(), Some("E2"));
    assert_ne!(driver.display().unwrap().cents, 0.0);

    driver.change_mode(tuning::STANDARD_GUITAR).unwrap();
    driver.run_tick(tick).unwrap();
    let display = driver.display().unwrap();
    assert_eq!(display.mode, tuning::STANDARD_GUITAR);
    assert_eq!(display.note.as_deref(), Some("E2"));
    assert_eq!(display.cents, 0.0);
}

#[test]
fn dropout_holds_last_reading_by_default() {
    let gap = Sample {
        frequency: None,
        confidence: 0.0,
        volume_percent: 5.0,
    };
    let mut driver = driver(TunerConfig::default(), vec![tone(441.0), gap]);
    let tick = driver.start().unwrap();
    let tick = driver.run_tick(tick).unwrap();
    let held_cents = driver.display().unwrap().cents;
    driver.run_tick(tick).unwrap();

    let display = driver.display().unwrap();
    assert!(!display.capturing);
    assert_eq!(display.note.as_deref(), Some("A4"));
    assert_eq!(display.frequency, Some(441.0));
    assert_eq!(display.cents, held_cents);
    assert_eq!(display.volume_percent, 5.0);
}

#[test]
fn dropout_reset_policy_clears_reading() {
    let config = TunerConfig {
        dropout_policy: DropoutPolicy::Reset,
        ..TunerConfig::default()
    };
    let mut driver = driver(config, vec![tone(441.0), Sample::default()]);
    let tick = driver.start().unwrap();
    let tick = driver.run_tick(tick).unwrap();
    driver.run_tick(tick).unwrap();

    let display = driver.display().unwrap();
    assert_eq!(display.note, None);
    assert_eq!(display.frequency, None);
    assert_eq!(display.cents, 0.0);
}

#[test]
fn stop_cancels_scheduled_tick() {
    let mut driver = driver(TunerConfig::default(), vec![tone(440.0)]);
    let events = driver.subscribe();
    let tick = driver.start().unwrap();

    driver.stop();
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(driver.display().is_none());
    assert_eq!(driver.run_tick(tick), None);
    assert_eq!(driver.source().pulled, 0);
    assert_eq!(driver.source().closed, 1);

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received, vec![TunerEvent::Cleared]);
}

#[test]
fn old_handle_is_stale_after_restart() {
    let mut driver = driver(TunerConfig::default(), vec![tone(440.0)]);
    let first = driver.start().unwrap();
    driver.stop();
    let second = driver.start().unwrap();

    assert_eq!(driver.run_tick(first), None);
    assert!(driver.run_tick(second).is_some());
    assert_eq!(driver.source().pulled, 1);
}

#[test]
fn handle_runs_only_once() {
    let mut driver = driver(TunerConfig::default(), vec![tone(440.0)]);
    let tick = driver.start().unwrap();
    let next = driver.run_tick(tick).unwrap();
    assert_eq!(next.frame(), 1);
    assert_eq!(driver.run_tick(tick), None);
    assert_eq!(driver.source().pulled, 1);
}

#[test]
fn start_while_listening_is_a_no_op() {
    let mut driver = driver(TunerConfig::default(), vec![tone(440.0)]);
    let tick = driver.start().unwrap();
    let again = driver.start().unwrap();
    assert_eq!(tick, again);
    assert_eq!(driver.source().opened, 1);
}

#[test]
fn failed_open_stays_idle() {
    let mut source = ScriptedSource::new(vec![tone(440.0)]);
    source.fail_open = true;
    let mut driver = Driver::new(TuningCatalog::builtin(), TunerConfig::default(), source).unwrap();
    let events = driver.subscribe();

    let err = driver.start().unwrap_err();
    assert!(matches!(err, TunerError::AudioUnavailable(_)));
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(driver.display().is_none());
    assert!(events.try_recv().is_err());
}

#[test]
fn lost_input_returns_to_idle_without_a_reading() {
    let mut source = ScriptedSource::new(vec![tone(440.0)]);
    source.fail_after = Some(1);
    let mut driver = Driver::new(TuningCatalog::builtin(), TunerConfig::default(), source).unwrap();
    let events = driver.subscribe();

    let tick = driver.start().unwrap();
    let tick = driver.run_tick(tick).unwrap();
    assert_eq!(driver.run_tick(tick), None);
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(driver.display().is_none());

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.len(), 2);
    assert!(matches!(received[0], TunerEvent::Display(_)));
    assert_eq!(received[1], TunerEvent::Cleared);
}

#[test]
fn subscribers_see_every_tick() {
    let mut driver = driver(TunerConfig::default(), vec![tone(440.0), tone(220.0)]);
    let events = driver.subscribe();
    let mut tick = driver.start().unwrap();
    for _ in 0..2 {
        tick = driver.run_tick(tick).unwrap();
    }

    let notes: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            TunerEvent::Display(display) => display.note,
            TunerEvent::Cleared => None,
        })
        .collect();
    assert_eq!(notes, vec!["A4".to_string(), "A3".to_string()]);
}

#[test]
fn dropped_subscriber_does_not_break_publishing() {
    let mut driver = driver(TunerConfig::default(), vec![tone(440.0)]);
    drop(driver.subscribe());
    let kept = driver.subscribe();
    let tick = driver.start().unwrap();
    driver.run_tick(tick).unwrap();
    assert!(kept.try_recv().is_ok());
}

#[test]
fn injected_catalog_is_used() {
    let scheme = TuningScheme::new("Pitch Pipe", [("C4", 261.63)]).unwrap();
    let catalog = Arc::new(
        TuningCatalog::builder()
            .insert("pitch-pipe", scheme)
            .unwrap()
            .build(),
    );
    let config = TunerConfig {
        mode: "pitch-pipe".to_string(),
        ..TunerConfig::default()
    };
    let mut driver = Driver::new(catalog, config, ScriptedSource::new(vec![tone(262.0)])).unwrap();
    let tick = driver.start().unwrap();
    driver.run_tick(tick).unwrap();
    assert_eq!(driver.display().unwrap().note.as_deref(), Some("C4"));

    assert!(matches!(
        driver.change_mode(tuning::CHROMATIC),
        Err(TunerError::UnknownMode(_))
    ));
}

#[test]
fn driver_rejects_unknown_initial_mode() {
    let config = TunerConfig {
        mode: "harp".to_string(),
        ..TunerConfig::default()
    };
    let result = Driver::new(TuningCatalog::builtin(), config, ScriptedSource::default());
    assert!(matches!(result, Err(TunerError::UnknownMode(_))));
}

#[test]
fn synthetic_tone_runs_end_to_end() {
    let config = TunerConfig {
        mode: tuning::STANDARD_GUITAR.to_string(),
        ..TunerConfig::default()
    };
    let source = tuneup_core::source::SyntheticTone::new(196.0, 0.5, config.volume_range());
    let mut driver = Driver::new(TuningCatalog::builtin(), config, source).unwrap();
    let mut tick = driver.start().unwrap();
    for _ in 0..3 {
        tick = driver.run_tick(tick).unwrap();
    }
    let display = driver.display().unwrap();
    assert_eq!(display.note.as_deref(), Some("G3"));
    assert!(display.cents.abs() < 20.0, "{display:?}");
    assert!(display.device_label.is_some());
}

#[test]
fn held_note_is_dropped_on_mode_change() {
    let gap = Sample {
        frequency: None,
        confidence: 0.0,
        volume_percent: 5.0,
    };
    let mut driver = driver(TunerConfig::default(), vec![tone(441.0), gap]);
    let tick = driver.start().unwrap();
    let tick = driver.run_tick(tick).unwrap();
    assert_eq!(driver.display().unwrap().note.as_deref(), Some("A4"));

    driver.change_mode(tuning::STANDARD_GUITAR).unwrap();
    driver.run_tick(tick).unwrap();

    let display = driver.display().unwrap();
    assert_eq!(display.mode, tuning::STANDARD_GUITAR);
    assert!(!display.capturing);
    assert_eq!(display.note, None);
    assert_eq!(display.cents, 0.0);
    assert!(!display.in_tune);
    assert_eq!(display.frequency, Some(441.0));
}

#[test]
fn reselecting_the_same_mode_keeps_the_held_note() {
    let mut driver = driver(TunerConfig::default(), vec![tone(441.0), Sample::default()]);
    let tick = driver.start().unwrap();
    let tick = driver.run_tick(tick).unwrap();

    driver.change_mode(tuning::CHROMATIC).unwrap();
    driver.run_tick(tick).unwrap();
    assert_eq!(driver.display().unwrap().note.as_deref(), Some("A4"));
}

#[test]
fn turning_a_peg_moves_the_reading_toward_the_string() {
    let config = TunerConfig {
        mode: tuning::STANDARD_GUITAR.to_string(),
        ..TunerConfig::default()
    };
    let source = tuneup_core::source::SyntheticTone::new(192.0, 0.5, config.volume_range());
    let mut driver = Driver::new(TuningCatalog::builtin(), config, source).unwrap();
    let mut tick = driver.start().unwrap();
    for _ in 0..2 {
        tick = driver.run_tick(tick).unwrap();
    }
    let flat = driver.display().unwrap().clone();
    assert_eq!(flat.note.as_deref(), Some("G3"));
    assert!(flat.cents < -20.0, "{flat:?}");

    driver.source_mut().set_frequency(196.0);
    for _ in 0..2 {
        tick = driver.run_tick(tick).unwrap();
    }
    let tuned = driver.display().unwrap();
    assert_eq!(tuned.note.as_deref(), Some("G3"));
    assert!(tuned.cents.abs() < 20.0, "{tuned:?}");
}
