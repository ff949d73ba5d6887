//! # Tuning Catalog Module
//!
//! This module holds the tuning schemes a musician can tune against: a
//! general-purpose chromatic scheme and a handful of instrument-specific
//! string tunings.
//!
//! ## Features
//! - 12-TET chromatic table from C0 to B8 (A4 = 440 Hz by default)
//! - Standard guitar, drop-D and standard ukulele schemes
//! - Validation at construction: no empty schemes, no duplicate notes,
//!   no non-positive frequencies
//! - Concert pitch other than 440 Hz
//!
//! Every scheme is its own independent table. Drop-D is not derived from
//! standard guitar even though the two only differ on the low string.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{Result, TunerError};

/// Mode id of the chromatic scheme.
pub const CHROMATIC: &str = "chromatic";
/// Mode id of the standard guitar scheme (E A D G B E).
pub const STANDARD_GUITAR: &str = "standard-guitar";
/// Mode id of the drop-D guitar scheme (D A D G B E).
pub const DROP_D: &str = "drop-d";
/// Mode id of the standard re-entrant ukulele scheme (G C E A).
pub const UKULELE_STANDARD: &str = "ukulele-standard";

/// Concert pitch the built-in tables are written against.
pub const DEFAULT_A4_HZ: f32 = 440.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

// Semitones between C0 and A4.
const A4_OFFSET_FROM_C0: i32 = 57;
const CHROMATIC_OCTAVES: i32 = 9;

const STANDARD_GUITAR_NOTES: [(&str, f32); 6] = [
    ("E2", 82.41),
    ("A2", 110.0),
    ("D3", 146.83),
    ("G3", 196.0),
    ("B3", 246.94),
    ("E4", 329.63),
];

const DROP_D_NOTES: [(&str, f32); 6] = [
    ("D2", 73.42),
    ("A2", 110.0),
    ("D3", 146.83),
    ("G3", 196.0),
    ("B3", 246.94),
    ("E4", 329.63),
];

const UKULELE_STANDARD_NOTES: [(&str, f32); 4] = [
    ("G4", 392.0),
    ("C4", 261.63),
    ("E4", 329.63),
    ("A4", 440.0),
];

/// Represents a single target note with its name and reference frequency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// Reference frequency in Hz
    pub frequency: f32,
}

/// A named, validated mapping from note name to reference frequency.
///
/// Notes keep their declaration order. That order is the scan order used
/// by [`crate::pitch::closest_note`], so it decides ties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningScheme {
    name: String,
    notes: Vec<Note>,
}

impl TuningScheme {
    /// Builds a scheme from `(note, frequency)` pairs.
    ///
    /// # Errors
    /// * `EmptyScheme` - no entries were given
    /// * `DuplicateNote` - the same note name appears twice
    /// * `InvalidFrequency` - a frequency is not finite or not above zero
    pub fn new<N, I>(name: impl Into<String>, entries: I) -> Result<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, f32)>,
    {
        let name = name.into();
        let mut seen = BTreeSet::new();
        let mut notes = Vec::new();

        for (note, frequency) in entries {
            let note = note.into();
            if !frequency.is_finite() || frequency <= 0.0 {
                return Err(TunerError::InvalidFrequency(frequency));
            }
            if !seen.insert(note.clone()) {
                return Err(TunerError::DuplicateNote {
                    scheme: name,
                    note,
                });
            }
            notes.push(Note {
                name: note,
                frequency,
            });
        }

        if notes.is_empty() {
            return Err(TunerError::EmptyScheme(name));
        }

        Ok(Self { name, notes })
    }

    /// Human-readable scheme name (e.g. "Standard Guitar").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference frequency of `note`, if the scheme contains it.
    pub fn get(&self, note: &str) -> Option<f32> {
        self.notes
            .iter()
            .find(|n| n.name == note)
            .map(|n| n.frequency)
    }

    /// Notes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Always false for a constructed scheme.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Returns a copy of this scheme with every frequency multiplied by `factor`.
    fn scaled(&self, factor: f32) -> Result<Self> {
        Self::new(
            self.name.clone(),
            self.notes
                .iter()
                .map(|n| (n.name.clone(), n.frequency * factor)),
        )
    }
}

/// Immutable set of tuning schemes keyed by mode id.
///
/// Built once at startup and shared by `Arc`; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningCatalog {
    schemes: BTreeMap<String, TuningScheme>,
}

/// The built-in catalog at A4 = 440 Hz, computed once.
static BUILTIN: Lazy<Arc<TuningCatalog>> = Lazy::new(|| {
    Arc::new(
        TuningCatalog::with_reference(DEFAULT_A4_HZ)
            .unwrap_or_else(|e| panic!("built-in tuning tables are invalid: {e}")),
    )
});

impl TuningCatalog {
    pub fn builder() -> TuningCatalogBuilder {
        TuningCatalogBuilder::default()
    }

    /// Shared built-in catalog (chromatic, standard guitar, drop-D, ukulele).
    pub fn builtin() -> Arc<TuningCatalog> {
        Arc::clone(&BUILTIN)
    }

    /// Built-in catalog against a concert pitch other than 440 Hz.
    ///
    /// The chromatic table is recomputed from `a4_hz`; the instrument
    /// tables are rescaled by `a4_hz / 440`.
    pub fn with_reference(a4_hz: f32) -> Result<TuningCatalog> {
        if !a4_hz.is_finite() || a4_hz <= 0.0 {
            return Err(TunerError::InvalidFrequency(a4_hz));
        }
        let factor = a4_hz / DEFAULT_A4_HZ;

        Self::builder()
            .insert(CHROMATIC, chromatic_scheme(a4_hz)?)?
            .insert(
                STANDARD_GUITAR,
                TuningScheme::new("Standard Guitar", STANDARD_GUITAR_NOTES)?.scaled(factor)?,
            )?
            .insert(
                DROP_D,
                TuningScheme::new("Drop D", DROP_D_NOTES)?.scaled(factor)?,
            )?
            .insert(
                UKULELE_STANDARD,
                TuningScheme::new("Ukulele Standard", UKULELE_STANDARD_NOTES)?.scaled(factor)?,
            )
            .map(TuningCatalogBuilder::build)
    }

    /// Looks up the scheme registered under `mode`.
    ///
    /// # Errors
    /// * `UnknownMode` - no scheme is registered under `mode`
    pub fn lookup(&self, mode: &str) -> Result<&TuningScheme> {
        self.schemes
            .get(mode)
            .ok_or_else(|| TunerError::UnknownMode(mode.to_string()))
    }

    pub fn contains(&self, mode: &str) -> bool {
        self.schemes.contains_key(mode)
    }

    /// Registered mode ids in sorted order.
    pub fn modes(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }

    /// Starts a builder pre-filled with this catalog's schemes.
    pub fn to_builder(&self) -> TuningCatalogBuilder {
        TuningCatalogBuilder {
            schemes: self.schemes.clone(),
        }
    }
}

/// Collects schemes before freezing them into a [`TuningCatalog`].
#[derive(Debug, Default)]
pub struct TuningCatalogBuilder {
    schemes: BTreeMap<String, TuningScheme>,
}

impl TuningCatalogBuilder {
    /// Registers `scheme` under `mode`.
    ///
    /// # Errors
    /// * `DuplicateMode` - `mode` is already registered
    pub fn insert(mut self, mode: impl Into<String>, scheme: TuningScheme) -> Result<Self> {
        let mode = mode.into();
        if self.schemes.contains_key(&mode) {
            return Err(TunerError::DuplicateMode(mode));
        }
        self.schemes.insert(mode, scheme);
        Ok(self)
    }

    pub fn build(self) -> TuningCatalog {
        TuningCatalog {
            schemes: self.schemes,
        }
    }
}

/// Computes the chromatic scheme (C0 to B8) in equal temperament.
///
/// The formula is f = a4 * 2^(n/12), where n is the number of semitones
/// away from A4.
fn chromatic_scheme(a4_hz: f32) -> Result<TuningScheme> {
    let count = CHROMATIC_OCTAVES * 12;
    let entries = (0..count).map(|i| {
        let semitones = (i - A4_OFFSET_FROM_C0) as f32;
        let frequency = a4_hz * 2.0_f32.powf(semitones / 12.0);
        let name = format!("{}{}", NOTE_NAMES[(i % 12) as usize], i / 12);
        (name, frequency)
    });
    TuningScheme::new("Chromatic", entries)
}
