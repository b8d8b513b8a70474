//! Rehearsal marker maps
//!
//! A marker map is authored in an external editor and stored next to the
//! piece. The engine only reads it: measure and page labels resolve to jump
//! targets, and voice names resolve to tracks.

use crate::model::MidiFileInfo;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub type Result<T> = std::result::Result<T, MarkerError>;

#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("Invalid marker document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ppq must be greater than zero")]
    InvalidPpq,

    #[error("Voice '{0}' must map to a track number of 1 or more")]
    InvalidVoiceTrack(String),
}

/// Which of the two label maps a marker belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    Measure,
    Page,
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKind::Measure => write!(f, "measure"),
            MarkerKind::Page => write!(f, "page"),
        }
    }
}

/// Two adjacent labels whose ticks go backwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerWarning {
    pub kind: MarkerKind,
    pub previous_label: String,
    pub previous_tick: u64,
    pub label: String,
    pub tick: u64,
}

impl fmt::Display for MarkerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ticks are not increasing ({}: {} > {}: {})",
            self.kind, self.previous_label, self.previous_tick, self.label, self.tick
        )
    }
}

/// Measure, page and voice lookups for one piece
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RehearsalMarkerMap {
    pub ppq: u32,
    #[serde(default)]
    pub measure_to_tick: BTreeMap<String, u64>,
    #[serde(default)]
    pub page_to_tick: BTreeMap<String, u64>,
    /// Voice name to 1-based track number
    #[serde(default)]
    pub voicing: BTreeMap<String, usize>,
}

impl RehearsalMarkerMap {
    /// An empty map for a file with the given resolution
    pub fn new(ppq: u32) -> Self {
        RehearsalMarkerMap {
            ppq,
            ..Default::default()
        }
    }

    /// Parse and validate an editor document
    pub fn from_json(json: &str) -> Result<Self> {
        let map: RehearsalMarkerMap = serde_json::from_str(json)?;
        map.validate()?;
        Ok(map)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Structural checks; tick ordering is only ever a warning
    pub fn validate(&self) -> Result<()> {
        if self.ppq == 0 {
            return Err(MarkerError::InvalidPpq);
        }
        if let Some((voice, _)) = self.voicing.iter().find(|(_, track)| **track == 0) {
            return Err(MarkerError::InvalidVoiceTrack(voice.clone()));
        }
        Ok(())
    }

    pub fn measure_tick(&self, label: &str) -> Option<u64> {
        self.measure_to_tick.get(label).copied()
    }

    pub fn page_tick(&self, label: &str) -> Option<u64> {
        self.page_to_tick.get(label).copied()
    }

    pub fn tick_for(&self, kind: MarkerKind, label: &str) -> Option<u64> {
        match kind {
            MarkerKind::Measure => self.measure_tick(label),
            MarkerKind::Page => self.page_tick(label),
        }
    }

    /// 0-based track index carrying a voice
    pub fn voice_track(&self, voice: &str) -> Option<usize> {
        self.voicing.get(voice).and_then(|track| track.checked_sub(1))
    }

    pub fn voice_names(&self) -> impl Iterator<Item = &str> {
        self.voicing.keys().map(String::as_str)
    }

    /// Labels of one kind in rehearsal order (numeric labels ascending,
    /// anything else after them)
    pub fn sorted_labels(&self, kind: MarkerKind) -> Vec<(&str, u64)> {
        let map = match kind {
            MarkerKind::Measure => &self.measure_to_tick,
            MarkerKind::Page => &self.page_to_tick,
        };
        let mut labels: Vec<(&str, u64)> = map.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        labels.sort_by(|a, b| compare_labels(a.0, b.0));
        labels
    }

    /// Every place where a later label points at an earlier tick
    pub fn monotonic_warnings(&self) -> Vec<MarkerWarning> {
        let mut warnings = Vec::new();
        for kind in [MarkerKind::Measure, MarkerKind::Page] {
            let labels = self.sorted_labels(kind);
            for pair in labels.windows(2) {
                let (prev_label, prev_tick) = pair[0];
                let (label, tick) = pair[1];
                if tick < prev_tick {
                    warnings.push(MarkerWarning {
                        kind,
                        previous_label: prev_label.to_string(),
                        previous_tick: prev_tick,
                        label: label.to_string(),
                        tick,
                    });
                }
            }
        }
        warnings
    }

    /// Replace the measure map with evenly spaced measures derived from the
    /// file's first time signature
    ///
    /// Returns the number of generated measures, or `None` (leaving the
    /// measures untouched) when the file has no usable time signature. The
    /// resolution is taken from the file in either case.
    pub fn generate_measures(&mut self, info: &MidiFileInfo) -> Option<usize> {
        self.ppq = info.ticks_per_quarter_note as u32;

        let ts = info.time_signatures.first()?;
        let ticks_per_measure = ts.ticks_per_measure(info.ticks_per_quarter_note);
        if !(ticks_per_measure > 0.0) {
            return None;
        }

        let count = (info.duration_ticks as f64 / ticks_per_measure).floor() as usize;
        self.measure_to_tick = (1..=count)
            .map(|i| (i.to_string(), ((i - 1) as f64 * ticks_per_measure).floor() as u64))
            .collect();
        Some(count)
    }
}

fn numeric_prefix(label: &str) -> Option<u64> {
    let trimmed = label.trim_start();
    let digits = trimmed.bytes().take_while(|b| b.is_ascii_digit()).count();
    trimmed[..digits].parse().ok()
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    match (numeric_prefix(a), numeric_prefix(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
