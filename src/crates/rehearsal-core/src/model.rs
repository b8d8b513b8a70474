//! File-level data model produced by the MIDI loader
//!
//! Everything in here is built once per file load and then only read.

use serde::{Deserialize, Serialize};

/// Tempo assumed when a file carries no tempo meta event
pub const DEFAULT_BPM: f64 = 120.0;

/// General MIDI program used for tracks without a program change
pub const DEFAULT_INSTRUMENT: u8 = 0;

/// A single note, flattened out of its track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    /// Index into [`MidiFileInfo::tracks`]
    pub track_index: usize,
    /// Absolute start position in ticks
    pub tick: u64,
    pub duration_ticks: u64,
    /// MIDI note number (0-127)
    pub midi_note: u8,
    /// Normalized velocity (0.0 to 1.0)
    pub velocity: f32,
    /// Nominal start time at tempo factor 1
    pub start_time_seconds: f64,
    /// Nominal duration at tempo factor 1
    pub duration_seconds: f64,
}

impl NoteEvent {
    /// Tick at which the note releases
    pub fn end_tick(&self) -> u64 {
        self.tick + self.duration_ticks
    }
}

/// A tempo meta event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoChange {
    pub tick: u64,
    pub bpm: f64,
    pub microseconds_per_beat: u32,
}

impl TempoChange {
    /// Build a tempo change from the raw meta event value
    pub fn from_microseconds(tick: u64, microseconds_per_beat: u32) -> Self {
        TempoChange {
            tick,
            bpm: 60_000_000.0 / microseconds_per_beat.max(1) as f64,
            microseconds_per_beat,
        }
    }
}

/// A time signature meta event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSignature {
    pub tick: u64,
    pub numerator: u8,
    /// Actual denominator (4 for x/4), not the power-of-two exponent
    pub denominator: u32,
}

impl TimeSignature {
    /// Length of one measure in ticks for the given resolution
    pub fn ticks_per_measure(&self, ppq: u16) -> f64 {
        ppq as f64 * 4.0 * self.numerator as f64 / self.denominator.max(1) as f64
    }
}

/// Per-track summary for track pickers and the mixer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiTrackInfo {
    /// Track index (0-based, matches the chunk order in the file)
    pub index: usize,
    pub name: String,
    pub note_count: usize,
    /// Channel of the first channel event, absent for conductor tracks
    pub channel: Option<u8>,
    /// General MIDI program from the last program change
    pub instrument_id: Option<u8>,
}

impl MidiTrackInfo {
    /// Instrument to load for this track
    pub fn instrument(&self) -> u8 {
        self.instrument_id.unwrap_or(DEFAULT_INSTRUMENT)
    }
}

/// Everything the engine knows about a loaded file, apart from the notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiFileInfo {
    pub tracks: Vec<MidiTrackInfo>,
    #[serde(rename = "ppq")]
    pub ticks_per_quarter_note: u16,
    pub duration_ticks: u64,
    pub tempo_changes: Vec<TempoChange>,
    pub time_signatures: Vec<TimeSignature>,
}

impl MidiFileInfo {
    /// Tempo of the first tempo change, or the MIDI default of 120 BPM
    pub fn initial_bpm(&self) -> f64 {
        self.tempo_changes.first().map(|t| t.bpm).unwrap_or(DEFAULT_BPM)
    }

    /// Whether the tempo map holds more than one tempo
    pub fn has_tempo_changes(&self) -> bool {
        self.tempo_changes.len() > 1
    }

    /// Distinct instrument ids used by the tracks, in ascending order
    pub fn instrument_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.tracks.iter().map(|t| t.instrument()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(index: usize, instrument_id: Option<u8>) -> MidiTrackInfo {
        MidiTrackInfo {
            index,
            name: format!("Track {}", index + 1),
            note_count: 0,
            channel: None,
            instrument_id,
        }
    }

    #[test]
    fn test_tempo_from_microseconds() {
        let tempo = TempoChange::from_microseconds(0, 500_000);
        assert!((tempo.bpm - 120.0).abs() < 1e-9);

        let tempo = TempoChange::from_microseconds(0, 600_000);
        assert!((tempo.bpm - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_ticks_per_measure() {
        let ts = TimeSignature {
            tick: 0,
            numerator: 3,
            denominator: 4,
        };
        assert_eq!(ts.ticks_per_measure(480), 1440.0);

        let ts = TimeSignature {
            tick: 0,
            numerator: 6,
            denominator: 8,
        };
        assert_eq!(ts.ticks_per_measure(480), 1440.0);
    }

    #[test]
    fn test_instrument_ids_are_distinct() {
        let info = MidiFileInfo {
            tracks: vec![track(0, None), track(1, Some(52)), track(2, Some(0))],
            ticks_per_quarter_note: 480,
            duration_ticks: 0,
            tempo_changes: vec![],
            time_signatures: vec![],
        };
        assert_eq!(info.instrument_ids(), vec![0, 52]);
        assert_eq!(info.initial_bpm(), DEFAULT_BPM);
    }

    #[test]
    fn test_file_info_serializes_with_ppq_key() {
        let info = MidiFileInfo {
            tracks: vec![],
            ticks_per_quarter_note: 480,
            duration_ticks: 960,
            tempo_changes: vec![],
            time_signatures: vec![],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["ppq"], 480);
        assert_eq!(json["durationTicks"], 960);
    }
}
