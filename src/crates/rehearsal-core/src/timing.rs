//! Tick ↔ seconds conversion
//!
//! A [`TempoMap`] is built once per loaded file. A [`TickClock`] pairs it with
//! the current tempo factor; the factor only changes how ticks map to
//! seconds, so stored tick positions (and therefore markers and seek targets)
//! are independent of playback speed.

use crate::model::{MidiFileInfo, TempoChange, DEFAULT_BPM};
use serde::{Deserialize, Serialize};

/// How tempo changes after the first one are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TempoPolicy {
    /// The first tempo change (or 120 BPM) drives the whole piece
    #[default]
    FirstTempo,
    /// Every tempo change is honored, piecewise
    TempoMap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoSegment {
    tick: u64,
    /// Start of the segment in seconds at tempo factor 1
    seconds: f64,
    bpm: f64,
}

/// Tempo timeline of one file
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ppq: f64,
    /// Never empty; the first segment starts at tick 0
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    /// Build the timeline from a sorted list of tempo changes
    pub fn new(ppq: u16, changes: &[TempoChange], policy: TempoPolicy) -> Self {
        let ppq = ppq.max(1) as f64;
        let valid = changes.iter().filter(|c| c.bpm.is_finite() && c.bpm > 0.0);

        let segments = match policy {
            TempoPolicy::FirstTempo => {
                let bpm = valid.map(|c| c.bpm).next().unwrap_or(DEFAULT_BPM);
                vec![TempoSegment {
                    tick: 0,
                    seconds: 0.0,
                    bpm,
                }]
            }
            TempoPolicy::TempoMap => {
                let mut segments = vec![TempoSegment {
                    tick: 0,
                    seconds: 0.0,
                    bpm: DEFAULT_BPM,
                }];
                for change in valid {
                    let last = segments[segments.len() - 1];
                    if change.tick <= last.tick {
                        // Same position: the later event wins
                        let idx = segments.len() - 1;
                        segments[idx].bpm = change.bpm;
                        continue;
                    }
                    let seconds = last.seconds + (change.tick - last.tick) as f64 * 60.0 / (last.bpm * ppq);
                    segments.push(TempoSegment {
                        tick: change.tick,
                        seconds,
                        bpm: change.bpm,
                    });
                }
                segments
            }
        };

        TempoMap { ppq, segments }
    }

    /// Build the timeline for a loaded file
    pub fn from_file(info: &MidiFileInfo, policy: TempoPolicy) -> Self {
        Self::new(info.ticks_per_quarter_note, &info.tempo_changes, policy)
    }

    /// True when a single tempo covers the whole piece
    pub fn is_linear(&self) -> bool {
        self.segments.len() == 1
    }

    /// Tempo in effect at the start of the piece
    pub fn initial_bpm(&self) -> f64 {
        self.segments[0].bpm
    }

    /// Tempo in effect at a tick
    pub fn bpm_at(&self, tick: u64) -> f64 {
        self.segment_for_tick(tick).bpm
    }

    /// Nominal time of a tick at tempo factor 1
    pub fn seconds_at(&self, tick: u64) -> f64 {
        let seg = self.segment_for_tick(tick);
        seg.seconds + (tick - seg.tick) as f64 * 60.0 / (seg.bpm * self.ppq)
    }

    /// Tick reached at a nominal time (tempo factor 1), rounded down
    pub fn tick_at(&self, seconds: f64) -> u64 {
        if !(seconds > 0.0) {
            return 0;
        }
        let idx = self
            .segments
            .partition_point(|s| s.seconds <= seconds)
            .saturating_sub(1);
        let seg = self.segments[idx];
        seg.tick + ((seconds - seg.seconds) * seg.bpm * self.ppq / 60.0).floor() as u64
    }

    fn segment_for_tick(&self, tick: u64) -> TempoSegment {
        let idx = self
            .segments
            .partition_point(|s| s.tick <= tick)
            .saturating_sub(1);
        self.segments[idx]
    }
}

/// A tempo map viewed through a tempo factor
#[derive(Debug, Clone, Copy)]
pub struct TickClock<'a> {
    map: &'a TempoMap,
    tempo_factor: f64,
}

impl<'a> TickClock<'a> {
    pub fn new(map: &'a TempoMap, tempo_factor: f64) -> Self {
        TickClock { map, tempo_factor }
    }

    /// `60 / (bpm × ppq × tempoFactor)` for the opening tempo
    pub fn seconds_per_tick(&self) -> f64 {
        60.0 / (self.map.initial_bpm() * self.map.ppq * self.tempo_factor)
    }

    /// Playback time of a tick, measured from tick 0
    pub fn seconds(&self, ticks: u64) -> f64 {
        if self.map.is_linear() {
            ticks as f64 * self.seconds_per_tick()
        } else {
            self.map.seconds_at(ticks) / self.tempo_factor
        }
    }

    /// Tick reached after `seconds` of playback from tick 0, rounded down
    pub fn ticks(&self, seconds: f64) -> u64 {
        if !(seconds > 0.0) {
            return 0;
        }
        if self.map.is_linear() {
            (seconds / self.seconds_per_tick()).floor() as u64
        } else {
            self.map.tick_at(seconds * self.tempo_factor)
        }
    }

    /// Signed playback time between two ticks
    pub fn span(&self, from: u64, to: u64) -> f64 {
        if self.map.is_linear() {
            (to as f64 - from as f64) * self.seconds_per_tick()
        } else {
            self.seconds(to) - self.seconds(from)
        }
    }

    /// Tick reached `elapsed` seconds after starting at `from`
    pub fn advance(&self, from: u64, elapsed: f64) -> u64 {
        if self.map.is_linear() {
            from + self.ticks(elapsed)
        } else {
            self.ticks(self.seconds(from) + elapsed.max(0.0)).max(from)
        }
    }
}

/// Format seconds as `mm:ss`
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Format a tick with an approximate 4/4 measure number
pub fn format_tick(tick: u64, ppq: u32) -> String {
    let measure = tick / (ppq.max(1) as u64 * 4) + 1;
    format!("{} (~ m.{})", tick, measure)
}
