//! Per-track mute / solo / volume
//!
//! Gains are evaluated when a note is scheduled. Notes already handed to the
//! instrument keep the gain they were scheduled with until they end.

use serde::{Deserialize, Serialize};

/// Volume given to every track on file load
pub const DEFAULT_TRACK_VOLUME: f32 = 0.7;

/// Mixer settings of one track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMixerState {
    pub muted: bool,
    pub solo: bool,
    /// Raw volume (0.0 to 1.0)
    pub volume: f32,
}

impl Default for TrackMixerState {
    fn default() -> Self {
        TrackMixerState {
            muted: false,
            solo: false,
            volume: DEFAULT_TRACK_VOLUME,
        }
    }
}

impl TrackMixerState {
    /// Merge a partial update into this state
    pub fn apply(&mut self, update: &MixerUpdate) {
        if let Some(muted) = update.muted {
            self.muted = muted;
        }
        if let Some(solo) = update.solo {
            self.solo = solo;
        }
        if let Some(volume) = update.volume {
            if volume.is_finite() {
                self.volume = volume.clamp(0.0, 1.0);
            } else {
                log::warn!("Ignoring non-finite track volume {}", volume);
            }
        }
    }
}

/// A partial change to a [`TrackMixerState`]; unset fields are left alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerUpdate {
    pub muted: Option<bool>,
    pub solo: Option<bool>,
    pub volume: Option<f32>,
}

impl MixerUpdate {
    pub fn muted(muted: bool) -> Self {
        MixerUpdate {
            muted: Some(muted),
            ..Default::default()
        }
    }

    pub fn solo(solo: bool) -> Self {
        MixerUpdate {
            solo: Some(solo),
            ..Default::default()
        }
    }

    pub fn volume(volume: f32) -> Self {
        MixerUpdate {
            volume: Some(volume),
            ..Default::default()
        }
    }
}

/// Mixer for every track of the loaded file, indexed by track index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMixer {
    tracks: Vec<TrackMixerState>,
}

impl TrackMixer {
    /// A mixer with default settings for `track_count` tracks
    pub fn new(track_count: usize) -> Self {
        TrackMixer {
            tracks: vec![TrackMixerState::default(); track_count],
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, track_index: usize) -> Option<&TrackMixerState> {
        self.tracks.get(track_index)
    }

    pub fn states(&self) -> &[TrackMixerState] {
        &self.tracks
    }

    /// Apply a partial update; returns the new state, or `None` for an
    /// unknown track
    pub fn update(&mut self, track_index: usize, update: &MixerUpdate) -> Option<TrackMixerState> {
        let state = self.tracks.get_mut(track_index)?;
        state.apply(update);
        Some(*state)
    }

    /// Whether any track is soloed
    pub fn has_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// Final gain of a track after mute, solo and volume
    ///
    /// Unknown tracks are silent.
    pub fn effective_volume(&self, track_index: usize) -> f32 {
        let Some(state) = self.tracks.get(track_index) else {
            return 0.0;
        };
        if state.muted {
            return 0.0;
        }
        if !state.solo && self.has_solo() {
            return 0.0;
        }
        state.volume
    }
}
