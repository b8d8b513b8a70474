use serde::{Deserialize, Deserializer, Serialize};

pub const MIN_TEMPO_FACTOR: f64 = 0.1;
pub const MAX_TEMPO_FACTOR: f64 = 4.0;
pub const MIN_TRANSPOSE: i32 = -24;
pub const MAX_TRANSPOSE: i32 = 24;

/// Coarse transport state, derived from [`PlaybackState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

/// Where playback currently is
///
/// This is the record a UI polls for its progress bar and transport buttons.
/// Tempo factor and transposition are clamped by their setters, so a value
/// read from here is always within range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    pub is_paused: bool,
    #[serde(deserialize_with = "clamped_tempo_factor")]
    tempo_factor: f64,
    #[serde(deserialize_with = "clamped_transpose")]
    transpose_semitones: i32,
    pub current_tick: u64,
    pub current_time_seconds: f64,
    pub selected_measure: Option<String>,
    pub selected_page: Option<String>,
}

fn clamped_tempo_factor<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let factor = f64::deserialize(deserializer)?;
    Ok(if factor.is_finite() {
        factor.clamp(MIN_TEMPO_FACTOR, MAX_TEMPO_FACTOR)
    } else {
        1.0
    })
}

fn clamped_transpose<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    Ok(i32::deserialize(deserializer)?.clamp(MIN_TRANSPOSE, MAX_TRANSPOSE))
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState {
            is_playing: false,
            is_paused: false,
            tempo_factor: 1.0,
            transpose_semitones: 0,
            current_tick: 0,
            current_time_seconds: 0.0,
            selected_measure: None,
            selected_page: None,
        }
    }
}

impl PlaybackState {
    pub fn transport(&self) -> TransportState {
        match (self.is_playing, self.is_paused) {
            (true, _) => TransportState::Playing,
            (false, true) => TransportState::Paused,
            (false, false) => TransportState::Stopped,
        }
    }

    pub fn tempo_factor(&self) -> f64 {
        self.tempo_factor
    }

    /// Set the tempo factor, clamped to [0.1, 4.0]
    ///
    /// Non-finite requests are ignored. Returns the value now in effect.
    pub fn set_tempo_factor(&mut self, factor: f64) -> f64 {
        if factor.is_finite() {
            self.tempo_factor = factor.clamp(MIN_TEMPO_FACTOR, MAX_TEMPO_FACTOR);
        } else {
            log::warn!("Ignoring non-finite tempo factor {}", factor);
        }
        self.tempo_factor
    }

    pub fn transpose_semitones(&self) -> i32 {
        self.transpose_semitones
    }

    /// Set the transposition, clamped to [-24, 24]. Returns the value now in
    /// effect.
    pub fn set_transpose_semitones(&mut self, semitones: i32) -> i32 {
        self.transpose_semitones = semitones.clamp(MIN_TRANSPOSE, MAX_TRANSPOSE);
        self.transpose_semitones
    }

    /// Apply the current transposition to a note, or `None` if it leaves the
    /// MIDI range
    pub fn transpose(&self, midi_note: u8) -> Option<u8> {
        let shifted = midi_note as i32 + self.transpose_semitones;
        u8::try_from(shifted).ok().filter(|n| *n <= 127)
    }

    /// Move the position back to the start
    pub fn rewind(&mut self) {
        self.current_tick = 0;
        self.current_time_seconds = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_transport_states() {
        let mut state = PlaybackState::default();
        assert_eq!(state.transport(), TransportState::Stopped);
        state.is_playing = true;
        assert_eq!(state.transport(), TransportState::Playing);
        state.is_playing = false;
        state.is_paused = true;
        assert_eq!(state.transport(), TransportState::Paused);
    }

    #[test]
    fn test_transpose_drops_out_of_range() {
        let mut state = PlaybackState::default();
        state.set_transpose_semitones(12);
        assert_eq!(state.transpose(60), Some(72));
        assert_eq!(state.transpose(120), None);

        state.set_transpose_semitones(-24);
        assert_eq!(state.transpose(24), Some(0));
        assert_eq!(state.transpose(23), None);
    }

    #[test]
    fn test_non_finite_tempo_is_ignored() {
        let mut state = PlaybackState::default();
        state.set_tempo_factor(0.5);
        assert_eq!(state.set_tempo_factor(f64::NAN), 0.5);
        assert_eq!(state.set_tempo_factor(f64::INFINITY), 0.5);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(PlaybackState::default()).unwrap();
        assert_eq!(json["tempoFactor"], 1.0);
        assert_eq!(json["transposeSemitones"], 0);
        assert_eq!(json["isPlaying"], false);
    }

    #[test]
    fn test_deserializing_clamps_out_of_range_values() {
        let mut json = serde_json::to_value(PlaybackState::default()).unwrap();
        json["tempoFactor"] = 10.0.into();
        json["transposeSemitones"] = (-99).into();

        let state: PlaybackState = serde_json::from_value(json).unwrap();
        assert_eq!(state.tempo_factor(), MAX_TEMPO_FACTOR);
        assert_eq!(state.transpose_semitones(), MIN_TRANSPOSE);
    }

    proptest! {
        #[test]
        fn prop_tempo_factor_is_clamped(factor in -100.0f64..100.0) {
            let mut state = PlaybackState::default();
            let applied = state.set_tempo_factor(factor);
            prop_assert!((MIN_TEMPO_FACTOR..=MAX_TEMPO_FACTOR).contains(&applied));
            prop_assert_eq!(applied, state.tempo_factor());
        }

        #[test]
        fn prop_transpose_is_clamped(semitones in any::<i32>()) {
            let mut state = PlaybackState::default();
            let applied = state.set_transpose_semitones(semitones);
            prop_assert!((MIN_TRANSPOSE..=MAX_TRANSPOSE).contains(&applied));
        }
    }
}
