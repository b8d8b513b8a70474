//! Core types and rules for the rehearsal playback engine
//!
//! This crate holds everything about rehearsal playback that does not touch
//! audio or files: the note/track model a loader produces, tick ↔ time
//! conversion, the track mixer, the transport's state record, and the
//! rehearsal marker map used for jumps and voice lookups.
//!
//! # Examples
//!
//! ```
//! use rehearsal_core::{TempoMap, TempoPolicy, TickClock, TrackMixer, MixerUpdate};
//!
//! // 480 ticks per quarter at the default 120 BPM
//! let map = TempoMap::new(480, &[], TempoPolicy::FirstTempo);
//! let clock = TickClock::new(&map, 1.0);
//! assert!((clock.seconds(960) - 1.0).abs() < 1e-9);
//!
//! let mut mixer = TrackMixer::new(2);
//! mixer.update(1, &MixerUpdate::solo(true));
//! assert_eq!(mixer.effective_volume(0), 0.0);
//! ```
//!
//! # Main Components
//!
//! - **model**: `NoteEvent`, `MidiFileInfo` and friends
//! - **timing**: `TempoMap` and `TickClock`
//! - **mixer**: mute/solo/volume and effective gain
//! - **state**: `PlaybackState` with clamped tempo and transposition
//! - **markers**: `RehearsalMarkerMap` (measure/page/voice lookups)

pub mod markers;
pub mod mixer;
pub mod model;
pub mod note;
pub mod state;
pub mod timing;

pub use markers::{MarkerError, MarkerKind, MarkerWarning, RehearsalMarkerMap};
pub use mixer::{MixerUpdate, TrackMixer, TrackMixerState, DEFAULT_TRACK_VOLUME};
pub use model::{
    MidiFileInfo, MidiTrackInfo, NoteEvent, TempoChange, TimeSignature, DEFAULT_BPM, DEFAULT_INSTRUMENT,
};
pub use note::note_name;
pub use state::{PlaybackState, TransportState, MAX_TEMPO_FACTOR, MAX_TRANSPOSE, MIN_TEMPO_FACTOR, MIN_TRANSPOSE};
pub use timing::{format_clock, format_tick, TempoMap, TempoPolicy, TickClock};
