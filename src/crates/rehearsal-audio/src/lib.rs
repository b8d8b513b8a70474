//! Rehearsal playback engine
//!
//! This crate turns a loaded MIDI file into scheduled instrument notes:
//! - A lookahead [`Scheduler`] walks the tick-sorted notes with one cursor
//! - [`PlaybackEngine`] owns the file, mixer and transport state
//! - [`Player`] drives the engine from a background timer thread
//! - Instruments are loaded and cached per program number by an
//!   [`InstrumentBank`]

pub mod bank;
pub mod clock;
pub mod engine;
pub mod instrument;
pub mod player;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use bank::{InstrumentBank, LoadStatus};
pub use clock::{AudioClock, ManualClock, SystemClock};
pub use engine::{EngineConfig, PlaybackEngine};
pub use instrument::{Instrument, InstrumentSource, NoteOptions, VoiceHandle};
pub use player::{Player, PlayerConfig};
pub use scheduler::{Scheduler, DEFAULT_LOOKAHEAD, MIN_SOUNDING_SECONDS};

/// Re-export common types from rehearsal-core
pub use rehearsal_core::{
    MidiFileInfo, MixerUpdate, NoteEvent, PlaybackState, RehearsalMarkerMap, TempoPolicy, TrackMixerState,
    TransportState,
};
pub use rehearsal_midi::ParseError;

/// Instrument loading and playback failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    #[error("Instrument {0} is not available")]
    NotFound(u8),

    #[error("Failed to load instrument {id}: {reason}")]
    Load { id: u8, reason: String },

    #[error("Failed to play note {note}: {reason}")]
    Playback { note: String, reason: String },
}

/// Playback engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No MIDI file loaded")]
    NoFile,

    #[error("Instruments are still loading: {0:?}")]
    NotReady(Vec<u8>),

    #[error(transparent)]
    InstrumentLoad(#[from] InstrumentError),

    #[error("Unknown track index {0}")]
    UnknownTrack(usize),

    #[error("Unknown {kind} '{label}'")]
    UnknownMarker {
        kind: rehearsal_core::MarkerKind,
        label: String,
    },

    #[error("Unknown voice '{0}'")]
    UnknownVoice(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Failed to start scheduler thread: {0}")]
    Timer(std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
