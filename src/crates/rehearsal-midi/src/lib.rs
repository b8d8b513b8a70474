//! MIDI file loader for rehearsal playback
//!
//! Turns a Standard MIDI File into a [`LoadedMidi`]: the per-track summary
//! (`MidiFileInfo`) plus one flat, tick-sorted list of `NoteEvent`s that the
//! playback engine walks with a single cursor.

pub mod error;
pub mod midi;

// Re-export main types for convenience
pub use error::{ParseError, Result};
pub use midi::LoadedMidi;
