//! The seam between the scheduler and whatever makes sound

use crate::InstrumentError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a single note should be played
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteOptions {
    /// Sounding length, already scaled by the tempo factor
    pub duration_seconds: f64,
    /// `velocity × effective track volume`
    pub gain: f32,
}

/// A note handed to an instrument; dropping it lets the note ring out
pub trait VoiceHandle: Send {
    /// Silence the note now, or cancel it if it has not started yet
    fn stop(&mut self);
}

/// A loaded instrument that can start notes on the audio clock
pub trait Instrument: Send + Sync {
    /// Start `note_name` (e.g. "C#4") at audio time `when`
    fn play(
        &self,
        note_name: &str,
        when: f64,
        options: NoteOptions,
    ) -> std::result::Result<Box<dyn VoiceHandle>, InstrumentError>;
}

/// Loads instruments by General MIDI program number
pub trait InstrumentSource: Send + Sync {
    fn load(&self, instrument_id: u8) -> std::result::Result<Arc<dyn Instrument>, InstrumentError>;
}
