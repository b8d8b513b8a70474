use std::sync::Arc;

use rehearsal_audio::{Instrument, InstrumentError, InstrumentSource, NoteOptions, VoiceHandle};

/// Instruments that log their notes instead of sounding them
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleSource;

impl InstrumentSource for ConsoleSource {
    fn load(&self, instrument_id: u8) -> Result<Arc<dyn Instrument>, InstrumentError> {
        log::debug!("Console instrument {} ready", instrument_id);
        Ok(Arc::new(ConsoleInstrument { instrument_id }))
    }
}

pub struct ConsoleInstrument {
    instrument_id: u8,
}

impl Instrument for ConsoleInstrument {
    fn play(&self, note_name: &str, when: f64, options: NoteOptions) -> Result<Box<dyn VoiceHandle>, InstrumentError> {
        log::info!(
            "{:>8.3}s  program {:<3} {:<4} {:.2}s gain {:.2}",
            when,
            self.instrument_id,
            note_name,
            options.duration_seconds,
            options.gain
        );
        Ok(Box::new(ConsoleVoice {
            note: note_name.to_string(),
        }))
    }
}

pub struct ConsoleVoice {
    note: String,
}

impl VoiceHandle for ConsoleVoice {
    fn stop(&mut self) {
        log::debug!("Stopped {}", self.note);
    }
}
