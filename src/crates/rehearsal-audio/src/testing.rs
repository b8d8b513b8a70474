//! Fakes shared by the unit and scenario tests

use crate::{Instrument, InstrumentError, InstrumentSource, ManualClock, NoteOptions, VoiceHandle, AudioClock};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One call to `Instrument::play`
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedNote {
    pub instrument_id: u8,
    pub note: String,
    pub when: f64,
    pub options: NoteOptions,
}

#[derive(Default)]
struct Shared {
    played: Mutex<Vec<PlayedNote>>,
    /// Indexes into `played` stopped before their start time
    cancelled: Mutex<Vec<usize>>,
    live_handles: AtomicUsize,
    loads: AtomicUsize,
    gate: Mutex<bool>,
    gate_opened: Condvar,
}

/// Instrument source that records every note instead of making sound
#[derive(Clone)]
pub struct RecordingSource {
    shared: Arc<Shared>,
    clock: ManualClock,
    failing_instruments: HashSet<u8>,
    failing_note: Option<String>,
    gated: bool,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::with_clock(ManualClock::new(0.0))
    }

    /// Cancellations are judged against this clock
    pub fn with_clock(clock: ManualClock) -> Self {
        RecordingSource {
            shared: Arc::new(Shared::default()),
            clock,
            failing_instruments: HashSet::new(),
            failing_note: None,
            gated: false,
        }
    }

    pub fn failing_instrument(mut self, id: u8) -> Self {
        self.failing_instruments.insert(id);
        self
    }

    pub fn failing_note(mut self, note: &str) -> Self {
        self.failing_note = Some(note.to_string());
        self
    }

    /// Loads block until `open_gate` is called
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn open_gate(&self) {
        *self.shared.gate.lock() = true;
        self.shared.gate_opened.notify_all();
    }

    pub fn loads(&self) -> usize {
        self.shared.loads.load(Ordering::SeqCst)
    }

    pub fn played(&self) -> Vec<PlayedNote> {
        self.shared.played.lock().clone()
    }

    /// Notes that actually started: played and not cancelled in advance
    pub fn sounded(&self) -> Vec<PlayedNote> {
        let played = self.shared.played.lock();
        let cancelled = self.shared.cancelled.lock();
        played
            .iter()
            .enumerate()
            .filter(|(i, _)| !cancelled.contains(i))
            .map(|(_, note)| note.clone())
            .collect()
    }

    pub fn cancelled(&self) -> usize {
        self.shared.cancelled.lock().len()
    }

    /// Handles that have not been dropped yet
    pub fn live_handles(&self) -> usize {
        self.shared.live_handles.load(Ordering::SeqCst)
    }
}

impl InstrumentSource for RecordingSource {
    fn load(&self, instrument_id: u8) -> Result<Arc<dyn Instrument>, InstrumentError> {
        if self.gated {
            let mut open = self.shared.gate.lock();
            while !*open {
                self.shared.gate_opened.wait(&mut open);
            }
        }
        self.shared.loads.fetch_add(1, Ordering::SeqCst);

        if self.failing_instruments.contains(&instrument_id) {
            return Err(InstrumentError::Load {
                id: instrument_id,
                reason: "no samples".to_string(),
            });
        }
        Ok(Arc::new(RecordingInstrument {
            id: instrument_id,
            source: self.clone(),
        }))
    }
}

struct RecordingInstrument {
    id: u8,
    source: RecordingSource,
}

impl Instrument for RecordingInstrument {
    fn play(&self, note_name: &str, when: f64, options: NoteOptions) -> Result<Box<dyn VoiceHandle>, InstrumentError> {
        if self.source.failing_note.as_deref() == Some(note_name) {
            return Err(InstrumentError::Playback {
                note: note_name.to_string(),
                reason: "sample missing".to_string(),
            });
        }

        let shared = &self.source.shared;
        let index = {
            let mut played = shared.played.lock();
            played.push(PlayedNote {
                instrument_id: self.id,
                note: note_name.to_string(),
                when,
                options,
            });
            played.len() - 1
        };
        shared.live_handles.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(RecordingHandle {
            index,
            when,
            shared: Arc::clone(shared),
            clock: self.source.clock.clone(),
        }))
    }
}

struct RecordingHandle {
    index: usize,
    when: f64,
    shared: Arc<Shared>,
    clock: ManualClock,
}

impl VoiceHandle for RecordingHandle {
    fn stop(&mut self) {
        // Stopped at or before its onset: it never made a sound
        if self.clock.now() <= self.when {
            self.shared.cancelled.lock().push(self.index);
        }
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.shared.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A note in a fixture track: (tick, key, duration in ticks)
pub type FixtureNote = (u32, u8, u32);

/// Build a format 1 file at 480 ppq
///
/// Track 0 is a conductor track carrying the tempo (if any) and a 4/4 time
/// signature; each entry in `tracks` becomes one more track with an optional
/// program change.
pub fn midi_file(tempo_us: Option<u32>, tracks: &[(Option<u8>, Vec<FixtureNote>)]) -> Vec<u8> {
    let mut conductor = Vec::new();
    if let Some(tempo) = tempo_us {
        conductor.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(tempo.into())),
        });
    }
    conductor.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
    });
    conductor.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(480.into())));
    smf.tracks.push(conductor);

    for (channel, (program, notes)) in tracks.iter().enumerate() {
        let channel = (channel as u8).into();
        let mut track = Vec::new();
        if let Some(program) = program {
            track.push(TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::ProgramChange {
                        program: (*program).into(),
                    },
                },
            });
        }

        let mut messages: Vec<(u32, bool, u8)> = Vec::new();
        for &(tick, key, duration) in notes {
            messages.push((tick, true, key));
            messages.push((tick + duration, false, key));
        }
        messages.sort_by_key(|&(tick, on, _)| (tick, on));

        let mut last = 0;
        for (tick, on, key) in messages {
            let message = if on {
                MidiMessage::NoteOn {
                    key: key.into(),
                    vel: 100.into(),
                }
            } else {
                MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0.into(),
                }
            };
            track.push(TrackEvent {
                delta: (tick - last).into(),
                kind: TrackEventKind::Midi { channel, message },
            });
            last = tick;
        }
        track.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).expect("fixture encodes");
    bytes
}

/// `count` notes spaced `step` ticks apart, each `step / 2` long, with keys
/// counting up from `first_key`
pub fn scale(count: u32, step: u32, first_key: u8) -> Vec<FixtureNote> {
    (0..count)
        .map(|i| (i * step, first_key + i as u8, step / 2))
        .collect()
}
