//! Playback engine: file, mixer and transport in one place
//!
//! Every method takes `&mut self`; callers that share the engine between a
//! timer thread and a UI wrap it in a mutex (see [`crate::Player`]), which
//! makes each scheduling pass and each transport call a critical section.

use crate::scheduler::{Scheduler, DEFAULT_LOOKAHEAD, MIN_SOUNDING_SECONDS};
use crate::{AudioClock, EngineError, InstrumentBank, InstrumentSource, NoteOptions, Result};
use rehearsal_core::{
    note_name, MarkerKind, MidiFileInfo, MixerUpdate, NoteEvent, PlaybackState, RehearsalMarkerMap, TempoMap,
    TempoPolicy, TickClock, TrackMixer, TrackMixerState, TransportState,
};
use rehearsal_midi::LoadedMidi;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// How far ahead of the audio clock notes are scheduled
    pub lookahead: Duration,
    /// How tempo changes after the first are treated
    pub tempo_policy: TempoPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            lookahead: DEFAULT_LOOKAHEAD,
            tempo_policy: TempoPolicy::default(),
        }
    }
}

struct LoadedFile {
    info: MidiFileInfo,
    /// Sorted by tick, never mutated after load
    events: Vec<NoteEvent>,
    tempo_map: TempoMap,
}

impl LoadedFile {
    fn clock(&self, tempo_factor: f64) -> TickClock<'_> {
        TickClock::new(&self.tempo_map, tempo_factor)
    }

    fn instrument_for(&self, track_index: usize) -> u8 {
        self.info
            .tracks
            .get(track_index)
            .map(|t| t.instrument())
            .unwrap_or(rehearsal_core::DEFAULT_INSTRUMENT)
    }
}

pub struct PlaybackEngine {
    clock: Arc<dyn AudioClock>,
    bank: InstrumentBank,
    config: EngineConfig,
    file: Option<LoadedFile>,
    mixer: TrackMixer,
    state: PlaybackState,
    scheduler: Scheduler,
}

impl PlaybackEngine {
    pub fn new(clock: Arc<dyn AudioClock>, source: Arc<dyn InstrumentSource>, config: EngineConfig) -> Self {
        PlaybackEngine {
            clock,
            bank: InstrumentBank::new(source),
            config,
            file: None,
            mixer: TrackMixer::new(0),
            state: PlaybackState::default(),
            scheduler: Scheduler::new(config.lookahead),
        }
    }

    /// Parse a MIDI file and make it the current piece
    ///
    /// On a parse error nothing changes: the previous file, mixer and
    /// position stay as they were.
    pub fn load_file(&mut self, bytes: &[u8]) -> Result<MidiFileInfo> {
        let loaded = LoadedMidi::from_bytes(bytes)?;
        Ok(self.load_midi(loaded))
    }

    pub fn load_path(&mut self, path: &Path) -> Result<MidiFileInfo> {
        let loaded = LoadedMidi::from_file(path)?;
        Ok(self.load_midi(loaded))
    }

    /// Replace the current piece with an already parsed one
    ///
    /// Playback stops, the mixer is rebuilt with one default strip per
    /// track, and every instrument the file uses starts loading. Tempo factor
    /// and transposition carry over.
    pub fn load_midi(&mut self, loaded: LoadedMidi) -> MidiFileInfo {
        self.scheduler.reset();

        let tempo_factor = self.state.tempo_factor();
        let transpose = self.state.transpose_semitones();
        self.state = PlaybackState::default();
        self.state.set_tempo_factor(tempo_factor);
        self.state.set_transpose_semitones(transpose);

        let LoadedMidi { info, events } = loaded;
        self.mixer = TrackMixer::new(info.tracks.len());
        self.bank.preload(&info.instrument_ids());

        let tempo_map = TempoMap::from_file(&info, self.config.tempo_policy);
        if info.has_tempo_changes() && self.config.tempo_policy == TempoPolicy::FirstTempo {
            log::info!(
                "File has {} tempo changes, playing everything at {:.1} BPM",
                info.tempo_changes.len(),
                tempo_map.initial_bpm()
            );
        }

        log::info!(
            "Loaded {} tracks with {} notes ({} ticks)",
            info.tracks.len(),
            events.len(),
            info.duration_ticks
        );

        self.file = Some(LoadedFile {
            info: info.clone(),
            events,
            tempo_map,
        });
        info
    }

    /// Start or resume playback
    ///
    /// From `Stopped` playback starts at the current tick; from `Paused` it
    /// picks up where the pause left it. Already playing is a no-op. The
    /// first scheduling pass runs here, at the anchor time, so notes on the
    /// start tick are never late.
    pub fn play(&mut self) -> Result<()> {
        let file = self.file.as_ref().ok_or(EngineError::NoFile)?;
        if self.state.is_playing {
            return Ok(());
        }
        self.bank.ensure_ready(&file.info.instrument_ids())?;

        let now = self.clock.now();
        if !self.state.is_paused {
            self.scheduler.seek(&file.events, self.state.current_tick);
        }
        self.scheduler.anchor(now, self.state.current_tick);

        self.state.is_playing = true;
        self.state.is_paused = false;
        log::debug!("Playing from tick {}", self.state.current_tick);
        self.schedule(now);
        Ok(())
    }

    /// Halt scheduling and silence everything; `play()` resumes
    pub fn pause(&mut self) {
        if !self.state.is_playing {
            return;
        }
        let Some(file) = self.file.as_ref() else {
            return;
        };

        let now = self.clock.now();
        let clock = file.clock(self.state.tempo_factor());
        self.state.current_tick = self.scheduler.position(now, &clock);
        self.state.current_time_seconds = clock.seconds(self.state.current_tick);
        self.scheduler.rewind_unstarted(&file.events, now, &clock);
        self.scheduler.stop_all();

        self.state.is_playing = false;
        self.state.is_paused = true;
        log::debug!("Paused at tick {}", self.state.current_tick);
    }

    /// Silence everything and rewind to the start
    pub fn stop(&mut self) {
        if self.state.transport() != TransportState::Stopped {
            log::debug!("Stopped at tick {}", self.state.current_tick);
        }
        self.state.is_playing = false;
        self.state.is_paused = false;
        self.state.rewind();
        self.scheduler.reset();
    }

    /// Move to `tick` without changing the transport state
    pub fn seek(&mut self, tick: u64) -> Result<()> {
        let file = self.file.as_ref().ok_or(EngineError::NoFile)?;

        self.scheduler.seek(&file.events, tick);
        self.state.current_tick = tick;
        self.state.current_time_seconds = file.clock(self.state.tempo_factor()).seconds(tick);
        if self.state.is_playing {
            let now = self.clock.now();
            self.scheduler.anchor(now, tick);
            self.schedule(now);
        }
        Ok(())
    }

    /// Seek to a measure label from the marker map
    pub fn jump_to_measure(&mut self, markers: &RehearsalMarkerMap, label: &str) -> Result<u64> {
        let tick = self.jump(markers, MarkerKind::Measure, label)?;
        self.state.selected_measure = Some(label.to_string());
        Ok(tick)
    }

    /// Seek to a page label from the marker map
    pub fn jump_to_page(&mut self, markers: &RehearsalMarkerMap, label: &str) -> Result<u64> {
        let tick = self.jump(markers, MarkerKind::Page, label)?;
        self.state.selected_page = Some(label.to_string());
        Ok(tick)
    }

    fn jump(&mut self, markers: &RehearsalMarkerMap, kind: MarkerKind, label: &str) -> Result<u64> {
        let file = self.file.as_ref().ok_or(EngineError::NoFile)?;
        let tick = markers
            .tick_for(kind, label)
            .ok_or_else(|| EngineError::UnknownMarker {
                kind,
                label: label.to_string(),
            })?;

        if markers.ppq != file.info.ticks_per_quarter_note as u32 {
            log::warn!(
                "Marker map uses ppq {} but the file uses {}",
                markers.ppq,
                file.info.ticks_per_quarter_note
            );
        }
        for warning in markers.monotonic_warnings() {
            log::warn!("{}", warning);
        }

        self.seek(tick)?;
        Ok(tick)
    }

    /// Set the tempo factor; returns the clamped value now in effect
    ///
    /// While playing, the time origin is moved to the current position so
    /// the progress position does not jump.
    pub fn set_tempo_factor(&mut self, factor: f64) -> f64 {
        let Some(file) = self.file.as_ref() else {
            return self.state.set_tempo_factor(factor);
        };

        if self.state.is_playing {
            let now = self.clock.now();
            let clock = file.clock(self.state.tempo_factor());
            self.state.current_tick = self.scheduler.position(now, &clock);
            let applied = self.state.set_tempo_factor(factor);
            self.scheduler.anchor(now, self.state.current_tick);
            self.state.current_time_seconds = file.clock(applied).seconds(self.state.current_tick);
            applied
        } else {
            let applied = self.state.set_tempo_factor(factor);
            self.state.current_time_seconds = file.clock(applied).seconds(self.state.current_tick);
            applied
        }
    }

    /// Set the transposition for notes scheduled from now on
    pub fn set_transpose(&mut self, semitones: i32) -> i32 {
        self.state.set_transpose_semitones(semitones)
    }

    pub fn set_track_mixer(&mut self, track_index: usize, update: &MixerUpdate) -> Result<TrackMixerState> {
        self.mixer
            .update(track_index, update)
            .ok_or(EngineError::UnknownTrack(track_index))
    }

    pub fn toggle_mute(&mut self, track_index: usize) -> Result<TrackMixerState> {
        let muted = self.track_mixer(track_index)?.muted;
        self.set_track_mixer(track_index, &MixerUpdate::muted(!muted))
    }

    pub fn toggle_solo(&mut self, track_index: usize) -> Result<TrackMixerState> {
        let solo = self.track_mixer(track_index)?.solo;
        self.set_track_mixer(track_index, &MixerUpdate::solo(!solo))
    }

    /// Apply a mixer update to the track a voice is sung from
    pub fn set_voice_mixer(
        &mut self,
        markers: &RehearsalMarkerMap,
        voice: &str,
        update: &MixerUpdate,
    ) -> Result<TrackMixerState> {
        let track_index = markers
            .voice_track(voice)
            .ok_or_else(|| EngineError::UnknownVoice(voice.to_string()))?;
        self.set_track_mixer(track_index, update)
    }

    pub fn track_mixer(&self, track_index: usize) -> Result<TrackMixerState> {
        self.mixer
            .get(track_index)
            .copied()
            .ok_or(EngineError::UnknownTrack(track_index))
    }

    pub fn mixer(&self) -> &TrackMixer {
        &self.mixer
    }

    /// One scheduling pass; returns the transport state afterwards
    ///
    /// Updates the position from the audio clock, hands every note inside
    /// the lookahead window to its instrument, forgets finished notes, and
    /// stops once the piece has played out.
    pub fn tick(&mut self) -> TransportState {
        if self.state.is_playing {
            let now = self.clock.now();
            self.schedule(now);
        }
        self.state.transport()
    }

    fn schedule(&mut self, now: f64) {
        let Some(file) = self.file.as_ref() else {
            return;
        };

        let tempo_factor = self.state.tempo_factor();
        let clock = file.clock(tempo_factor);
        self.state.current_tick = self.scheduler.position(now, &clock);
        self.state.current_time_seconds = clock.seconds(self.state.current_tick);

        while let Some((index, start)) = self.scheduler.next_due(&file.events, now, &clock) {
            // Already late, never trigger in the past
            if start < now {
                continue;
            }
            let event = &file.events[index];

            let volume = self.mixer.effective_volume(event.track_index);
            if volume <= 0.0 {
                continue;
            }
            let Some(midi_note) = self.state.transpose(event.midi_note) else {
                continue;
            };

            let instrument_id = file.instrument_for(event.track_index);
            let Some(instrument) = self.bank.get(instrument_id) else {
                log::warn!("Instrument {} is not loaded, skipping note", instrument_id);
                continue;
            };

            let nominal = if event.duration_seconds > 0.0 {
                event.duration_seconds
            } else {
                MIN_SOUNDING_SECONDS
            };
            let sounding = nominal / tempo_factor;
            let options = NoteOptions {
                duration_seconds: sounding,
                gain: event.velocity * volume,
            };

            match instrument.play(&note_name(midi_note), start, options) {
                Ok(handle) => self.scheduler.track(index, start, sounding, handle),
                Err(e) => log::warn!("Failed to schedule note: {}", e),
            }
        }

        self.scheduler.prune(now);

        if self.scheduler.is_finished(&file.events) {
            log::info!("Playback finished");
            self.stop();
        }
    }

    /// Snapshot of the transport state
    pub fn state(&self) -> PlaybackState {
        self.state.clone()
    }

    pub fn transport(&self) -> TransportState {
        self.state.transport()
    }

    pub fn file_info(&self) -> Option<&MidiFileInfo> {
        self.file.as_ref().map(|f| &f.info)
    }

    pub fn events(&self) -> &[NoteEvent] {
        self.file.as_ref().map(|f| f.events.as_slice()).unwrap_or(&[])
    }

    /// Whether every instrument of the current file has loaded
    pub fn is_ready(&self) -> bool {
        self.file
            .as_ref()
            .is_some_and(|f| self.bank.all_ready(&f.info.instrument_ids()))
    }

    pub fn bank(&self) -> &InstrumentBank {
        &self.bank
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Notes handed to instruments that are still sounding or pending
    pub fn active_voices(&self) -> usize {
        self.scheduler.active_voices()
    }

    /// Stop playback and release every instrument
    pub fn dispose(&mut self) {
        self.stop();
        self.bank.clear();
        log::debug!("Playback engine disposed");
    }
}
