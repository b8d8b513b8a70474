use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use rehearsal_core::{MidiFileInfo, MidiTrackInfo, NoteEvent, TempoChange, TempoMap, TempoPolicy, TimeSignature};

use crate::error::{ParseError, Result};

/// A parsed file: the track summary plus every note, sorted by tick
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMidi {
    pub info: MidiFileInfo,
    pub events: Vec<NoteEvent>,
}

/// A note between its on and off events
#[derive(Debug, Clone, Copy)]
struct RawNote {
    tick: u64,
    /// Position of the note-on within the track
    order: usize,
    duration_ticks: u64,
    key: u8,
    velocity: u8,
}

impl LoadedMidi {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Parse a complete Standard MIDI File
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let smf = Smf::parse(data)?;

        let ppq = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int(),
            Timing::Timecode(fps, subframes) => {
                return Err(ParseError::UnsupportedTiming {
                    fps: fps.as_f32(),
                    subframes,
                });
            }
        };
        if ppq == 0 {
            return Err(ParseError::InvalidPpq);
        }

        let (tempo_changes, time_signatures) = collect_meta(&smf);
        // Nominal note times honor the whole tempo map
        let tempo_map = TempoMap::new(ppq, &tempo_changes, TempoPolicy::TempoMap);

        let mut tracks = Vec::with_capacity(smf.tracks.len());
        let mut events = Vec::new();

        for (track_index, track) in smf.tracks.iter().enumerate() {
            let (info, notes) = parse_track(track_index, track);
            log::debug!(
                "Track {} '{}': {} notes, channel {:?}, program {:?}",
                track_index,
                info.name,
                info.note_count,
                info.channel,
                info.instrument_id
            );

            events.extend(notes.into_iter().map(|note| {
                let start = tempo_map.seconds_at(note.tick);
                let end = tempo_map.seconds_at(note.tick + note.duration_ticks);
                NoteEvent {
                    track_index,
                    tick: note.tick,
                    duration_ticks: note.duration_ticks,
                    midi_note: note.key,
                    velocity: note.velocity as f32 / 127.0,
                    start_time_seconds: start,
                    duration_seconds: end - start,
                }
            }));
            tracks.push(info);
        }

        // Stable: equal ticks keep track order, then file order
        events.sort_by_key(|e| e.tick);

        let duration_ticks = events.iter().map(NoteEvent::end_tick).max().unwrap_or(0);

        let info = MidiFileInfo {
            tracks,
            ticks_per_quarter_note: ppq,
            duration_ticks,
            tempo_changes,
            time_signatures,
        };

        log::info!(
            "Loaded MIDI file: {} tracks, {} notes, ppq {}, {} ticks, {:.1} BPM",
            info.tracks.len(),
            events.len(),
            ppq,
            duration_ticks,
            info.initial_bpm()
        );

        Ok(LoadedMidi { info, events })
    }
}

/// Tempo and time signature events from every track, sorted by tick
fn collect_meta(smf: &Smf) -> (Vec<TempoChange>, Vec<TimeSignature>) {
    let mut tempo_changes = Vec::new();
    let mut time_signatures = Vec::new();

    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_changes.push(TempoChange::from_microseconds(tick, tempo.as_int()));
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denom_pow, _, _)) => {
                    match 1u32.checked_shl(denom_pow as u32) {
                        Some(denominator) => time_signatures.push(TimeSignature {
                            tick,
                            numerator,
                            denominator,
                        }),
                        None => log::warn!("Skipping time signature with denominator 2^{}", denom_pow),
                    }
                }
                _ => {}
            }
        }
    }

    tempo_changes.sort_by_key(|t| t.tick);
    time_signatures.sort_by_key(|t| t.tick);
    (tempo_changes, time_signatures)
}

fn parse_track(track_index: usize, track: &[TrackEvent]) -> (MidiTrackInfo, Vec<RawNote>) {
    let mut tick: u64 = 0;
    let mut name: Option<String> = None;
    let mut channel: Option<u8> = None;
    let mut program: Option<u8> = None;
    let mut notes: Vec<RawNote> = Vec::new();
    // Open notes per (channel, key), oldest first
    let mut open: HashMap<(u8, u8), VecDeque<(u64, u8, usize)>> = HashMap::new();
    let mut note_ons = 0;

    for event in track {
        tick += event.delta.as_int() as u64;

        match event.kind {
            TrackEventKind::Midi { channel: ch, message } => {
                let ch = ch.as_int();
                if channel.is_none() {
                    channel = Some(ch);
                }

                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        open.entry((ch, key.as_int()))
                            .or_default()
                            .push_back((tick, vel.as_int(), note_ons));
                        note_ons += 1;
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let key = key.as_int();
                        if let Some((start, velocity, order)) = open.get_mut(&(ch, key)).and_then(VecDeque::pop_front) {
                            notes.push(RawNote {
                                tick: start,
                                order,
                                duration_ticks: tick - start,
                                key,
                                velocity,
                            });
                        }
                    }
                    MidiMessage::ProgramChange { program: prog } => {
                        program = Some(prog.as_int());
                    }
                    _ => {}
                }
            }
            TrackEventKind::Meta(MetaMessage::TrackName(bytes)) if name.is_none() => {
                let cleaned = String::from_utf8_lossy(bytes);
                let cleaned = cleaned.trim_end_matches('\0').trim();
                if !cleaned.is_empty() {
                    name = Some(cleaned.to_string());
                }
            }
            _ => {}
        }
    }

    // Close anything still sounding at the end of the track
    for ((_, key), pending) in open {
        for (start, velocity, order) in pending {
            notes.push(RawNote {
                tick: start,
                order,
                duration_ticks: tick - start,
                key,
                velocity,
            });
        }
    }

    notes.sort_by_key(|n| (n.tick, n.order));

    let info = MidiTrackInfo {
        index: track_index,
        name: name.unwrap_or_else(|| format!("Track {}", track_index + 1)),
        note_count: notes.len(),
        channel,
        instrument_id: program,
    };
    (info, notes)
}
