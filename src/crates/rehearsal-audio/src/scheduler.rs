//! Lookahead scheduling of note events
//!
//! The [`Scheduler`] holds no clock and no timer. The engine passes the
//! current audio time into every call, and the scheduler decides which notes
//! are due, remembers what it has handed to instruments, and forgets notes
//! once they have finished sounding.

use crate::VoiceHandle;
use rehearsal_core::{NoteEvent, TickClock};
use std::time::Duration;

/// How far ahead of the audio clock notes are handed to instruments
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(200);

/// Sounding length assumed for notes without a duration
pub const MIN_SOUNDING_SECONDS: f64 = 0.5;

/// Audio time `time` plays tick `tick`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Origin {
    pub time: f64,
    pub tick: u64,
}

/// A note that has been handed to an instrument
pub struct ScheduledNote {
    pub event_index: usize,
    pub audio_start: f64,
    pub end_time: f64,
    handle: Box<dyn VoiceHandle>,
}

impl ScheduledNote {
    fn stop(mut self) {
        self.handle.stop();
    }
}

pub struct Scheduler {
    /// Lookahead window in seconds
    lookahead: f64,
    /// Index of the next event to consider
    cursor: usize,
    origin: Origin,
    /// In flight, in cursor order
    scheduled: Vec<ScheduledNote>,
}

impl Scheduler {
    pub fn new(lookahead: Duration) -> Self {
        Scheduler {
            lookahead: lookahead.as_secs_f64(),
            cursor: 0,
            origin: Origin { time: 0.0, tick: 0 },
            scheduled: Vec::new(),
        }
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Pin `tick` to audio time `time`
    pub fn anchor(&mut self, time: f64, tick: u64) {
        self.origin = Origin { time, tick };
    }

    /// Tick being played at audio time `now`
    pub fn position(&self, now: f64, clock: &TickClock) -> u64 {
        clock.advance(self.origin.tick, now - self.origin.time)
    }

    /// Audio time at which `tick` plays
    pub fn audio_time(&self, tick: u64, clock: &TickClock) -> f64 {
        self.origin.time + clock.span(self.origin.tick, tick)
    }

    /// Point the cursor at the first event at or after `tick` and silence
    /// everything in flight
    pub fn seek(&mut self, events: &[NoteEvent], tick: u64) {
        self.cursor = events.partition_point(|e| e.tick < tick);
        self.stop_all();
    }

    /// Back to the first event, silencing everything in flight
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.stop_all();
    }

    /// The next event whose audio start falls inside the lookahead window
    ///
    /// Returns its index and audio start time and moves the cursor past it.
    /// The start may already be in the past when the timer lags; callers
    /// must not play such notes.
    pub fn next_due(&mut self, events: &[NoteEvent], now: f64, clock: &TickClock) -> Option<(usize, f64)> {
        let event = events.get(self.cursor)?;
        let start = self.audio_time(event.tick, clock);
        if start > now + self.lookahead {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        Some((index, start))
    }

    /// Remember a note handed to an instrument
    pub fn track(&mut self, event_index: usize, audio_start: f64, sounding_seconds: f64, handle: Box<dyn VoiceHandle>) {
        self.scheduled.push(ScheduledNote {
            event_index,
            audio_start,
            end_time: audio_start + sounding_seconds,
            handle,
        });
    }

    /// Forget notes that have finished sounding. Returns how many were dropped.
    pub fn prune(&mut self, now: f64) -> usize {
        let before = self.scheduled.len();
        self.scheduled.retain(|note| note.end_time > now);
        before - self.scheduled.len()
    }

    /// Move the cursor back to the first event starting at or after `now`
    ///
    /// Used on pause: whatever was queued ahead of the clock gets scheduled
    /// again on resume instead of being lost.
    pub fn rewind_unstarted(&mut self, events: &[NoteEvent], now: f64, clock: &TickClock) {
        let first_unstarted = events.partition_point(|e| self.audio_time(e.tick, clock) < now);
        self.cursor = self.cursor.min(first_unstarted);
    }

    /// Stop every note in flight, sounding or not yet started
    pub fn stop_all(&mut self) {
        for note in self.scheduled.drain(..) {
            note.stop();
        }
    }

    /// Number of notes in flight
    pub fn active_voices(&self) -> usize {
        self.scheduled.len()
    }

    pub fn scheduled(&self) -> impl Iterator<Item = &ScheduledNote> {
        self.scheduled.iter()
    }

    pub fn is_exhausted(&self, events: &[NoteEvent]) -> bool {
        self.cursor >= events.len()
    }

    /// Every event was visited and nothing is still sounding
    pub fn is_finished(&self, events: &[NoteEvent]) -> bool {
        self.is_exhausted(events) && self.scheduled.is_empty()
    }
}
