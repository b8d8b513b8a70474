//! Timer-driven playback around a shared [`PlaybackEngine`]

use crate::{AudioClock, EngineConfig, EngineError, InstrumentSource, PlaybackEngine, Result};
use parking_lot::{Mutex, MutexGuard};
use rehearsal_core::{PlaybackState, TransportState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for the player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerConfig {
    /// How often the scheduler runs
    pub interval: Duration,
    pub engine: EngineConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            interval: Duration::from_millis(25),
            engine: EngineConfig::default(),
        }
    }
}

struct Timer {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Runs the engine's scheduling pass on a background thread while playing
pub struct Player {
    engine: Arc<Mutex<PlaybackEngine>>,
    config: PlayerConfig,
    timer: Option<Timer>,
}

impl Player {
    pub fn new(clock: Arc<dyn AudioClock>, source: Arc<dyn InstrumentSource>, config: PlayerConfig) -> Self {
        Player {
            engine: Arc::new(Mutex::new(PlaybackEngine::new(clock, source, config.engine))),
            config,
            timer: None,
        }
    }

    /// Lock the engine for direct access (loading, mixer, seeking)
    pub fn engine(&self) -> MutexGuard<'_, PlaybackEngine> {
        self.engine.lock()
    }

    pub fn config(&self) -> PlayerConfig {
        self.config
    }

    /// Start or resume playback and the scheduler timer
    pub fn play(&mut self) -> Result<()> {
        self.engine.lock().play()?;
        self.stop_timer();
        self.start_timer()
    }

    pub fn pause(&mut self) {
        self.engine.lock().pause();
        self.stop_timer();
    }

    pub fn stop(&mut self) {
        self.engine.lock().stop();
        self.stop_timer();
    }

    pub fn state(&self) -> PlaybackState {
        self.engine.lock().state()
    }

    /// Number of scheduler timers still running (0 or 1)
    pub fn active_timers(&self) -> usize {
        match &self.timer {
            Some(timer) if !timer.handle.is_finished() => 1,
            _ => 0,
        }
    }

    /// Stop the timer, silence everything and release the instruments
    pub fn dispose(&mut self) {
        self.stop_timer();
        self.engine.lock().dispose();
    }

    fn start_timer(&mut self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let cancel = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::clone(&cancel);
        let interval = self.config.interval;

        let handle = thread::Builder::new()
            .name("rehearsal-scheduler".to_string())
            .spawn(move || loop {
                if cancelled.load(Ordering::Acquire) {
                    break;
                }
                // Lock held for one pass only
                let transport = engine.lock().tick();
                if transport != TransportState::Playing {
                    log::debug!("Scheduler timer exiting ({:?})", transport);
                    break;
                }
                thread::sleep(interval);
            })
            .map_err(EngineError::Timer)?;

        self.timer = Some(Timer { cancel, handle });
        Ok(())
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.store(true, Ordering::Release);
            if timer.handle.join().is_err() {
                log::warn!("Scheduler timer panicked");
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{midi_file, scale, RecordingSource};
    use crate::{ManualClock, SystemClock};
    use std::time::Instant;

    fn player(clock: &ManualClock, source: &RecordingSource) -> Player {
        let config = PlayerConfig {
            interval: Duration::from_millis(1),
            ..Default::default()
        };
        let player = Player::new(Arc::new(clock.clone()), Arc::new(source.clone()), config);
        {
            let mut engine = player.engine();
            engine
                .load_file(&midi_file(None, &[(None, scale(8, 480, 60))]))
                .unwrap();
            engine.bank().wait();
        }
        player
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.interval, Duration::from_millis(25));
        assert_eq!(config.engine.lookahead, Duration::from_millis(200));
    }

    #[test]
    fn test_timer_runs_while_playing() {
        let clock = ManualClock::new(0.0);
        let source = RecordingSource::with_clock(clock.clone());
        let mut player = player(&clock, &source);

        player.play().unwrap();
        assert_eq!(player.active_timers(), 1);
        // The first pass schedules the downbeat
        wait_for(|| !source.played().is_empty());

        clock.set(1.0);
        wait_for(|| player.state().current_tick >= 959);

        player.pause();
        assert_eq!(player.active_timers(), 0);
        assert!(player.state().is_paused);
    }

    #[test]
    fn test_timer_exits_when_piece_ends() {
        let clock = ManualClock::new(0.0);
        let source = RecordingSource::with_clock(clock.clone());
        let mut player = player(&clock, &source);

        player.play().unwrap();
        wait_for(|| !source.played().is_empty());
        // Last note ends at 3.75 s
        for step in 1..=80 {
            clock.set(step as f64 * 0.05);
            thread::sleep(Duration::from_millis(2));
        }
        wait_for(|| player.active_timers() == 0);

        assert_eq!(player.state().transport(), TransportState::Stopped);
        assert_eq!(player.engine().active_voices(), 0);
    }

    #[test]
    fn test_first_note_plays_on_the_system_clock() {
        let clock = SystemClock::new();
        let source = RecordingSource::new();
        let config = PlayerConfig {
            interval: Duration::from_millis(1),
            ..Default::default()
        };
        let mut player = Player::new(Arc::new(clock), Arc::new(source.clone()), config);
        {
            let mut engine = player.engine();
            engine
                .load_file(&midi_file(None, &[(None, scale(2, 480, 60))]))
                .unwrap();
            engine.bank().wait();
        }

        player.play().unwrap();
        wait_for(|| player.active_timers() == 0);

        let notes: Vec<String> = source.played().into_iter().map(|n| n.note).collect();
        assert_eq!(notes, vec!["C4", "C#4"]);
    }

    #[test]
    fn test_dispose_leaves_nothing_running() {
        let clock = ManualClock::new(0.0);
        let source = RecordingSource::with_clock(clock.clone());
        let mut player = player(&clock, &source);

        player.play().unwrap();
        wait_for(|| !source.played().is_empty());
        player.pause();
        player.play().unwrap();
        player.dispose();

        assert_eq!(player.active_timers(), 0);
        assert_eq!(player.engine().active_voices(), 0);
        assert_eq!(source.live_handles(), 0);
        assert_eq!(player.state().transport(), TransportState::Stopped);
    }

    #[test]
    fn test_play_without_file_starts_no_timer() {
        let clock = ManualClock::new(0.0);
        let mut player = Player::new(
            Arc::new(clock),
            Arc::new(RecordingSource::new()),
            PlayerConfig::default(),
        );
        assert!(matches!(player.play(), Err(EngineError::NoFile)));
        assert_eq!(player.active_timers(), 0);
    }
}
