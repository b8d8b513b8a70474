mod console;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use console::ConsoleSource;
use rehearsal_audio::{
    EngineConfig, MixerUpdate, PlaybackEngine, Player, PlayerConfig, RehearsalMarkerMap, SystemClock, TempoPolicy,
    TransportState, DEFAULT_LOOKAHEAD,
};
use rehearsal_core::{format_clock, format_tick, MarkerKind, TempoMap, TickClock};
use rehearsal_midi::LoadedMidi;

#[derive(Parser, Debug)]
#[command(name = "rehearsal")]
#[command(about = "Rehearsal playback for choir MIDI files", long_about = None)]
struct Args {
    /// Suppress informational messages (only warnings and errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show tracks, mixer defaults and instruments of a MIDI file
    Info {
        file: PathBuf,

        /// Print the file summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a rehearsal marker map
    Markers {
        /// Marker map JSON from the editor
        file: PathBuf,

        /// MIDI file the markers belong to
        #[arg(long)]
        midi: Option<PathBuf>,

        /// Replace the measures with ones derived from the MIDI time signature
        #[arg(long, requires = "midi")]
        generate: bool,
    },

    /// Play a MIDI file, logging every note
    Play(PlayArgs),
}

#[derive(clap::Args, Debug)]
struct PlayArgs {
    file: PathBuf,

    /// Tempo factor (0.1 to 4.0)
    #[arg(long, default_value = "1.0")]
    tempo: f64,

    /// Transposition in semitones (-24 to 24)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    transpose: i32,

    /// Rehearsal marker map for measure, page and voice names
    #[arg(long)]
    markers: Option<PathBuf>,

    /// Start at a measure label
    #[arg(long, requires = "markers", conflicts_with_all = ["page", "tick"])]
    measure: Option<String>,

    /// Start at a page label
    #[arg(long, requires = "markers", conflicts_with = "tick")]
    page: Option<String>,

    /// Start at a tick
    #[arg(long)]
    tick: Option<u64>,

    /// Mute a voice (or a 1-based track number)
    #[arg(long)]
    mute: Vec<String>,

    /// Solo a voice (or a 1-based track number)
    #[arg(long)]
    solo: Vec<String>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,

    /// Scheduling lookahead in milliseconds
    #[arg(long, default_value_t = DEFAULT_LOOKAHEAD.as_millis() as u64)]
    lookahead_ms: u64,

    /// Scheduler interval in milliseconds
    #[arg(long, default_value = "25")]
    interval_ms: u64,

    /// Honor every tempo change instead of only the first
    #[arg(long)]
    tempo_map: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match args.command {
        Command::Info { file, json } => info(&file, json),
        Command::Markers {
            file,
            midi,
            generate,
        } => markers(&file, midi.as_deref(), generate),
        Command::Play(play_args) => play(play_args),
    }
}

fn info(path: &Path, json: bool) -> Result<()> {
    let mut engine = PlaybackEngine::new(
        Arc::new(SystemClock::new()),
        Arc::new(ConsoleSource),
        EngineConfig::default(),
    );
    let info = engine
        .load_path(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let map = TempoMap::from_file(&info, TempoPolicy::FirstTempo);
    let clock = TickClock::new(&map, 1.0);

    println!("{}", path.display());
    println!(
        "  ppq {}, {} at {:.1} BPM, {} notes",
        info.ticks_per_quarter_note,
        format_clock(clock.seconds(info.duration_ticks)),
        info.initial_bpm(),
        engine.events().len()
    );
    println!("  instruments {:?}", info.instrument_ids());

    for (track, strip) in info.tracks.iter().zip(engine.mixer().states()) {
        println!(
            "  [{}] {:<24} {:>5} notes  volume {:.2}",
            track.index + 1,
            track.name,
            track.note_count,
            strip.volume
        );
    }
    Ok(())
}

fn read_markers(path: &Path) -> Result<RehearsalMarkerMap> {
    let json = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    RehearsalMarkerMap::from_json(&json).with_context(|| format!("Invalid marker map {}", path.display()))
}

fn markers(path: &Path, midi: Option<&Path>, generate: bool) -> Result<()> {
    let mut map = read_markers(path)?;

    if let Some(midi_path) = midi {
        let loaded =
            LoadedMidi::from_file(midi_path).with_context(|| format!("Failed to load {}", midi_path.display()))?;
        let info = &loaded.info;

        if generate {
            match map.generate_measures(info) {
                Some(count) => log::info!("Generated {} measures", count),
                None => log::warn!("{} has no time signature, measures left as they were", midi_path.display()),
            }
        }

        if map.ppq != info.ticks_per_quarter_note as u32 {
            log::warn!("Marker ppq {} differs from the file's {}", map.ppq, info.ticks_per_quarter_note);
        }
        for (voice, track) in &map.voicing {
            if *track > info.tracks.len() {
                log::warn!(
                    "Voice '{}' points at track {}, the file has {}",
                    voice,
                    track,
                    info.tracks.len()
                );
            }
        }
    }

    for warning in map.monotonic_warnings() {
        log::warn!("{}", warning);
    }
    for kind in [MarkerKind::Measure, MarkerKind::Page] {
        let labels = map.sorted_labels(kind);
        if let (Some(first), Some(last)) = (labels.first(), labels.last()) {
            log::info!(
                "{} {} labels, {} .. {}",
                labels.len(),
                kind,
                format_tick(first.1, map.ppq),
                format_tick(last.1, map.ppq)
            );
        }
    }

    println!("{}", map.to_json_pretty()?);
    Ok(())
}

/// Resolve a voice name, or fall back to a 1-based track number
fn resolve_track(markers: Option<&RehearsalMarkerMap>, name: &str) -> Result<usize> {
    if let Some(track) = markers.and_then(|m| m.voice_track(name)) {
        return Ok(track);
    }
    match name.parse::<usize>() {
        Ok(number) if number >= 1 => Ok(number - 1),
        _ => bail!("Unknown voice '{}'", name),
    }
}

fn play(args: PlayArgs) -> Result<()> {
    let markers = args.markers.as_deref().map(read_markers).transpose()?;

    let config = PlayerConfig {
        interval: Duration::from_millis(args.interval_ms.max(1)),
        engine: EngineConfig {
            lookahead: Duration::from_millis(args.lookahead_ms),
            tempo_policy: if args.tempo_map {
                TempoPolicy::TempoMap
            } else {
                TempoPolicy::FirstTempo
            },
        },
    };
    let mut player = Player::new(Arc::new(SystemClock::new()), Arc::new(ConsoleSource), config);

    {
        let mut engine = player.engine();
        engine
            .load_path(&args.file)
            .with_context(|| format!("Failed to load {}", args.file.display()))?;
        engine.bank().wait();

        engine.set_tempo_factor(args.tempo);
        engine.set_transpose(args.transpose);

        for name in &args.mute {
            let track = resolve_track(markers.as_ref(), name)?;
            engine.set_track_mixer(track, &MixerUpdate::muted(true))?;
        }
        for name in &args.solo {
            let track = resolve_track(markers.as_ref(), name)?;
            engine.set_track_mixer(track, &MixerUpdate::solo(true))?;
        }

        if let Some(map) = &markers {
            if let Some(label) = &args.measure {
                engine.jump_to_measure(map, label)?;
            } else if let Some(label) = &args.page {
                engine.jump_to_page(map, label)?;
            }
        }
        if let Some(tick) = args.tick {
            engine.seek(tick)?;
        }
    }

    let start = Instant::now();
    player.play()?;

    let mut last_report = 0;
    loop {
        thread::sleep(Duration::from_millis(100));
        let state = player.state();
        if state.transport() != TransportState::Playing {
            break;
        }

        let elapsed = start.elapsed().as_secs_f64();
        if elapsed as u64 > last_report {
            last_report = elapsed as u64;
            log::info!(
                "{}  tick {}",
                format_clock(state.current_time_seconds),
                state.current_tick
            );
        }
        if args.seconds.is_some_and(|limit| elapsed >= limit) {
            log::info!("Time limit reached");
            break;
        }
    }

    player.dispose();
    Ok(())
}
