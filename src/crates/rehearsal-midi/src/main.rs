use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use rehearsal_core::{format_clock, format_tick, TempoMap, TempoPolicy, TickClock};
use rehearsal_midi::LoadedMidi;

#[derive(Parser, Debug)]
#[command(name = "midi-info")]
#[command(about = "Show the tracks, tempo map and notes of a MIDI file", long_about = None)]
struct Args {
    /// Path to the MIDI file (default: uses first .mid file in current directory)
    midi: Option<PathBuf>,

    /// Print the file summary as JSON
    #[arg(long)]
    json: bool,

    /// Also list every note
    #[arg(short, long)]
    notes: bool,

    /// Suppress informational messages (only errors)
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if args.quiet {
        "warn"
    } else {
        "info"
    }))
    .init();

    let midi_path = match args.midi {
        Some(path) => path,
        None => find_first_midi_file()?,
    };

    let loaded = LoadedMidi::from_file(&midi_path)
        .with_context(|| format!("Failed to load {}", midi_path.display()))?;
    let info = &loaded.info;

    if args.json {
        println!("{}", serde_json::to_string_pretty(info)?);
        return Ok(());
    }

    let map = TempoMap::from_file(info, TempoPolicy::TempoMap);
    let clock = TickClock::new(&map, 1.0);

    println!("{}", midi_path.display());
    println!(
        "  ppq {}, {} ticks, {} at {:.1} BPM",
        info.ticks_per_quarter_note,
        info.duration_ticks,
        format_clock(clock.seconds(info.duration_ticks)),
        info.initial_bpm()
    );
    if info.has_tempo_changes() {
        println!("  {} tempo changes", info.tempo_changes.len());
    }
    if let Some(ts) = info.time_signatures.first() {
        println!("  time signature {}/{}", ts.numerator, ts.denominator);
    }

    for track in &info.tracks {
        println!(
            "  [{}] {:<24} {:>5} notes  channel {:<4} program {}",
            track.index + 1,
            track.name,
            track.note_count,
            track.channel.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
            track.instrument()
        );
    }

    if args.notes {
        for event in &loaded.events {
            println!(
                "  {:<18} {:>8.3}s  track {}  {:<4} vel {:.2}",
                format_tick(event.tick, u32::from(info.ticks_per_quarter_note)),
                event.start_time_seconds,
                event.track_index + 1,
                rehearsal_core::note_name(event.midi_note),
                event.velocity
            );
        }
    }

    Ok(())
}

fn find_first_midi_file() -> Result<PathBuf> {
    let entries = fs::read_dir(".").context("Failed to read current directory")?;

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("mid") {
            return Ok(path);
        }
    }

    anyhow::bail!("No MIDI files found in current directory")
}
