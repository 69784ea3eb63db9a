//! Print a summary of Standard Midi Files.
//!
//! Usage: `smfinfo <file or directory> [collector filter]`
//!
//! Set `RUST_LOG=debug` to see what the decoder tolerated along the way.

use smfcodec::{decode, Decoded, EventType, Timing};
use std::{
    collections::BTreeMap,
    env,
    error::Error,
    fs,
    path::{Path, PathBuf},
    process,
    time::Instant,
};

const MIDI_EXT: &[&str] = &["mid", "midi", "smf"];

const INFO_COLLECTORS: &[(&str, fn(&Decoded) -> Result<(), Box<dyn Error>>)] = &[
    ("header", header),
    ("events", events),
    ("tempo", tempo),
    ("notes", notes),
];

fn header(smf: &Decoded) -> Result<(), Box<dyn Error>> {
    let timing = match smf.header.timing {
        Timing::Metrical(tpqn) => format!("{} ticks per quarter note", tpqn),
        Timing::Timecode(fps, subframes) => {
            format!("{} fps, {} subframes (smpte)", fps.as_int(), subframes)
        }
    };
    println!(
        "format {}, {} tracks, {}",
        smf.header.format.as_int(),
        smf.header.track_count,
        timing
    );
    Ok(())
}

fn events(smf: &Decoded) -> Result<(), Box<dyn Error>> {
    let mut counts = BTreeMap::new();
    for ev in &smf.events {
        *counts.entry(format!("{:?}", ev.event_type())).or_insert(0usize) += 1;
    }
    let open = smf.events.iter().filter(|ev| ev.is_open_note()).count();
    print!("{} events", smf.events.len());
    for (kind, count) in &counts {
        print!(", {} {}", count, kind);
    }
    println!();
    if open > 0 {
        println!("        {} notes never released", open);
    }
    Ok(())
}

fn tempo(smf: &Decoded) -> Result<(), Box<dyn Error>> {
    println!(
        "{} bpm, {} tempo changes",
        smf.tempo(),
        smf.tempos.len()
    );
    for change in smf.tempos.iter().skip(1) {
        println!("        tick {}: {} bpm", change.tick, change.bpm());
    }
    Ok(())
}

fn notes(smf: &Decoded) -> Result<(), Box<dyn Error>> {
    let map = smf.tempo_map()?;
    let (count, end) = smf.notes().fold((0, 0), |(count, end), note| {
        (count + 1, end.max(note.tick + note.duration))
    });
    let channels = smf
        .events
        .iter()
        .filter(|ev| ev.event_type() == EventType::NoteOn)
        .filter_map(|ev| ev.channel())
        .map(|ch| ch.as_int())
        .collect::<std::collections::BTreeSet<_>>();
    println!(
        "{} notes over {:.3}s on channels {:?}",
        count,
        map.seconds_at(end),
        channels
    );
    Ok(())
}

fn list_midis(path: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut midis = Vec::new();
    for entry in fs::read_dir(path)? {
        let path = entry?.path();
        if MIDI_EXT
            .iter()
            .any(|ext| path.extension() == Some(ext.as_ref()))
        {
            midis.push(path);
        }
    }
    midis.sort();
    Ok(midis)
}

fn run(path: &Path, info_filter: &str) -> Result<(), Box<dyn Error>> {
    let collectors = INFO_COLLECTORS
        .iter()
        .filter(|(name, _)| name.contains(info_filter))
        .collect::<Vec<_>>();
    if collectors.is_empty() {
        let names = INFO_COLLECTORS
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        return Err(format!(
            "no info collectors match the pattern \"{}\" (available: {})",
            info_filter,
            names.join(", ")
        )
        .into());
    }

    for midi in list_midis(path)? {
        println!("{}", midi.display());
        let data = match fs::read(&midi) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("  failed to read file ({})", err);
                continue;
            }
        };
        let start = Instant::now();
        let smf = match decode(&data) {
            Ok(smf) => smf,
            Err(err) => {
                eprintln!("  failed to decode file ({})", err);
                continue;
            }
        };
        log::debug!("decoded {} bytes in {:?}", data.len(), start.elapsed());
        for &(name, collect) in collectors.iter() {
            print!("  {}: ", name);
            if let Err(err) = collect(&smf) {
                println!("collector error ({})", err);
            }
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let path = match env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("usage: smfinfo <file or directory> [collector filter]");
            process::exit(2);
        }
    };
    let info_filter = env::args().nth(2).unwrap_or_default().to_lowercase();
    if let Err(err) = run(&path, &info_filter) {
        eprintln!("error: {}", err);
        process::exit(1);
    }
}
