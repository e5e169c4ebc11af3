//! rekorddb: inspect Pioneer DJ export media
//!
//! Thin CLI over rekorddb-core: dump database headers, tracks and playlist
//! trees, decode analysis files, or scan a mounted device for everything
//! that opens cleanly.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use walkdir::WalkDir;

use rekorddb_core::anlz::SectionContent;
use rekorddb_core::{AnlzOptions, Collection, DbFile};

#[derive(Parser)]
#[command(name = "rekorddb")]
#[command(about = "Inspect Pioneer DJ USB/SD exports")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the database header and per-table row counts
    Info {
        /// Path to an export.pdb file
        path: PathBuf,
    },

    /// List the tracks in a collection
    Tracks {
        /// Path to an export.pdb file
        path: PathBuf,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the playlist tree
    Playlists {
        /// Path to an export.pdb file
        path: PathBuf,
    },

    /// Decode an ANLZ analysis file section by section
    Anlz {
        /// Path to an ANLZnnnn.DAT / .EXT / .2EX file
        path: PathBuf,

        /// Skip song-structure unmasking (shared-library files)
        #[arg(long)]
        unmasked: bool,
    },

    /// Walk a device root and report every export file that opens
    Scan {
        /// Mount point of the exported media
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Info { path } => info(&path),
        Command::Tracks { path, json } => tracks(&path, json),
        Command::Playlists { path } => playlists(&path),
        Command::Anlz { path, unmasked } => anlz(&path, unmasked),
        Command::Scan { path } => scan(&path),
    }
}

fn info(path: &Path) -> anyhow::Result<()> {
    let source = rekorddb_core::ByteSource::map_file(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let db = DbFile::open(source)?;

    println!("{}", path.display());
    println!("  page size:   {}", db.page_size());
    println!("  tables:      {}", db.num_tables());
    println!("  pages used:  {}", db.next_unused_page());
    println!();
    println!("{:<20} {:>6} {:>6} {:>8}", "table", "first", "last", "rows");
    println!("{}", "-".repeat(44));

    for table in db.tables() {
        let mut rows = 0usize;
        for page in db.iter_pages(table) {
            let page = page?;
            if page.is_data_page() {
                rows += db.iter_rows(&page)?.len();
            }
        }
        let name = table
            .kind
            .map(|k| k.name().to_string())
            .unwrap_or_else(|| format!("type {}", table.raw_kind));
        println!(
            "{:<20} {:>6} {:>6} {:>8}",
            name, table.first_page, table.last_page, rows
        );
    }
    Ok(())
}

fn tracks(path: &Path, json: bool) -> anyhow::Result<()> {
    let collection =
        Collection::open(path).with_context(|| format!("opening {}", path.display()))?;

    let mut tracks: Vec<_> = collection.tracks().values().collect();
    tracks.sort_by_key(|t| t.id);

    if json {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
        return Ok(());
    }

    println!(
        "{:<5} {:<30} {:<22} {:<22} {:>7} {:>6}",
        "ID", "Title", "Artist", "Album", "BPM", "Time"
    );
    println!("{}", "-".repeat(98));
    for track in tracks {
        let artist = collection
            .artist(track.artist_id)
            .map(|a| a.name.as_str())
            .unwrap_or("-");
        let album = collection
            .album(track.album_id)
            .map(|a| a.name.as_str())
            .unwrap_or("-");
        println!(
            "{:<5} {:<30} {:<22} {:<22} {:>7.2} {:>3}:{:02}",
            track.id,
            truncate(&track.title, 29),
            truncate(artist, 21),
            truncate(album, 21),
            track.tempo_bpm(),
            track.duration / 60,
            track.duration % 60,
        );
    }

    if !collection.dangling_refs().is_empty() {
        println!();
        println!(
            "{} dangling foreign keys (run with -v for details)",
            collection.dangling_refs().len()
        );
    }
    Ok(())
}

fn playlists(path: &Path) -> anyhow::Result<()> {
    let collection =
        Collection::open(path).with_context(|| format!("opening {}", path.display()))?;
    print_folder(&collection, 0, 0);
    Ok(())
}

fn print_folder(collection: &Collection, folder_id: u64, depth: usize) {
    let Some(entries) = collection.playlist_folders().get(&folder_id) else {
        return;
    };
    for entry in entries {
        let indent = "  ".repeat(depth);
        if entry.is_folder {
            println!("{}{}/", indent, entry.name);
            print_folder(collection, entry.id, depth + 1);
        } else {
            let count = collection
                .playlists()
                .get(&entry.id)
                .map(Vec::len)
                .unwrap_or(0);
            println!("{}{} ({} tracks)", indent, entry.name, count);
        }
    }
}

fn anlz(path: &Path, unmasked: bool) -> anyhow::Result<()> {
    let file = rekorddb_core::open_analysis_with(
        path,
        AnlzOptions {
            unmasked_phrases: unmasked,
        },
    )
    .with_context(|| format!("opening {}", path.display()))?;

    println!("{} ({} bytes)", path.display(), file.len_file());
    for section in file.sections() {
        let section = section?;
        print!("  {} ({} bytes): ", section.fourcc_str(), section.len_tag);
        match &section.content {
            SectionContent::BeatGrid(grid) => println!("{} beats", grid.beats.len()),
            SectionContent::CueList(list) => {
                println!("{:?}, {} cues", list.list_type, list.cues.len())
            }
            SectionContent::ExtendedCueList(list) => {
                println!("{:?}, {} cues", list.list_type, list.cues.len())
            }
            SectionContent::Path(tag) => println!("{}", tag.path),
            SectionContent::VbrIndex(index) => println!("{} index bytes", index.data.len()),
            SectionContent::WavePreview(wave) | SectionContent::TinyWavePreview(wave) => {
                println!("{} columns", wave.columns.len())
            }
            SectionContent::WaveDetail(wave) => println!("{} columns", wave.columns.len()),
            SectionContent::WaveColorPreview(wave) => println!("{} columns", wave.columns.len()),
            SectionContent::WaveColorDetail(wave) => println!("{} columns", wave.columns.len()),
            SectionContent::WaveThreeBandPreview(wave)
            | SectionContent::WaveThreeBandDetail(wave) => {
                println!("{} columns", wave.columns.len())
            }
            SectionContent::SongStructure(structure) => {
                println!(
                    "{:?} mood, {} phrases",
                    structure.mood,
                    structure.phrases.len()
                );
                for phrase in &structure.phrases {
                    println!(
                        "      beat {:>4}: {}",
                        phrase.start_beat,
                        phrase.label.unwrap_or("?")
                    );
                }
            }
            SectionContent::Unknown => println!("unknown tag, skipped"),
        }
    }
    Ok(())
}

fn scan(root: &Path) -> anyhow::Result<()> {
    let mut found = 0usize;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_uppercase());
        match ext.as_deref() {
            Some("PDB") => {
                found += 1;
                match Collection::open(path) {
                    Ok(c) => println!("{}: {} tracks", path.display(), c.tracks().len()),
                    Err(e) => println!("{}: unreadable ({e})", path.display()),
                }
            }
            Some("DAT") | Some("EXT") | Some("2EX") => {
                let Ok(file) = rekorddb_core::open_analysis(path) else {
                    // .DAT files on a device are not all analysis files.
                    continue;
                };
                found += 1;
                let sections = file.sections().filter_map(|s| s.ok()).count();
                println!("{}: {} sections", path.display(), sections);
            }
            _ => {}
        }
    }
    println!("{found} export files found under {}", root.display());
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len - 1).collect();
        format!("{cut}…")
    }
}
