//! Walk a source tree and parse every media file into the song book.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::catalog::SONG_BOOK_DIR;
use crate::models::{pad_track, BrokenBucket, ScanStats, SongBook, SongEntry, DEFAULT_TRACK};
use crate::normalize::{apply_tags, clean_words, normalize_performer, normalize_title};
use crate::patterns::{match_stem, synthetic_disc_id};
use crate::progress::{create_progress_bar, create_spinner, log_progress};
use crate::relocate::SCRATCH_DIR;

/// Extensions (lower-case, with the dot) of the files that take part in a run.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    ".wmv", ".wav", ".mp3", ".cdg", ".zip", ".rar", ".mp4", ".avi", ".mpg", ".bin", ".scn",
];

/// Per-folder player configuration. Counted, never moved.
pub const TEMPLATE_CONFIG: &str = "template.ini";

/// Directories this tool writes into that must never be re-scanned.
pub const RESERVED_DIRS: &[&str] = &[SCRATCH_DIR, SONG_BOOK_DIR];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Media,
    Template,
    Other,
}

/// Lower-cased extension including the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn classify(path: &Path) -> FileKind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name == TEMPLATE_CONFIG {
        return FileKind::Template;
    }
    if MEDIA_EXTENSIONS.contains(&extension_of(path).as_str()) {
        FileKind::Media
    } else {
        FileKind::Other
    }
}

/// Parse one media file. Files no pattern accepts come back with no
/// performer or title and are filed in the broken bucket by the caller.
pub fn parse_file(path: &Path) -> SongEntry {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned = clean_words(&stem);

    let mut entry = SongEntry {
        disc: String::new(),
        synthetic_disc: false,
        track: DEFAULT_TRACK.to_string(),
        performer: None,
        title: None,
        ext: extension_of(path),
        dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        file_name,
        stem,
        fallback_stem: cleaned.clone(),
        pattern: None,
    };

    let Some(candidate) = match_stem(&cleaned) else {
        return entry;
    };
    let (raw_performer, raw_title) = apply_tags(&candidate.performer, &candidate.title);
    let performer = normalize_performer(&raw_performer);
    let title = normalize_title(&raw_title);
    // A field made only of a tag marker normalizes to nothing
    if performer.is_empty() || title.is_empty() {
        return entry;
    }

    match candidate.disc {
        Some(disc) => entry.disc = disc.trim().to_uppercase(),
        None => {
            entry.disc = synthetic_disc_id(&candidate.performer, &candidate.title);
            entry.synthetic_disc = true;
        }
    }
    entry.track = pad_track(candidate.track.as_deref());
    entry.performer = Some(performer);
    entry.title = Some(title);
    entry.pattern = Some(candidate.pattern);
    entry
}

/// Everything read from one source tree.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub book: SongBook,
    pub broken: BrokenBucket,
    pub stats: ScanStats,
}

fn is_reserved(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && RESERVED_DIRS
            .iter()
            .any(|reserved| entry.file_name().to_string_lossy() == *reserved)
}

/// Collect media paths in sorted walk order.
fn collect_media(root: &Path, stats: &mut ScanStats) -> Result<Vec<PathBuf>> {
    let spinner = create_spinner("Scanning");
    let mut media = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_reserved(e));
    for item in walker {
        let item = match item {
            Ok(item) => item,
            Err(err) if err.depth() == 0 => {
                return Err(err).with_context(|| format!("Failed to read {}", root.display()));
            }
            Err(err) => {
                log::warn!("skipping unreadable path: {}", err);
                stats.unreadable_paths += 1;
                continue;
            }
        };
        if !item.file_type().is_file() {
            continue;
        }
        match classify(item.path()) {
            FileKind::Media => {
                media.push(item.into_path());
                spinner.inc(1);
            }
            FileKind::Template => stats.template_files += 1,
            FileKind::Other => {
                log::debug!("ignoring {}", item.path().display());
                stats.ignored_files += 1;
            }
        }
    }

    stats.media_files = media.len();
    spinner.finish_with_message(format!("Scanned {} media files", media.len()));
    Ok(media)
}

/// Walk `root`, parse every media file and file it by performer.
pub fn read_song_book(root: &Path) -> Result<ScanResult> {
    let mut result = ScanResult::default();
    let paths = collect_media(root, &mut result.stats)?;

    let total = paths.len() as u64;
    let pb = create_progress_bar(total, "Parsing");
    let entries: Vec<SongEntry> = paths
        .par_iter()
        .map(|path| {
            let entry = parse_file(path);
            pb.inc(1);
            log_progress("parse", pb.position(), total, 1000);
            entry
        })
        .collect();
    pb.finish_with_message(format!("Parsed {} files", entries.len()));

    for entry in entries {
        match entry.performer.clone() {
            Some(performer) if entry.is_parsed() => {
                log::info!("parsed {}", entry.canonical_stem());
                result.stats.parsed += 1;
                result.book.entry(performer).or_default().push(entry);
            }
            _ => {
                log::warn!("could not parse {}", entry.fallback_stem);
                result.stats.unparseable += 1;
                result.broken.push(entry);
            }
        }
    }
    Ok(result)
}
