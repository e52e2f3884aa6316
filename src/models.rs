//! Core data models for the song-book pipeline.
//!
//! This module contains the struct definitions, type aliases, and run
//! statistics shared by scanning, reconciliation, and relocation.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::normalize::title_case;

// ============================================================================
// Type Aliases
// ============================================================================

/// Performer key -> every entry currently attributed to that performer.
/// Ordered so that every key-order-dependent heuristic is deterministic.
pub type SongBook = BTreeMap<String, Vec<SongEntry>>;

/// Entries whose filename matched no pattern. Relocated under `#Badly Named`.
pub type BrokenBucket = Vec<SongEntry>;

/// Track number used when a filename carries none.
pub const DEFAULT_TRACK: &str = "01";

// ============================================================================
// Parsing Models
// ============================================================================

/// Raw fields captured by one cascade pattern, before tag extraction and
/// normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateMatch {
    pub pattern: &'static str,
    pub disc: Option<String>,
    pub track: Option<String>,
    pub performer: String,
    pub title: String,
}

/// One media file on its way through the pipeline.
///
/// `performer` and `title` are `None` only for entries no pattern could parse;
/// those are relocated under their `fallback_stem`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongEntry {
    pub disc: String,
    /// Disc id was derived rather than read from the filename. Only these
    /// entries take part in hash-based collision resolution.
    pub synthetic_disc: bool,
    pub track: String,
    pub performer: Option<String>,
    pub title: Option<String>,
    /// Lower-cased, with the leading dot.
    pub ext: String,
    pub dir: PathBuf,
    /// File name as found on disk (original extension casing).
    pub file_name: String,
    pub stem: String,
    pub fallback_stem: String,
    pub pattern: Option<&'static str>,
}

impl SongEntry {
    pub fn source_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn is_parsed(&self) -> bool {
        self.performer.is_some() && self.title.is_some()
    }

    /// `DISCID-TRACK - Performer - Title`, or the fallback stem when the
    /// entry could not be parsed. Recomputed on every call.
    pub fn canonical_stem(&self) -> String {
        match (&self.performer, &self.title) {
            (Some(performer), Some(title)) => {
                canonical_name(&self.disc, &self.track, performer, title)
            }
            _ => self.fallback_stem.clone(),
        }
    }

    /// Advance to the next track number, keeping the two-digit padding.
    pub fn bump_track(&mut self) {
        let next = self.track.trim().parse::<u32>().unwrap_or(0) + 1;
        self.track = format!("{:02}", next);
    }
}

/// Build a canonical file stem from its parts.
pub fn canonical_name(disc: &str, track: &str, performer: &str, title: &str) -> String {
    format!(
        "{}-{} - {} - {}",
        disc.trim().to_uppercase(),
        track.trim(),
        title_case(performer).trim(),
        title_case(title).trim()
    )
}

/// Zero-pad a captured track number to two digits. Non-numeric captures are
/// kept as they are.
pub fn pad_track(track: Option<&str>) -> String {
    match track.map(str::trim) {
        Some(t) if !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()) && t.len() < 2 => {
            format!("{:0>2}", t)
        }
        Some(t) if !t.is_empty() => t.to_string(),
        _ => DEFAULT_TRACK.to_string(),
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Counts from walking the source tree.
#[derive(Default, Debug, Clone, Serialize)]
pub struct ScanStats {
    pub media_files: usize,
    pub template_files: usize,
    pub ignored_files: usize,
    pub unreadable_paths: usize,
    pub parsed: usize,
    pub unparseable: usize,
}

/// What each reconciliation fixup changed.
#[derive(Default, Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub performers_in: usize,
    pub empty_dropped: usize,
    pub the_variants_merged: usize,
    pub flipped: usize,
    pub fuzzy_merged: usize,
    pub performers_out: usize,
    pub entries_out: usize,
}

/// Per-outcome counters for the relocation stage.
#[derive(Default, Debug, Clone, Serialize)]
pub struct RelocateStats {
    pub copied: usize,
    pub moved: usize,
    pub repacked: usize,
    pub broken_archives: usize,
    pub skipped_same_path: usize,
    pub skipped_existing: usize,
    pub duplicates: usize,
    pub conflicts: usize,
    pub failures: usize,
    pub dirs_removed: usize,
}

/// Everything one batch run did, serialized for `--stats`.
#[derive(Default, Debug, Clone, Serialize)]
pub struct RunStats {
    pub scan: ScanStats,
    pub reconcile: ReconcileReport,
    pub relocate: RelocateStats,
    pub catalog_performers: usize,
    pub catalog_titles: usize,
    pub elapsed_seconds: f64,
}

impl RunStats {
    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            log::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> SongEntry {
        SongEntry {
            disc: "sc8101".to_string(),
            synthetic_disc: false,
            track: "01".to_string(),
            performer: Some("frank sinatra".to_string()),
            title: Some("my way".to_string()),
            ext: ".zip".to_string(),
            dir: PathBuf::from("/music"),
            file_name: "SC8101-01 - Sinatra, Frank - My Way.ZIP".to_string(),
            stem: "SC8101-01 - Sinatra, Frank - My Way".to_string(),
            fallback_stem: "SC8101-01 - Sinatra, Frank - My Way".to_string(),
            pattern: Some("D_N_P_T"),
        }
    }

    #[test]
    fn test_canonical_stem() {
        assert_eq!(entry().canonical_stem(), "SC8101-01 - Frank Sinatra - My Way");
    }

    #[test]
    fn test_canonical_stem_falls_back_when_unparsed() {
        let mut e = entry();
        e.performer = None;
        e.fallback_stem = "garbled name".to_string();
        assert_eq!(e.canonical_stem(), "garbled name");
    }

    #[test]
    fn test_source_path_keeps_original_extension_case() {
        assert_eq!(
            entry().source_path(),
            PathBuf::from("/music/SC8101-01 - Sinatra, Frank - My Way.ZIP")
        );
    }

    #[test]
    fn test_bump_track() {
        let mut e = entry();
        e.bump_track();
        assert_eq!(e.track, "02");
        e.track = "09".to_string();
        e.bump_track();
        assert_eq!(e.track, "10");
    }

    #[test]
    fn test_pad_track() {
        assert_eq!(pad_track(Some("1")), "01");
        assert_eq!(pad_track(Some("12")), "12");
        assert_eq!(pad_track(Some("123")), "123");
        assert_eq!(pad_track(None), "01");
        assert_eq!(pad_track(Some(" ")), "01");
    }
}
