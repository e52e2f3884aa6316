//! One batch run: scan, reconcile, relocate, write the catalog.
//!
//! The stages run to completion one after another. Reconciliation needs to
//! see every performer before anything is moved, and relocation needs the
//! final performer keys to pick directories.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::catalog::{build_catalog, write_catalog};
use crate::models::RunStats;
use crate::progress::{create_progress_bar, format_duration, log_progress};
use crate::reconcile::{reconcile, ReconcileOptions};
use crate::relocate::Relocator;
use crate::safety::validate_roots;
use crate::scan::{read_song_book, ScanResult};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Move instead of copy, and remove originals after a repack.
    pub delete: bool,
    pub reconcile: ReconcileOptions,
    /// Write `#Song Book/songbook.json` and `songbook.tex`.
    pub write_catalog: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            delete: false,
            reconcile: ReconcileOptions::default(),
            write_catalog: true,
        }
    }
}

/// Reorganize `source` into `dest`. Only root-level failures are returned
/// as errors; per-file problems are logged and counted in the stats.
pub fn run(source: &Path, dest: &Path, options: &RunOptions) -> Result<RunStats> {
    let start = Instant::now();
    validate_roots(source, dest)?;
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create destination {}", dest.display()))?;
    let source = source
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", source.display()))?;
    let dest = dest
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", dest.display()))?;
    log::info!("reading {}", source.display());

    let mut stats = RunStats::default();
    let ScanResult {
        mut book,
        mut broken,
        stats: scan,
    } = read_song_book(&source)?;
    stats.scan = scan;
    stats.reconcile = reconcile(&mut book, &options.reconcile);
    stats.log_phase("reconcile");

    let mut relocator = Relocator::new(&dest, options.delete)?;
    let total = (stats.reconcile.entries_out + broken.len()) as u64;
    let pb = create_progress_bar(total, "Relocating");
    let entries = book
        .values_mut()
        .flat_map(|entries| entries.iter_mut())
        .chain(broken.iter_mut());
    for entry in entries {
        relocator.relocate(entry);
        pb.inc(1);
        log_progress("relocate", pb.position(), total, 500);
    }
    pb.finish_with_message(format!("Relocated {} files", total));
    stats.relocate = relocator.finish(&source);

    if options.write_catalog {
        let catalog = build_catalog(&book);
        stats.catalog_performers = catalog.len();
        stats.catalog_titles = catalog.values().map(Vec::len).sum();
        if let Err(err) = write_catalog(&dest, &catalog) {
            log::error!("could not write song book: {:#}", err);
        }
    }

    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    stats.log_phase("done");
    log::info!("finished in {}", format_duration(start.elapsed()));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, JSON_FILE, SONG_BOOK_DIR};
    use crate::relocate::{BADLY_NAMED_DIR, SCRATCH_DIR};
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn make_zip(path: &Path, members: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn collection(root: &Path) {
        let disc = root.join("disc one");
        let loose = root.join("loose");
        fs::create_dir_all(&disc).unwrap();
        fs::create_dir_all(&loose).unwrap();
        make_zip(
            &disc.join("SC8101-01 - Sinatra, Frank - My Way.zip"),
            &[("SC8101-01.cdg", "g1"), ("SC8101-01.mp3", "a1")],
        );
        fs::write(disc.join("SC8101-02 - Sinatra, Frank - New York.mp3"), "ny").unwrap();
        fs::write(disc.join("template.ini"), "").unwrap();
        make_zip(
            &loose.join("sinatra_frank-MyWay(live).zip"),
            &[("live.cdg", "g2"), ("live.mp3", "a2")],
        );
        fs::write(loose.join("sinatra_frank-New York.mp3"), "ny2").unwrap();
        fs::write(loose.join("02-Your Song.cdg"), "ys").unwrap();
        fs::write(loose.join("notes.txt"), "").unwrap();
    }

    fn sinatra(dest: &Path) -> PathBuf {
        dest.join("F").join("Frank Sinatra")
    }

    #[test]
    fn test_end_to_end_merge() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in");
        let dest = dir.path().join("out");
        collection(&source);

        let options = RunOptions {
            reconcile: ReconcileOptions {
                flip: false,
                merge: true,
            },
            ..Default::default()
        };
        let stats = run(&source, &dest, &options).unwrap();

        assert_eq!(stats.scan.media_files, 5);
        assert_eq!(stats.scan.template_files, 1);
        assert_eq!(stats.scan.ignored_files, 1);
        assert_eq!(stats.scan.parsed, 4);
        assert_eq!(stats.scan.unparseable, 1);
        assert_eq!(stats.reconcile.fuzzy_merged, 1);
        assert_eq!(stats.relocate.repacked, 2);
        assert_eq!(stats.relocate.copied, 3);
        assert_eq!(stats.relocate.failures, 0);

        let performer_dir = sinatra(&dest);
        for name in [
            "SC8101-01 - Frank Sinatra - My Way.zip",
            "SC8101-02 - Frank Sinatra - New York.mp3",
            "XXSM0-01 - Frank Sinatra - Myway(live).zip",
            "XXSN0-01 - Frank Sinatra - New York.mp3",
        ] {
            assert!(performer_dir.join(name).is_file(), "missing {}", name);
        }
        assert!(dest.join(BADLY_NAMED_DIR).join("02-Your Song.cdg").is_file());
        assert!(!dest.join(SCRATCH_DIR).exists());
        assert!(!dest.join("S").exists());

        let json = fs::read_to_string(dest.join(SONG_BOOK_DIR).join(JSON_FILE)).unwrap();
        let catalog: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(catalog.len(), 1);
        let titles = &catalog["Frank Sinatra"];
        assert_eq!(titles.iter().filter(|t| *t == "New York").count(), 1);

        // Copy mode leaves the source alone
        assert!(source.join("loose").join("02-Your Song.cdg").is_file());
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in");
        let dest = dir.path().join("out");
        collection(&source);
        let options = RunOptions {
            write_catalog: false,
            ..Default::default()
        };

        run(&source, &dest, &options).unwrap();
        let again = run(&dest, &dest, &options).unwrap();
        assert_eq!(again.relocate.skipped_same_path, 5);
        assert_eq!(again.relocate.copied, 0);
        assert_eq!(again.relocate.repacked, 0);
        assert!(!dest.join(SONG_BOOK_DIR).exists());
    }

    #[test]
    fn test_delete_mode_empties_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in");
        let dest = dir.path().join("out");
        collection(&source);
        let options = RunOptions {
            delete: true,
            ..Default::default()
        };

        let stats = run(&source, &dest, &options).unwrap();
        assert_eq!(stats.relocate.moved, 3);
        assert_eq!(stats.relocate.repacked, 2);
        assert!(!source.join("disc one").join("SC8101-02 - Sinatra, Frank - New York.mp3").exists());
        assert!(!source.join("loose").join("sinatra_frank-MyWay(live).zip").exists());
        // Ignored files keep their directory alive
        assert!(source.join("loose").join("notes.txt").exists());
        assert!(sinatra(&dest)
            .join("SC8101-02 - Frank Sinatra - New York.mp3")
            .is_file());
    }

    #[test]
    fn test_bad_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = run(
            &dir.path().join("missing"),
            &dir.path().join("out"),
            &RunOptions::default(),
        );
        assert!(result.is_err());
        assert!(!dir.path().join("out").exists());
    }
}
