//! Move every entry into the canonical layout under the destination root.
//!
//! ```text
//! <root>/<Initial>/<Performer>/<DISC-TRACK> - <Performer> - <Title>.<ext>
//! <root>/#Badly Named/<cleaned stem>.<ext>
//! <root>/#Broken Archive/<original file name>
//! ```
//!
//! Nothing is ever overwritten. Entries whose disc id was synthesized try
//! successive track numbers and compare content hashes; entries with a real
//! disc id are skipped when their destination already exists.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::archive::{repack_zip, zip_fingerprint, ArchiveKind};
use crate::models::{RelocateStats, SongEntry, DEFAULT_TRACK};
use crate::normalize::{initial_letter, title_case};
use crate::scan::extension_of;

pub const BADLY_NAMED_DIR: &str = "#Badly Named";
pub const BROKEN_ARCHIVE_DIR: &str = "#Broken Archive";
pub const SCRATCH_DIR: &str = "#Temp Folder Delete Me";

/// Destinations tried for one synthetic-disc entry before giving up.
pub const MAX_COLLISION_ATTEMPTS: usize = 10;

/// What happened to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocateOutcome {
    Copied(PathBuf),
    Moved(PathBuf),
    Repacked(PathBuf),
    /// The container could not be read; the original went to `#Broken Archive`.
    BrokenArchive(PathBuf),
    SamePath,
    AlreadyExists(PathBuf),
    /// Identical content already sits at this path.
    Duplicate(PathBuf),
    /// Every tried track number was taken by different content.
    Conflict(PathBuf),
    Failed(String),
}

impl RelocateStats {
    pub fn record(&mut self, outcome: &RelocateOutcome) {
        match outcome {
            RelocateOutcome::Copied(_) => self.copied += 1,
            RelocateOutcome::Moved(_) => self.moved += 1,
            RelocateOutcome::Repacked(_) => self.repacked += 1,
            RelocateOutcome::BrokenArchive(_) => self.broken_archives += 1,
            RelocateOutcome::SamePath => self.skipped_same_path += 1,
            RelocateOutcome::AlreadyExists(_) => self.skipped_existing += 1,
            RelocateOutcome::Duplicate(_) => self.duplicates += 1,
            RelocateOutcome::Conflict(_) => self.conflicts += 1,
            RelocateOutcome::Failed(_) => self.failures += 1,
        }
    }
}

enum Collision {
    Free(PathBuf),
    SamePath,
    Duplicate(PathBuf),
    Exhausted(PathBuf),
}

/// SHA-256 of a file's content, hex encoded.
pub fn file_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash used to spot duplicates. Zips are compared by member content, since
/// the copy already at the destination is a repack of its source; an
/// unreadable zip falls back to its raw bytes.
pub fn content_hash(path: &Path) -> Result<String> {
    if ArchiveKind::from_ext(&extension_of(path)) == Some(ArchiveKind::Zip) {
        if let Ok(fingerprint) = zip_fingerprint(path) {
            return Ok(fingerprint);
        }
    }
    file_hash(path)
}

/// Paths compare case-insensitively; the collections this runs on usually
/// live on case-insensitive filesystems.
pub fn same_path(a: &Path, b: &Path) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

/// Rename, falling back to copy + remove when the rename is refused
/// (typically across devices).
pub fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    fs::copy(source, dest)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
    fs::remove_file(source).with_context(|| format!("Failed to remove {}", source.display()))
}

/// Remove every empty directory below `root`, deepest first. `root` itself
/// is kept.
pub fn prune_empty_dirs(root: &Path) -> usize {
    let mut removed = 0;
    for item in WalkDir::new(root).min_depth(1).contents_first(true) {
        let Ok(item) = item else { continue };
        if !item.file_type().is_dir() {
            continue;
        }
        let is_empty = fs::read_dir(item.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty && fs::remove_dir(item.path()).is_ok() {
            log::info!("removed empty directory: {}", item.path().display());
            removed += 1;
        }
    }
    removed
}

/// Relocates entries one at a time into a destination root.
pub struct Relocator {
    root: PathBuf,
    scratch_root: PathBuf,
    delete: bool,
    stats: RelocateStats,
}

impl Relocator {
    /// Create the destination root and its scratch area. Failing here aborts
    /// the run.
    pub fn new(root: &Path, delete: bool) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create destination {}", root.display()))?;
        let scratch_root = root.join(SCRATCH_DIR);
        fs::create_dir_all(&scratch_root)
            .with_context(|| format!("Failed to create scratch dir {}", scratch_root.display()))?;
        Ok(Relocator {
            root: root.to_path_buf(),
            scratch_root,
            delete,
            stats: RelocateStats::default(),
        })
    }

    pub fn stats(&self) -> &RelocateStats {
        &self.stats
    }

    /// Canonical path for an entry, under its performer or `#Badly Named`.
    pub fn destination(&self, entry: &SongEntry) -> PathBuf {
        let file_name = format!("{}{}", entry.canonical_stem(), entry.ext);
        match &entry.performer {
            Some(performer) if entry.is_parsed() => self
                .root
                .join(initial_letter(performer))
                .join(title_case(performer))
                .join(file_name),
            _ => self.root.join(BADLY_NAMED_DIR).join(file_name),
        }
    }

    fn broken_destination(&self, entry: &SongEntry) -> PathBuf {
        self.root.join(BROKEN_ARCHIVE_DIR).join(&entry.file_name)
    }

    /// Relocate one entry. Never fails: errors are logged and reported as
    /// [`RelocateOutcome::Failed`] so the batch can go on.
    pub fn relocate(&mut self, entry: &mut SongEntry) -> RelocateOutcome {
        let outcome = match self.try_relocate(entry) {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!("{} : {:#}", entry.source_path().display(), err);
                RelocateOutcome::Failed(format!("{:#}", err))
            }
        };
        self.stats.record(&outcome);
        outcome
    }

    fn try_relocate(&self, entry: &mut SongEntry) -> Result<RelocateOutcome> {
        let source = entry.source_path();
        if entry.synthetic_disc {
            entry.track = DEFAULT_TRACK.to_string();
        }
        let mut dest = self.destination(entry);
        if same_path(&source, &dest) {
            log::debug!("already in place: {}", dest.display());
            return Ok(RelocateOutcome::SamePath);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        if entry.synthetic_disc {
            match self.resolve_collision(entry, &source)? {
                Collision::Free(free) => dest = free,
                Collision::SamePath => return Ok(RelocateOutcome::SamePath),
                Collision::Duplicate(existing) => {
                    log::warn!(
                        "exact duplicate: {} and {}, not copying",
                        source.display(),
                        existing.display()
                    );
                    self.remove_original(&source)?;
                    return Ok(RelocateOutcome::Duplicate(existing));
                }
                Collision::Exhausted(last) => {
                    log::warn!("too many file conflicts for {}", last.display());
                    return Ok(RelocateOutcome::Conflict(last));
                }
            }
        } else if dest.exists() {
            log::warn!("already exists, skipping: {}", dest.display());
            return Ok(RelocateOutcome::AlreadyExists(dest));
        }

        match ArchiveKind::from_ext(&entry.ext) {
            Some(ArchiveKind::Zip) => self.relocate_zip(entry, &source, dest),
            Some(ArchiveKind::Rar) | None => self.transfer(&source, dest),
        }
    }

    /// Try track numbers from 01 until a free path, an identical file or
    /// the attempt limit.
    fn resolve_collision(&self, entry: &mut SongEntry, source: &Path) -> Result<Collision> {
        let mut source_hash: Option<String> = None;
        for _ in 0..MAX_COLLISION_ATTEMPTS {
            let dest = self.destination(entry);
            if same_path(source, &dest) {
                return Ok(Collision::SamePath);
            }
            if !dest.exists() {
                return Ok(Collision::Free(dest));
            }
            if source_hash.is_none() {
                source_hash = Some(content_hash(source)?);
            }
            if source_hash.as_deref() == Some(content_hash(&dest)?.as_str()) {
                return Ok(Collision::Duplicate(dest));
            }
            entry.bump_track();
        }
        Ok(Collision::Exhausted(self.destination(entry)))
    }

    fn relocate_zip(
        &self,
        entry: &SongEntry,
        source: &Path,
        dest: PathBuf,
    ) -> Result<RelocateOutcome> {
        let stem = entry.canonical_stem();
        match repack_zip(source, &dest, &stem, &self.scratch_root) {
            Ok(members) => {
                log::info!(
                    "repacked {} members:\n {} to\n {}",
                    members,
                    source.display(),
                    dest.display()
                );
                self.remove_original(source)?;
                Ok(RelocateOutcome::Repacked(dest))
            }
            Err(err) => {
                log::error!("bad archive file {}: {:#}", source.display(), err);
                let fallback = self.broken_destination(entry);
                if fallback.exists() {
                    log::warn!("already exists, skipping: {}", fallback.display());
                    return Ok(RelocateOutcome::AlreadyExists(fallback));
                }
                if let Some(parent) = fallback.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                self.transfer(source, fallback.clone())?;
                Ok(RelocateOutcome::BrokenArchive(fallback))
            }
        }
    }

    /// Copy, or move in delete mode.
    fn transfer(&self, source: &Path, dest: PathBuf) -> Result<RelocateOutcome> {
        if self.delete {
            move_file(source, &dest)?;
            log::info!("moved:\n {} to\n {}", source.display(), dest.display());
            Ok(RelocateOutcome::Moved(dest))
        } else {
            fs::copy(source, &dest).with_context(|| {
                format!("Failed to copy {} to {}", source.display(), dest.display())
            })?;
            log::info!("copied:\n {} to\n {}", source.display(), dest.display());
            Ok(RelocateOutcome::Copied(dest))
        }
    }

    fn remove_original(&self, source: &Path) -> Result<()> {
        if !self.delete {
            return Ok(());
        }
        match fs::remove_file(source) {
            Ok(()) => {
                log::info!("deleted original file: {}", source.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::warn!("file not found: {}", source.display());
                Ok(())
            }
            Err(err) => {
                Err(err).with_context(|| format!("Failed to delete {}", source.display()))
            }
        }
    }

    /// Tear down the scratch area and prune empty directories under the
    /// destination, and under `source_root` in delete mode.
    pub fn finish(mut self, source_root: &Path) -> RelocateStats {
        if let Err(err) = fs::remove_dir_all(&self.scratch_root) {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!("could not remove {}: {}", self.scratch_root.display(), err);
            }
        }
        log::info!("removing empty directories");
        self.stats.dirs_removed += prune_empty_dirs(&self.root);
        if self.delete {
            self.stats.dirs_removed += prune_empty_dirs(source_root);
        }
        self.stats
    }
}
