//! Container repacking.
//!
//! A karaoke `.zip` usually holds a `.cdg`/`.mp3` pair whose inner names
//! still carry the old, messy filename. Repacking extracts every file member
//! into a scratch directory, renames each one to the canonical stem, and
//! writes a fresh deflated archive at the destination.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::scan::extension_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    /// Recognized, but relocated verbatim: there is no RAR writer to repack with.
    Rar,
}

impl ArchiveKind {
    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            ".zip" => Some(ArchiveKind::Zip),
            ".rar" => Some(ArchiveKind::Rar),
            _ => None,
        }
    }
}

/// Scratch directory that is removed when dropped, whatever path the caller
/// leaves by.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create an empty scratch directory, clearing anything a crashed run left.
    pub fn create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to clear scratch dir {}", path.display()))?;
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create scratch dir {}", path.display()))?;
        Ok(ScratchDir { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!("could not remove {}: {}", self.path.display(), err);
            }
        }
    }
}

/// `stem.ext`, or `stem (n).ext` when an earlier member already took it.
fn member_name(stem: &str, ext: &str, taken: &mut HashSet<String>) -> String {
    let mut name = format!("{}{}", stem, ext);
    let mut n = 2;
    while !taken.insert(name.to_lowercase()) {
        name = format!("{} ({}){}", stem, n, ext);
        n += 1;
    }
    name
}

/// Extract every file member of `source` into `scratch`, renamed after `stem`.
pub fn extract_zip(source: &Path, scratch: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let file =
        File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Not a readable zip archive: {}", source.display()))?;

    let mut taken = HashSet::new();
    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut member = archive
            .by_index(i)
            .with_context(|| format!("Failed to read member {} of {}", i, source.display()))?;
        if member.is_dir() {
            continue;
        }
        let Some(inner) = member.enclosed_name() else {
            bail!("Unsafe member path {:?} in {}", member.name(), source.display());
        };
        let name = member_name(stem, &extension_of(&inner), &mut taken);
        let out_path = scratch.join(name);
        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut member, &mut out)
            .with_context(|| format!("Failed to extract member {} of {}", i, source.display()))?;
        extracted.push(out_path);
    }

    if extracted.is_empty() {
        bail!("Archive has no file members: {}", source.display());
    }
    Ok(extracted)
}

/// Write `files` into a new deflated archive at `dest`, named by file name.
pub fn write_zip(dest: &Path, files: &[PathBuf]) -> Result<usize> {
    let file = File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("No file name: {}", path.display()))?;
        zip.start_file(name, options)?;
        let mut input =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        io::copy(&mut input, &mut zip)?;
    }

    zip.finish()
        .with_context(|| format!("Failed to finish {}", dest.display()))?;
    Ok(files.len())
}

/// Repack `source` as `dest` with every member renamed to `stem`.
/// Works inside `scratch_root/stem`, which is gone again when this returns.
/// A partially written `dest` is removed on failure.
pub fn repack_zip(source: &Path, dest: &Path, stem: &str, scratch_root: &Path) -> Result<usize> {
    let scratch = ScratchDir::create(scratch_root.join(stem))?;
    let members = extract_zip(source, scratch.path(), stem)?;
    match write_zip(dest, &members) {
        Ok(count) => Ok(count),
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(dest) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    log::warn!("could not remove {}: {}", dest.display(), cleanup);
                }
            }
            Err(err)
        }
    }
}

/// SHA-256 over the file members' extensions and contents, ignoring member
/// names, order and compression. A repacked archive fingerprints the same as
/// the archive it was repacked from.
pub fn zip_fingerprint(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Not a readable zip archive: {}", path.display()))?;

    let mut members = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut member = archive
            .by_index(i)
            .with_context(|| format!("Failed to read member {} of {}", i, path.display()))?;
        if member.is_dir() {
            continue;
        }
        let ext = member
            .enclosed_name()
            .map(|inner| extension_of(&inner))
            .unwrap_or_default();
        let mut hasher = Sha256::new();
        io::copy(&mut member, &mut hasher)
            .with_context(|| format!("Failed to read member {} of {}", i, path.display()))?;
        members.push(format!("{}:{:x}", ext, hasher.finalize()));
    }
    members.sort();

    let mut hasher = Sha256::new();
    for member in &members {
        hasher.update(member.as_bytes());
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn make_zip(path: &Path, members: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn member_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn test_archive_kind() {
        assert_eq!(ArchiveKind::from_ext(".zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_ext(".RAR"), Some(ArchiveKind::Rar));
        assert_eq!(ArchiveKind::from_ext(".mp3"), None);
    }

    #[test]
    fn test_repack_renames_members() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("old name.zip");
        make_zip(&source, &[("Old Name.CDG", "graphics"), ("old name.mp3", "audio")]);
        let dest = dir.path().join("new.zip");
        let scratch_root = dir.path().join("scratch");

        let count = repack_zip(&source, &dest, "SC1-01 - A - B", &scratch_root).unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            member_names(&dest),
            vec!["SC1-01 - A - B.cdg", "SC1-01 - A - B.mp3"]
        );
        assert!(!scratch_root.join("SC1-01 - A - B").exists());

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut audio = String::new();
        archive
            .by_name("SC1-01 - A - B.mp3")
            .unwrap()
            .read_to_string(&mut audio)
            .unwrap();
        assert_eq!(audio, "audio");
    }

    #[test]
    fn test_duplicate_member_extensions_are_numbered() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("pair.zip");
        make_zip(&source, &[("a.mp3", "1"), ("b.mp3", "2")]);
        let dest = dir.path().join("out.zip");
        repack_zip(&source, &dest, "X", &dir.path().join("scratch")).unwrap();
        assert_eq!(member_names(&dest), vec!["X (2).mp3", "X.mp3"]);
    }

    #[test]
    fn test_corrupt_archive_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("broken.zip");
        fs::write(&source, b"this is not a zip").unwrap();
        let dest = dir.path().join("out.zip");
        let scratch_root = dir.path().join("scratch");

        assert!(repack_zip(&source, &dest, "X", &scratch_root).is_err());
        assert!(!dest.exists());
        assert!(!scratch_root.join("X").exists());
    }

    #[test]
    fn test_empty_archive_is_an_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("empty.zip");
        make_zip(&source, &[]);
        let dest = dir.path().join("out.zip");
        assert!(repack_zip(&source, &dest, "X", &dir.path().join("scratch")).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_write_failure_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("pair.zip");
        make_zip(&source, &[("a.mp3", "1")]);
        let dest = dir.path().join("no such dir").join("out.zip");
        let scratch_root = dir.path().join("scratch");

        assert!(repack_zip(&source, &dest, "X", &scratch_root).is_err());
        assert!(!dest.exists());
        assert!(!scratch_root.join("X").exists());
        assert!(source.exists());
    }

    #[test]
    fn test_fingerprint_survives_repack() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("old name.zip");
        make_zip(&source, &[("Old Name.CDG", "graphics"), ("old name.mp3", "audio")]);
        let dest = dir.path().join("new.zip");
        repack_zip(&source, &dest, "XXAB0-01 - A - B", &dir.path().join("scratch")).unwrap();

        assert_ne!(fs::read(&source).unwrap(), fs::read(&dest).unwrap());
        assert_eq!(zip_fingerprint(&source).unwrap(), zip_fingerprint(&dest).unwrap());

        let other = dir.path().join("other.zip");
        make_zip(&other, &[("a.cdg", "graphics"), ("a.mp3", "other audio")]);
        assert_ne!(zip_fingerprint(&source).unwrap(), zip_fingerprint(&other).unwrap());
        assert!(zip_fingerprint(&dir.path().join("missing.zip")).is_err());
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("work");
        {
            let scratch = ScratchDir::create(path.clone()).unwrap();
            fs::write(scratch.path().join("f"), b"x").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
