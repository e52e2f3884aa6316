//! Safety checks run before anything on disk is touched.
//!
//! A run copies (or in delete mode moves) every media file of the source
//! tree into the destination tree. These checks catch the argument mistakes
//! that would make that destructive.

use anyhow::{bail, Result};
use std::path::Path;

use crate::relocate::SCRATCH_DIR;

/// Validates a source/destination pair.
///
/// Checks:
/// - source must be an existing directory
/// - destination, if it exists, must be a directory
/// - neither root may sit inside the other's scratch area, which is wiped
///   at the end of every run
pub fn validate_roots(source: &Path, dest: &Path) -> Result<()> {
    if !source.is_dir() {
        bail!(
            "Safety check failed: source '{}' is not a directory",
            source.display()
        );
    }

    if dest.exists() && !dest.is_dir() {
        bail!(
            "Safety check failed: destination '{}' exists and is not a directory",
            dest.display()
        );
    }

    if source.starts_with(dest.join(SCRATCH_DIR)) {
        bail!(
            "Safety check failed: source '{}' is inside the scratch area of '{}'",
            source.display(),
            dest.display()
        );
    }

    if dest.starts_with(source.join(SCRATCH_DIR)) {
        bail!(
            "Safety check failed: destination '{}' is inside the scratch area of '{}'",
            dest.display(),
            source.display()
        );
    }

    Ok(())
}
