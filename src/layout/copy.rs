//! File and directory copy helpers for module materialization.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Copy a single artifact file into `dest_dir`, keeping its file name.
///
/// Returns the path of the copy. A missing source is fatal: the dependency
/// index claimed the artifact was resolved, so its absence means the local
/// repository is inconsistent.
pub fn copy_file_to_dir(src: &Path, dest_dir: &Path) -> Result<PathBuf> {
    if !src.exists() {
        bail!("artifact file {} does not exist", src.display());
    }
    if !dest_dir.is_dir() {
        bail!("no directory called {}", dest_dir.display());
    }
    let name = src
        .file_name()
        .with_context(|| format!("artifact path {} has no file name", src.display()))?;
    let dest = dest_dir.join(name);
    fs::copy(src, &dest)
        .with_context(|| format!("copying {} to {}", src.display(), dest.display()))?;
    Ok(dest)
}

/// Copy a whole directory tree into `dest_dir`, preserving subdirectory
/// structure. The copy is rooted at `dest_dir/<src file name>`; that root
/// path is returned.
pub fn copy_directory(src: &Path, dest_dir: &Path) -> Result<PathBuf> {
    if !src.is_dir() {
        bail!("{} does not exist", src.display());
    }
    if !dest_dir.is_dir() {
        bail!("no directory called {}", dest_dir.display());
    }
    let name = src
        .file_name()
        .with_context(|| format!("directory path {} has no file name", src.display()))?;
    let dest_root = dest_dir.join(name);

    for entry in WalkDir::new(src) {
        let entry = entry.with_context(|| format!("walking {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("walking {}", src.display()))?;
        let target = dest_root.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("copying {} to {}", entry.path().display(), target.display())
            })?;
        }
    }

    Ok(dest_root)
}
