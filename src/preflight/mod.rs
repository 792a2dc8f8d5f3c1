//! Preflight checks run before building the fork command.
//!
//! Locating the JVM executable up front turns a cryptic spawn failure into
//! a readable message before anything touches the filesystem.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolve the fork executable. Absolute and relative paths only need to
/// exist; bare names are looked up on PATH.
pub fn locate_executable(executable: &str) -> Result<PathBuf> {
    let path = Path::new(executable);
    if path.components().count() > 1 {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("fork executable {} does not exist", path.display());
    }
    which::which(executable)
        .with_context(|| format!("fork executable '{executable}' not found on PATH"))
}
