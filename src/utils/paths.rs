//! Path utilities for the build driver

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::error::DistributorError;

/// Make `path` absolute against the current directory, without touching the filesystem
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    Ok(current_dir.join(path))
}

/// Requirements for a directory given on the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct DirCheck {
    /// The directory must already exist
    pub must_exist: bool,
    /// The directory is created if needed and must accept new files
    pub must_be_writable: bool,
}

/// Validate a directory argument and return its canonical form
///
/// `name` is the option name used in error messages (e.g. "project-dir").
pub fn check_dir(path: &Path, name: &str, check: DirCheck) -> Result<PathBuf, DistributorError> {
    if check.must_exist && !path.exists() {
        return Err(DistributorError::config_error(format!(
            "{} does not exist: {}",
            name,
            path.display()
        )));
    }
    if path.is_file() {
        return Err(DistributorError::config_error(format!(
            "{} can not refer to a file: {}",
            name,
            path.display()
        )));
    }

    if check.must_be_writable {
        fs::create_dir_all(path).map_err(|e| DistributorError::io(path, e))?;

        let marker = path.join(".renpy-distributor-write-test");
        let writable = fs::write(&marker, b"").and_then(|_| fs::remove_file(&marker));
        if let Err(e) = writable {
            return Err(DistributorError::config_error_with_hint(
                format!("{} is not writable: {}", name, path.display()),
                Some(e.into()),
                format!("Check the permissions of {} or pass a different --{}.", path.display(), name),
            ));
        }
    }

    Ok(canonicalize_or_given(path))
}

/// Canonicalize when possible, falling back to the path as given
///
/// Windows paths come back without the `\\?\` verbatim prefix.
fn canonicalize_or_given(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Remove everything inside `dir` except `keep`
///
/// Used for `--fresh`, where the log file may live inside the tmp dir.
/// Returns the number of top-level entries removed.
pub fn clear_dir_except(dir: &Path, keep: Option<&Path>) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let keep = keep.map(canonicalize_or_given);
    let mut removed = 0;

    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read {}", dir.display()))?;

    for entry in entries {
        let path = entry.path();

        if let Some(keep) = &keep {
            if keep.starts_with(canonicalize_or_given(path)) {
                if entry.file_type().is_dir() {
                    // The kept file is somewhere below; clear around it.
                    removed += clear_dir_except(path, Some(keep))?;
                }
                continue;
            }
        }

        if entry.file_type().is_dir() {
            fs::remove_dir_all(path)
                .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
        } else {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove file: {}", path.display()))?;
        }
        removed += 1;
    }

    Ok(removed)
}
