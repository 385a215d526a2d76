//! Locating product files inside the mosaic catalogue.
//!
//! The catalogue keeps one directory per product; only the directory's own
//! entries are considered (no recursion).

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{RasterIoError, Result};

/// First file in `dir` (sorted by name) whose name ends with `extension`.
///
/// Returns `Ok(None)` when the directory exists but holds no such file.
pub fn find_file<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Option<PathBuf>> {
    Ok(list_files(dir.as_ref())?
        .into_iter()
        .find(|p| file_name(p).ends_with(extension)))
}

/// Every file in `dir` whose name starts with `prefix` and ends with
/// `extension`, sorted by name.
pub fn find_files<P: AsRef<Path>>(dir: P, prefix: &str, extension: &str) -> Result<Vec<PathBuf>> {
    Ok(list_files(dir.as_ref())?
        .into_iter()
        .filter(|p| {
            let name = file_name(p);
            name.starts_with(prefix) && name.ends_with(extension)
        })
        .collect())
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RasterIoError::open(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "catalogue directory not found"),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            RasterIoError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
