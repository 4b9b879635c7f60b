use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Collect every regular file below `source_root`, sorted by path.
///
/// Anything under `exclude` (typically the output directory when it sits
/// inside the source tree) is left out. Unreadable entries are logged and
/// skipped.
pub fn scan_media(source_root: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    if !source_root.is_dir() {
        return Err(Error::io(
            source_root,
            io::Error::new(io::ErrorKind::NotFound, "source is not a directory"),
        ));
    }

    log::info!("Scanning {} ...", source_root.display());
    let mut files = Vec::new();
    let walker = WalkDir::new(source_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| exclude.map_or(true, |ex| !entry.path().starts_with(ex)));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable entry: {}", e),
        }
    }
    Ok(files)
}
