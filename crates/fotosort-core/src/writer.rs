use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use filetime::FileTime;

/// Directory for files whose date could not be determined.
pub const UNKNOWN_DATE_DIR: &str = "0000";

const COMPARE_CHUNK: usize = 64 * 1024;

/// Where a file should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Free destination path
    Fresh(PathBuf),
    /// Byte-identical file already present at this path
    Duplicate(PathBuf),
}

/// Destinations handed out during a dry run, mapped to the source that
/// would have been copied there.
pub type PlannedCopies = HashMap<PathBuf, PathBuf>;

/// `<base>/YYYY/MM[/location]`, or `<base>/0000[/location]` without a date.
pub fn destination_dir(
    dest_base: &Path,
    date: Option<NaiveDateTime>,
    location: Option<&str>,
) -> PathBuf {
    let mut dir = match date {
        Some(dt) => dest_base
            .join(dt.format("%Y").to_string())
            .join(dt.format("%m").to_string()),
        None => dest_base.join(UNKNOWN_DATE_DIR),
    };
    if let Some(component) = location.and_then(path_component) {
        dir.push(component);
    }
    dir
}

/// Make a place name usable as a single directory name.
fn path_component(location: &str) -> Option<String> {
    let cleaned: String = location
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}

/// `name.ext` for attempt 0, `name_N.ext` afterwards.
fn candidate_name(file_name: &str, attempt: u64) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, attempt, ext),
        None => format!("{}_{}", stem, attempt),
    }
}

/// Find a destination for `source` under `dest_base`.
///
/// Existing candidates are compared byte for byte with the source: an
/// identical one is reported as [`Placement::Duplicate`], a different one
/// moves on to the next `_N` suffix. A candidate in `planned` is taken even
/// though nothing exists on disk yet, and is compared against its planned
/// source.
pub fn plan_destination(
    source: &Path,
    file_name: &str,
    date: Option<NaiveDateTime>,
    location: Option<&str>,
    dest_base: &Path,
    planned: &PlannedCopies,
) -> io::Result<Placement> {
    let dir = destination_dir(dest_base, date, location);

    let mut attempt = 0u64;
    loop {
        let candidate = dir.join(candidate_name(file_name, attempt));
        let occupant = match planned.get(&candidate) {
            Some(planned_source) => planned_source.as_path(),
            None if !candidate.exists() => return Ok(Placement::Fresh(candidate)),
            None => candidate.as_path(),
        };
        if files_identical(source, occupant)? {
            return Ok(Placement::Duplicate(candidate));
        }
        attempt += 1;
    }
}

/// Byte-for-byte comparison of two files. A non-file `b` never matches.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut file_a = File::open(a)?;
    let mut file_b = File::open(b)?;
    let mut buf_a = vec![0u8; COMPARE_CHUNK];
    let mut buf_b = vec![0u8; COMPARE_CHUNK];
    loop {
        let read_a = read_chunk(&mut file_a, &mut buf_a)?;
        let read_b = read_chunk(&mut file_b, &mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows.
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Copy `source` to `dest`, creating parent directories and keeping the
/// source modification time. Returns the number of bytes copied.
pub fn copy_to(source: &Path, dest: &Path) -> io::Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = fs::copy(source, dest)?;

    let mtime = FileTime::from_last_modification_time(&fs::metadata(source)?);
    if let Err(e) = filetime::set_file_mtime(dest, mtime) {
        log::warn!("{}: could not set modification time: {}", dest.display(), e);
    }
    Ok(bytes)
}
