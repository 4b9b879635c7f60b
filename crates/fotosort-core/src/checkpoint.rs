use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current run state file format version
const STATE_VERSION: u32 = 1;

/// Default run state filename, placed in the output directory
pub const STATE_FILENAME: &str = ".fotosort-state.bin";

/// Progress of an interrupted batch, used to resume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    /// Source directory the batch was started against
    pub source_root: PathBuf,
    /// Files already handled (copied, duplicate or unsupported)
    pub processed: BTreeSet<PathBuf>,
    /// Bytes of all processed files
    pub bytes: u64,
    pub duplicates: u64,
}

impl RunState {
    pub fn new(source_root: &Path) -> Self {
        Self {
            version: STATE_VERSION,
            timestamp: Utc::now(),
            source_root: normalize_root(source_root),
            processed: BTreeSet::new(),
            bytes: 0,
            duplicates: 0,
        }
    }

    /// Load run state from `path`.
    ///
    /// Returns `None` if there is no file, or if it is unreadable or from
    /// another format version (a fresh run starts in that case).
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        match bincode::deserialize::<RunState>(&bytes) {
            Ok(state) if state.version == STATE_VERSION => Ok(Some(state)),
            Ok(state) => {
                log::warn!(
                    "{}: ignoring run state version {}",
                    path.display(),
                    state.version
                );
                Ok(None)
            }
            Err(e) => {
                log::warn!("{}: ignoring unreadable run state: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Save run state to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let state_error = |reason: String| Error::State {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let encoded = bincode::serialize(self).map_err(|e| state_error(e.to_string()))?;

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;
        file.write_all(&encoded)
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::io(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    /// Delete the run state file, if any.
    pub fn delete(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).map_err(|e| Error::io(path, e))?;
        }
        Ok(())
    }

    /// Whether this state belongs to a run over `source_root`.
    pub fn matches(&self, source_root: &Path) -> bool {
        self.source_root == normalize_root(source_root)
    }

    pub fn is_processed(&self, path: &Path) -> bool {
        self.processed.contains(path)
    }

    /// Record a handled file.
    pub fn mark_processed(&mut self, path: &Path, size: u64) {
        if self.processed.insert(path.to_path_buf()) {
            self.bytes += size;
        }
        self.timestamp = Utc::now();
    }

    pub fn mark_duplicate(&mut self) {
        self.duplicates += 1;
    }
}

/// Absolute form of a source root, or the path as given if it cannot be
/// resolved.
pub(crate) fn normalize_root(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Token for cooperative cancellation, checked between files.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}
