pub mod exif;
pub mod probe;

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::media::MediaKind;

/// Source of raw per-file metadata.
///
/// Implementations never fail: extraction problems are logged and an empty
/// object is returned so date and location resolution fall through.
pub trait MetadataSource {
    fn extract(&self, path: &Path, kind: MediaKind) -> Value;
}

/// Extracts EXIF tags from images and container metadata from movies.
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    ffprobe: PathBuf,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MetadataExtractor {
    /// Create an extractor that runs the given `ffprobe` binary for movies.
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl MetadataSource for MetadataExtractor {
    fn extract(&self, path: &Path, kind: MediaKind) -> Value {
        match kind {
            MediaKind::Image => exif::read_exif(path),
            MediaKind::Movie => probe::probe(&self.ffprobe, path),
            MediaKind::Unknown => empty(),
        }
    }
}

pub(crate) fn empty() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_is_not_extracted() {
        let extractor = MetadataExtractor::new("/nonexistent/ffprobe");
        let value = extractor.extract(Path::new("/nonexistent/readme.txt"), MediaKind::Unknown);
        assert_eq!(value, empty());
    }

    #[test]
    fn test_failed_probe_yields_empty_metadata() {
        let extractor = MetadataExtractor::new("/nonexistent/ffprobe");
        let value = extractor.extract(Path::new("/nonexistent/clip.mp4"), MediaKind::Movie);
        assert_eq!(value, empty());
    }
}
